//! In-memory storage for fast, deterministic tests.
//!
//! Every port operation runs under one mutex, so multi-row mutations are
//! atomic and concurrent writers serialize exactly as the port requires.

use ledger_rpc_core::storage::{LedgerStorage, StorageFuture};
use ledger_rpc_core::{
    Account, AccountId, DateTime, ExchangeRate, ExchangeRateId, StorageError, Transaction,
    TransactionId, Transfer, TransferId, Utc,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::future::ready;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Ledger {
    accounts: HashMap<AccountId, Account>,
    numbers: HashMap<String, AccountId>,
    transactions: Vec<Transaction>,
    rates: Vec<ExchangeRate>,
    transfers: HashMap<TransferId, Transfer>,
}

impl Ledger {
    fn account_mut(&mut self, id: AccountId) -> Result<&mut Account, StorageError> {
        self.accounts
            .get_mut(&id)
            .ok_or_else(|| StorageError::Database(format!("account {id} does not exist")))
    }

    fn delta(transaction: &Transaction) -> Result<Decimal, StorageError> {
        transaction
            .signed_amount()
            .map_err(|e| StorageError::Corrupt(e.to_string()))
    }

    fn apply(&mut self, account_id: AccountId, delta: Decimal, at: DateTime<Utc>) -> Result<(), StorageError> {
        let account = self.account_mut(account_id)?;
        account.current_balance += delta;
        account.updated_at = account.updated_at.max(at);
        Ok(())
    }

    fn record(&mut self, account_id: AccountId, transaction: Transaction) -> Result<TransactionId, StorageError> {
        let delta = Self::delta(&transaction)?;
        self.apply(account_id, delta, transaction.timestamp)?;
        let id = transaction.id;
        self.transactions.push(transaction);
        Ok(id)
    }

    fn record_pair(
        &mut self,
        transfer_id: TransferId,
        from_id: AccountId,
        to_id: AccountId,
        from_leg: Transaction,
        to_leg: Transaction,
    ) -> Result<(), StorageError> {
        let from_delta = Self::delta(&from_leg)?;
        let to_delta = Self::delta(&to_leg)?;

        // Every row must exist before any is touched
        self.account_mut(from_id)?;
        self.account_mut(to_id)?;
        if !self.transfers.contains_key(&transfer_id) {
            return Err(StorageError::Database(format!(
                "transfer {transfer_id} does not exist"
            )));
        }

        self.apply(from_id, from_delta, from_leg.timestamp)?;
        self.apply(to_id, to_delta, to_leg.timestamp)?;
        self.transactions.push(from_leg);
        self.transactions.push(to_leg);
        if let Some(header) = self.transfers.get_mut(&transfer_id) {
            header.success = true;
        }
        Ok(())
    }
}

/// In-memory [`LedgerStorage`].
///
/// # Example
///
/// ```
/// use ledger_rpc_core::{Account, LedgerStorage, Utc};
/// use ledger_rpc_testing::InMemoryLedgerStorage;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let storage = InMemoryLedgerStorage::new();
/// storage
///     .create_account(Account::open("A", "Alice", "USD", Utc::now()))
///     .await?;
///
/// assert!(storage.get_account("A").await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryLedgerStorage {
    ledger: Arc<Mutex<Ledger>>,
}

impl InMemoryLedgerStorage {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state of an account, for assertions.
    #[must_use]
    pub fn account(&self, number: &str) -> Option<Account> {
        let ledger = self.lock();
        ledger
            .numbers
            .get(number)
            .and_then(|id| ledger.accounts.get(id))
            .cloned()
    }

    /// Every stored transaction in insertion order.
    #[must_use]
    pub fn transactions(&self) -> Vec<Transaction> {
        self.lock().transactions.clone()
    }

    /// Every stored transfer header.
    #[must_use]
    pub fn transfers(&self) -> Vec<Transfer> {
        self.lock().transfers.values().cloned().collect()
    }

    /// Signed sum of an account's transactions.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Corrupt`] if an UNKNOWN transaction was stored.
    pub fn ledger_sum(&self, account_id: AccountId) -> Result<Decimal, StorageError> {
        self.lock()
            .transactions
            .iter()
            .filter(|t| t.account_id == account_id)
            .map(|t| t.signed_amount().map_err(|e| StorageError::Corrupt(e.to_string())))
            .sum()
    }
}

impl LedgerStorage for InMemoryLedgerStorage {
    fn create_account(&self, account: Account) -> StorageFuture<'_, AccountId> {
        let mut ledger = self.lock();
        let result = if ledger.numbers.contains_key(&account.number) {
            Err(StorageError::Duplicate(format!(
                "account number {} already exists",
                account.number
            )))
        } else {
            let id = account.id;
            ledger.numbers.insert(account.number.clone(), id);
            ledger.accounts.insert(id, account);
            Ok(id)
        };
        Box::pin(ready(result))
    }

    fn get_account(&self, number: &str) -> StorageFuture<'_, Option<Account>> {
        Box::pin(ready(Ok(self.account(number))))
    }

    fn create_transaction_and_update_balance(
        &self,
        account: &Account,
        transaction: Transaction,
    ) -> StorageFuture<'_, TransactionId> {
        let result = self.lock().record(account.id, transaction);
        Box::pin(ready(result))
    }

    fn transactions_for_account(&self, account_id: AccountId) -> StorageFuture<'_, Vec<Transaction>> {
        let mut transactions: Vec<Transaction> = self
            .lock()
            .transactions
            .iter()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect();
        transactions.sort_by_key(|t| t.timestamp);
        Box::pin(ready(Ok(transactions)))
    }

    fn create_exchange_rate(&self, rate: ExchangeRate) -> StorageFuture<'_, ExchangeRateId> {
        let id = rate.id;
        self.lock().rates.push(rate);
        Box::pin(ready(Ok(id)))
    }

    fn resolve_exchange_rate(
        &self,
        from: &str,
        to: &str,
        at: DateTime<Utc>,
    ) -> StorageFuture<'_, Option<ExchangeRate>> {
        let rate = self
            .lock()
            .rates
            .iter()
            .enumerate()
            .filter(|(_, r)| r.matches(from, to, at))
            .max_by_key(|(seq, r)| (r.created_at, r.valid_from, *seq))
            .map(|(_, r)| r.clone());
        Box::pin(ready(Ok(rate)))
    }

    fn create_transfer_header(&self, transfer: Transfer) -> StorageFuture<'_, TransferId> {
        let id = transfer.id;
        self.lock().transfers.insert(id, transfer);
        Box::pin(ready(Ok(id)))
    }

    fn create_transfer_pair_and_update_balances(
        &self,
        transfer_id: TransferId,
        from: &Account,
        to: &Account,
        from_leg: Transaction,
        to_leg: Transaction,
    ) -> StorageFuture<'_, ()> {
        let result = self
            .lock()
            .record_pair(transfer_id, from.id, to.id, from_leg, to_leg);
        Box::pin(ready(result))
    }

    fn update_transfer_status(&self, id: TransferId, success: bool) -> StorageFuture<'_, ()> {
        let result = match self.lock().transfers.get_mut(&id) {
            Some(transfer) => {
                transfer.success = success;
                Ok(())
            },
            None => Err(StorageError::Database(format!("transfer {id} does not exist"))),
        };
        Box::pin(ready(result))
    }

    fn get_transfer(&self, id: TransferId) -> StorageFuture<'_, Option<Transfer>> {
        let transfer = self.lock().transfers.get(&id).cloned();
        Box::pin(ready(Ok(transfer)))
    }
}
