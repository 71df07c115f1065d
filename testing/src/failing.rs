//! Storage wrapper that fails selected operations on demand.

use ledger_rpc_core::storage::{LedgerStorage, StorageFuture};
use ledger_rpc_core::{
    Account, AccountId, DateTime, ExchangeRate, ExchangeRateId, StorageError, Transaction,
    TransactionId, Transfer, TransferId, Utc,
};
use std::collections::HashMap;
use std::future::ready;
use std::sync::{Arc, Mutex, PoisonError};

/// Port operations that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageOperation {
    /// `create_account`
    CreateAccount,
    /// `get_account`
    GetAccount,
    /// `create_transaction_and_update_balance`
    CreateTransaction,
    /// `transactions_for_account`
    TransactionsForAccount,
    /// `create_exchange_rate`
    CreateExchangeRate,
    /// `resolve_exchange_rate`
    ResolveExchangeRate,
    /// `create_transfer_header`
    CreateTransferHeader,
    /// `create_transfer_pair_and_update_balances`
    CreateTransferPair,
    /// `update_transfer_status`
    UpdateTransferStatus,
    /// `get_transfer`
    GetTransfer,
}

#[derive(Debug)]
struct Failure {
    error: StorageError,
    remaining: Option<usize>,
}

/// Wraps another [`LedgerStorage`] and injects errors.
///
/// Operations without a configured failure are forwarded untouched.
///
/// # Example
///
/// ```
/// use ledger_rpc_core::StorageError;
/// use ledger_rpc_testing::{FailingStorage, InMemoryLedgerStorage, StorageOperation};
///
/// let storage = FailingStorage::new(InMemoryLedgerStorage::new());
/// storage.fail_always(
///     StorageOperation::CreateTransferPair,
///     StorageError::Database("disk full".into()),
/// );
/// ```
#[derive(Clone)]
pub struct FailingStorage {
    inner: Arc<dyn LedgerStorage>,
    failures: Arc<Mutex<HashMap<StorageOperation, Failure>>>,
    calls: Arc<Mutex<HashMap<StorageOperation, usize>>>,
}

impl FailingStorage {
    /// Wrap `inner`.
    #[must_use]
    pub fn new(inner: impl LedgerStorage + 'static) -> Self {
        Self::from_arc(Arc::new(inner))
    }

    /// Wrap a shared storage.
    #[must_use]
    pub fn from_arc(inner: Arc<dyn LedgerStorage>) -> Self {
        Self {
            inner,
            failures: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Fail every call to `operation` with `error`.
    pub fn fail_always(&self, operation: StorageOperation, error: StorageError) {
        self.set(operation, Failure { error, remaining: None });
    }

    /// Fail the next `times` calls to `operation`, then forward again.
    pub fn fail_times(&self, operation: StorageOperation, times: usize, error: StorageError) {
        self.set(operation, Failure { error, remaining: Some(times) });
    }

    /// Stop failing `operation`.
    pub fn recover(&self, operation: StorageOperation) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&operation);
    }

    /// How many times `operation` was invoked, failed or not.
    #[must_use]
    pub fn calls(&self, operation: StorageOperation) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    fn set(&self, operation: StorageOperation, failure: Failure) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(operation, failure);
    }

    fn check(&self, operation: StorageOperation) -> Result<(), StorageError> {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(operation)
            .or_insert(0) += 1;

        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(failure) = failures.get_mut(&operation) else {
            return Ok(());
        };

        let error = failure.error.clone();
        match failure.remaining {
            None => Err(error),
            Some(0) => {
                failures.remove(&operation);
                Ok(())
            },
            Some(n) => {
                failure.remaining = Some(n - 1);
                Err(error)
            },
        }
    }
}

macro_rules! guarded {
    ($self:ident, $operation:expr, $call:expr) => {
        match $self.check($operation) {
            Ok(()) => $call,
            Err(e) => return Box::pin(ready(Err(e))),
        }
    };
}

impl LedgerStorage for FailingStorage {
    fn create_account(&self, account: Account) -> StorageFuture<'_, AccountId> {
        guarded!(self, StorageOperation::CreateAccount, self.inner.create_account(account))
    }

    fn get_account(&self, number: &str) -> StorageFuture<'_, Option<Account>> {
        guarded!(self, StorageOperation::GetAccount, self.inner.get_account(number))
    }

    fn create_transaction_and_update_balance(
        &self,
        account: &Account,
        transaction: Transaction,
    ) -> StorageFuture<'_, TransactionId> {
        guarded!(
            self,
            StorageOperation::CreateTransaction,
            self.inner.create_transaction_and_update_balance(account, transaction)
        )
    }

    fn transactions_for_account(&self, account_id: AccountId) -> StorageFuture<'_, Vec<Transaction>> {
        guarded!(
            self,
            StorageOperation::TransactionsForAccount,
            self.inner.transactions_for_account(account_id)
        )
    }

    fn create_exchange_rate(&self, rate: ExchangeRate) -> StorageFuture<'_, ExchangeRateId> {
        guarded!(self, StorageOperation::CreateExchangeRate, self.inner.create_exchange_rate(rate))
    }

    fn resolve_exchange_rate(
        &self,
        from: &str,
        to: &str,
        at: DateTime<Utc>,
    ) -> StorageFuture<'_, Option<ExchangeRate>> {
        guarded!(
            self,
            StorageOperation::ResolveExchangeRate,
            self.inner.resolve_exchange_rate(from, to, at)
        )
    }

    fn create_transfer_header(&self, transfer: Transfer) -> StorageFuture<'_, TransferId> {
        guarded!(
            self,
            StorageOperation::CreateTransferHeader,
            self.inner.create_transfer_header(transfer)
        )
    }

    fn create_transfer_pair_and_update_balances(
        &self,
        transfer_id: TransferId,
        from: &Account,
        to: &Account,
        from_leg: Transaction,
        to_leg: Transaction,
    ) -> StorageFuture<'_, ()> {
        guarded!(
            self,
            StorageOperation::CreateTransferPair,
            self.inner
                .create_transfer_pair_and_update_balances(transfer_id, from, to, from_leg, to_leg)
        )
    }

    fn update_transfer_status(&self, id: TransferId, success: bool) -> StorageFuture<'_, ()> {
        guarded!(
            self,
            StorageOperation::UpdateTransferStatus,
            self.inner.update_transfer_status(id, success)
        )
    }

    fn get_transfer(&self, id: TransferId) -> StorageFuture<'_, Option<Transfer>> {
        guarded!(self, StorageOperation::GetTransfer, self.inner.get_transfer(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryLedgerStorage;

    #[tokio::test]
    async fn test_fail_times_recovers() {
        let storage = FailingStorage::new(InMemoryLedgerStorage::new());
        storage.fail_times(
            StorageOperation::GetAccount,
            2,
            StorageError::Conflict("busy".into()),
        );

        assert!(storage.get_account("A").await.is_err());
        assert!(storage.get_account("A").await.is_err());
        assert!(matches!(storage.get_account("A").await, Ok(None)));
        assert_eq!(storage.calls(StorageOperation::GetAccount), 3);
    }

    #[tokio::test]
    async fn test_unconfigured_operations_forward() {
        let storage = FailingStorage::new(InMemoryLedgerStorage::new());
        storage.fail_always(
            StorageOperation::CreateTransferPair,
            StorageError::Database("down".into()),
        );

        assert!(matches!(storage.get_account("A").await, Ok(None)));
        storage.recover(StorageOperation::CreateTransferPair);
        assert_eq!(storage.calls(StorageOperation::CreateTransferPair), 0);
    }
}
