//! Storage port for the ledger.
//!
//! The services in `ledger-rpc-runtime` never touch a database directly; they
//! talk to a [`LedgerStorage`] implementation.
//!
//! # Implementations
//!
//! - `PostgresLedgerStorage` (in `ledger-rpc-postgres`): production, sqlx with row locks
//! - `InMemoryLedgerStorage` (in `ledger-rpc-testing`): fast, deterministic tests
//!
//! # Serialization contract
//!
//! Every balance-changing operation must serialize against other writers of the
//! same account row, and must apply the signed delta to the *locked* row rather
//! than to the caller's copy. The `&Account` arguments identify the row; their
//! `current_balance` is informational only. Two-account operations lock in a
//! stable order so concurrent transfers in opposite directions cannot deadlock.

use crate::error::StorageError;
use crate::types::{
    Account, AccountId, ExchangeRate, ExchangeRateId, Transaction, TransactionId, Transfer,
    TransferId,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by every port method.
pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// Durable store for accounts, transactions, exchange rates and transfers.
///
/// # Dyn Compatibility
///
/// Methods return `Pin<Box<dyn Future>>` instead of using `async fn` so the
/// services can hold an `Arc<dyn LedgerStorage>`.
pub trait LedgerStorage: Send + Sync {
    /// Inserts a new account row.
    ///
    /// # Errors
    ///
    /// - `Duplicate`: the account number is already taken
    /// - `Database`: the insert failed
    fn create_account(&self, account: Account) -> StorageFuture<'_, AccountId>;

    /// Looks an account up by its external number.
    ///
    /// Returns `Ok(None)` when no such account exists.
    ///
    /// # Errors
    ///
    /// - `Database`: the query failed
    /// - `Corrupt`: the row cannot be decoded
    fn get_account(&self, number: &str) -> StorageFuture<'_, Option<Account>>;

    /// Persists `transaction` and applies its signed amount to the account
    /// balance in one atomic unit.
    ///
    /// # Errors
    ///
    /// - `Corrupt`: the transaction has no direction
    /// - `Database`: the account vanished or the commit failed (nothing is applied)
    /// - `Conflict`: lock contention; safe to retry
    fn create_transaction_and_update_balance(
        &self,
        account: &Account,
        transaction: Transaction,
    ) -> StorageFuture<'_, TransactionId>;

    /// Lists the transactions of one account, oldest first.
    ///
    /// # Errors
    ///
    /// - `Database`: the query failed
    fn transactions_for_account(&self, account_id: AccountId) -> StorageFuture<'_, Vec<Transaction>>;

    /// Inserts an exchange rate window. Overlaps are not checked.
    ///
    /// # Errors
    ///
    /// - `Database`: the insert failed
    fn create_exchange_rate(&self, rate: ExchangeRate) -> StorageFuture<'_, ExchangeRateId>;

    /// Finds the window for `from → to` covering `at`.
    ///
    /// When several windows overlap, the one created last wins, then the one
    /// with the latest `valid_from`.
    ///
    /// # Errors
    ///
    /// - `Database`: the query failed
    fn resolve_exchange_rate(
        &self,
        from: &str,
        to: &str,
        at: DateTime<Utc>,
    ) -> StorageFuture<'_, Option<ExchangeRate>>;

    /// Inserts a transfer header.
    ///
    /// # Errors
    ///
    /// - `Database`: the insert failed
    fn create_transfer_header(&self, transfer: Transfer) -> StorageFuture<'_, TransferId>;

    /// Writes both legs of a transfer, both balance changes and the
    /// `success = true` flag of header `transfer_id` atomically.
    ///
    /// Either every row changes or none does, so a header reads `false`
    /// exactly when no leg was applied.
    ///
    /// # Errors
    ///
    /// - `Database`: an account or the header vanished, or the commit failed
    /// - `Conflict`: lock contention; safe to retry
    fn create_transfer_pair_and_update_balances(
        &self,
        transfer_id: TransferId,
        from: &Account,
        to: &Account,
        from_leg: Transaction,
        to_leg: Transaction,
    ) -> StorageFuture<'_, ()>;

    /// Sets the `success` flag of a transfer header.
    ///
    /// # Errors
    ///
    /// - `Database`: the header does not exist or the update failed
    fn update_transfer_status(&self, id: TransferId, success: bool) -> StorageFuture<'_, ()>;

    /// Loads a transfer header.
    ///
    /// # Errors
    ///
    /// - `Database`: the query failed
    fn get_transfer(&self, id: TransferId) -> StorageFuture<'_, Option<Transfer>>;
}
