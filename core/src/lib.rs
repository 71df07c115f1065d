//! # Ledger RPC Core
//!
//! Domain types and ports for the ledger RPC service.
//!
//! This crate has no I/O. It defines:
//!
//! - **Entities**: [`Account`], [`Transaction`], [`ExchangeRate`], [`Transfer`]
//! - **Errors**: [`LedgerError`] for services, [`StorageError`] for adapters
//! - **Storage Port**: [`LedgerStorage`], implemented by the postgres and testing crates
//! - **Environment**: the [`Clock`] trait
//!
//! ## Invariants
//!
//! - An account's `current_balance` equals the sum of its IN amounts minus the
//!   sum of its OUT amounts after every commit.
//! - A transfer either applies both legs and both balances and ends with
//!   `success = true`, or applies nothing and keeps `success = false`.

pub mod environment;
pub mod error;
pub mod storage;
pub mod summary;
pub mod types;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use environment::{Clock, SystemClock};
pub use error::{LedgerError, StorageError};
pub use rust_decimal::Decimal;
pub use storage::{LedgerStorage, StorageFuture};
pub use summary::TransactionSummary;
pub use types::{
    Account, AccountId, ExchangeRate, ExchangeRateId, NewExchangeRate, NewTransaction,
    Transaction, TransactionId, TransactionType, Transfer, TransferId, TransferOrder,
    TransferReceipt,
};
