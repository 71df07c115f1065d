//! Error taxonomy for the ledger.
//!
//! Services return [`LedgerError`]; storage adapters return [`StorageError`].
//! The transport layer maps each variant onto exactly one wire code, so new
//! variants need a matching classification there.

use crate::types::TransferId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by a storage adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Connection, query or commit failure.
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization failure or lock contention; the operation may succeed on retry.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A row with the same unique key already exists.
    #[error("Duplicate: {0}")]
    Duplicate(String),

    /// A stored row cannot be mapped back into a domain value.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StorageError {
    /// Whether retrying the same operation may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Errors raised by the ledger, exchange rate, transfer and resiliency services.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// No account with the given number.
    #[error("Account not found: {account_number}")]
    AccountNotFound {
        /// The number that was looked up
        account_number: String,
    },

    /// Transfer source does not exist.
    #[error("Source account not found: {account_number}")]
    SourceAccountNotFound {
        /// The number that was looked up
        account_number: String,
    },

    /// Transfer destination does not exist.
    #[error("Destination account not found: {account_number}")]
    DestinationAccountNotFound {
        /// The number that was looked up
        account_number: String,
    },

    /// No exchange rate window covers the requested instant.
    #[error("No exchange rate from {from} to {to} at {at}")]
    RateNotFound {
        /// Source currency
        from: String,
        /// Target currency
        to: String,
        /// Instant that was looked up
        at: DateTime<Utc>,
    },

    /// Transaction type is neither IN nor OUT.
    #[error("Unknown transaction type")]
    UnknownTransactionType,

    /// Amount violates a precondition (negative, zero where forbidden, or non-positive rate).
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// Offending amount
        amount: Decimal,
    },

    /// Account number is blank or otherwise unusable.
    #[error("Invalid account number: {reason}")]
    InvalidAccountNumber {
        /// What is wrong with it
        reason: String,
    },

    /// Currency code is blank or otherwise unusable.
    #[error("Invalid currency: {reason}")]
    InvalidCurrency {
        /// What is wrong with it
        reason: String,
    },

    /// Exchange rate window ends before it starts.
    #[error("Invalid validity window: {valid_from} is after {valid_to}")]
    InvalidWindow {
        /// Window start
        valid_from: DateTime<Utc>,
        /// Window end
        valid_to: DateTime<Utc>,
    },

    /// Fault injection was asked to pick from no status codes.
    #[error("Status code set is empty")]
    EmptyStatusCodeSet,

    /// The transfer header could not be written; nothing was recorded.
    #[error("Failed to record transfer: {0}")]
    TransferRecordFailed(StorageError),

    /// The two-leg mutation rolled back; the header stays as a failed attempt.
    #[error("Transfer {transfer_id} failed: {source}")]
    TransferPairFailed {
        /// Header of the failed attempt
        transfer_id: TransferId,
        /// Source account number
        from_account_number: String,
        /// Destination account number
        to_account_number: String,
        /// Currency of the attempt
        currency: String,
        /// Amount of the attempt
        amount: Decimal,
        /// Underlying storage failure
        source: StorageError,
    },

    /// Any other storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl LedgerError {
    /// Whether the error was caused by caller input rather than the system.
    #[must_use]
    pub const fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::UnknownTransactionType
                | Self::InvalidAmount { .. }
                | Self::InvalidAccountNumber { .. }
                | Self::InvalidCurrency { .. }
                | Self::InvalidWindow { .. }
                | Self::EmptyStatusCodeSet
        )
    }
}
