//! Domain entities for the ledger.
//!
//! Accounts carry a cached `current_balance` that must always equal the
//! signed sum of their transactions. Transactions store a non-negative
//! magnitude; the sign comes from [`TransactionType`].

use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Declares a UUID-backed identifier newtype.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID
            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Returns the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an account row
    AccountId
);
uuid_id!(
    /// Unique identifier for a transaction row
    TransactionId
);
uuid_id!(
    /// Unique identifier for an exchange rate window
    ExchangeRateId
);
uuid_id!(
    /// Unique identifier for a transfer header
    TransferId
);

/// Direction of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    /// Money coming into the account
    In,
    /// Money leaving the account
    Out,
    /// Unclassified; never valid for balance math
    Unknown,
}

impl TransactionType {
    /// Storage representation (`IN`, `OUT`, `UNKNOWN`)
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::Out => "OUT",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Applies the direction to a magnitude.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownTransactionType`] for [`TransactionType::Unknown`].
    pub fn sign(self, amount: Decimal) -> Result<Decimal, LedgerError> {
        match self {
            Self::In => Ok(amount),
            Self::Out => Ok(-amount),
            Self::Unknown => Err(LedgerError::UnknownTransactionType),
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN" => Ok(Self::In),
            "OUT" => Ok(Self::Out),
            "UNKNOWN" => Ok(Self::Unknown),
            _ => Err(LedgerError::UnknownTransactionType),
        }
    }
}

/// A ledger account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Row identifier
    pub id: AccountId,
    /// External account number used by callers
    pub number: String,
    /// Holder name
    pub name: String,
    /// ISO currency code the account is kept in
    pub currency: String,
    /// Cached balance, equal to the signed sum of all transactions
    pub current_balance: Decimal,
    /// When the account was opened
    pub created_at: DateTime<Utc>,
    /// Last balance change
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Opens a new account with a zero balance.
    ///
    /// Opening funds are recorded as an ordinary IN transaction so the
    /// balance always matches the transaction history.
    #[must_use]
    pub fn open(
        number: impl Into<String>,
        name: impl Into<String>,
        currency: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AccountId::new(),
            number: number.into(),
            name: name.into(),
            currency: currency.into(),
            current_balance: Decimal::ZERO,
            created_at: at,
            updated_at: at,
        }
    }

    /// Applies a transaction to the cached balance and returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownTransactionType`] if the transaction has no direction.
    pub fn apply(&mut self, transaction: &Transaction) -> Result<Decimal, LedgerError> {
        let delta = transaction.signed_amount()?;
        self.current_balance += delta;
        self.updated_at = transaction.timestamp.max(self.updated_at);
        Ok(self.current_balance)
    }
}

/// A single ledger entry against one account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Row identifier
    pub id: TransactionId,
    /// Owning account
    pub account_id: AccountId,
    /// When the movement happened
    pub timestamp: DateTime<Utc>,
    /// Non-negative magnitude
    pub amount: Decimal,
    /// Direction
    pub transaction_type: TransactionType,
    /// Free-form notes
    pub notes: String,
}

impl Transaction {
    /// Builds a transaction row for `account_id`.
    #[must_use]
    pub fn new(
        account_id: AccountId,
        timestamp: DateTime<Utc>,
        amount: Decimal,
        transaction_type: TransactionType,
        notes: impl Into<String>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            account_id,
            timestamp,
            amount,
            transaction_type,
            notes: notes.into(),
        }
    }

    /// Opening funds for a new account, or `None` for a zero amount.
    ///
    /// A negative amount becomes an OUT of its magnitude.
    #[must_use]
    pub fn opening(account_id: AccountId, amount: Decimal, at: DateTime<Utc>) -> Option<Self> {
        if amount.is_zero() {
            return None;
        }
        let transaction_type = if amount.is_sign_negative() {
            TransactionType::Out
        } else {
            TransactionType::In
        };
        Some(Self::new(account_id, at, amount.abs(), transaction_type, "Opening balance"))
    }

    /// Amount with the direction applied (`+` for IN, `-` for OUT).
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownTransactionType`] for UNKNOWN transactions.
    pub fn signed_amount(&self) -> Result<Decimal, LedgerError> {
        self.transaction_type.sign(self.amount)
    }
}

/// Caller-supplied data for a transaction that has not been stored yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTransaction {
    /// Non-negative magnitude
    pub amount: Decimal,
    /// Direction
    pub transaction_type: TransactionType,
    /// Defaults to the service clock when absent
    pub timestamp: Option<DateTime<Utc>>,
    /// Free-form notes
    pub notes: String,
}

impl NewTransaction {
    /// A transaction with no timestamp and no notes.
    #[must_use]
    pub const fn new(transaction_type: TransactionType, amount: Decimal) -> Self {
        Self {
            amount,
            transaction_type,
            timestamp: None,
            notes: String::new(),
        }
    }

    /// Sets the notes
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Sets the timestamp
    #[must_use]
    pub const fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// An exchange rate valid over `[valid_from, valid_to]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// Row identifier
    pub id: ExchangeRateId,
    /// Source currency
    pub from_currency: String,
    /// Target currency
    pub to_currency: String,
    /// Units of `to_currency` per unit of `from_currency`
    pub rate: Decimal,
    /// Inclusive window start
    pub valid_from: DateTime<Utc>,
    /// Inclusive window end
    pub valid_to: DateTime<Utc>,
    /// Insertion time; later windows win when windows overlap
    pub created_at: DateTime<Utc>,
}

impl ExchangeRate {
    /// Whether `instant` falls inside the validity window (both ends inclusive).
    #[must_use]
    pub fn covers(&self, instant: DateTime<Utc>) -> bool {
        self.valid_from <= instant && instant <= self.valid_to
    }

    /// Whether this window answers a `from → to` lookup at `instant`.
    #[must_use]
    pub fn matches(&self, from: &str, to: &str, instant: DateTime<Utc>) -> bool {
        self.from_currency == from && self.to_currency == to && self.covers(instant)
    }
}

/// Caller-supplied data for a new exchange rate window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewExchangeRate {
    /// Source currency
    pub from_currency: String,
    /// Target currency
    pub to_currency: String,
    /// Units of `to_currency` per unit of `from_currency`
    pub rate: Decimal,
    /// Inclusive window start
    pub valid_from: DateTime<Utc>,
    /// Inclusive window end
    pub valid_to: DateTime<Utc>,
}

/// Header row for a transfer attempt.
///
/// Created with `success = false` before any leg is written and flipped to
/// `true` only after both legs and both balances have committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Row identifier
    pub id: TransferId,
    /// Debited account
    pub from_account_id: AccountId,
    /// Credited account
    pub to_account_id: AccountId,
    /// Currency of the moved amount
    pub currency: String,
    /// Moved amount (positive)
    pub amount: Decimal,
    /// When the attempt started
    pub timestamp: DateTime<Utc>,
    /// Whether both legs committed
    pub success: bool,
}

/// A transfer request between two external account numbers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferOrder {
    /// Account to debit
    pub from_account_number: String,
    /// Account to credit
    pub to_account_number: String,
    /// Currency of the moved amount
    pub currency: String,
    /// Amount to move
    pub amount: Decimal,
}

/// Result of a transfer that reached the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferReceipt {
    /// Header id of the attempt
    pub transfer_id: TransferId,
    /// Whether both legs committed
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap_or_default()
    }

    #[test]
    fn test_account_apply_in_and_out() {
        let mut account = Account::open("A", "Alice", "USD", at(0));
        account.current_balance = dec!(100);

        let deposit = Transaction::new(account.id, at(1), dec!(50), TransactionType::In, "");
        assert_eq!(account.apply(&deposit).ok(), Some(dec!(150)));

        let withdrawal = Transaction::new(account.id, at(2), dec!(30), TransactionType::Out, "");
        assert_eq!(account.apply(&withdrawal).ok(), Some(dec!(120)));
        assert_eq!(account.updated_at, at(2));
    }

    #[test]
    fn test_unknown_type_leaves_balance_untouched() {
        let mut account = Account::open("A", "Alice", "USD", at(0));
        account.current_balance = dec!(100);
        let bogus = Transaction::new(account.id, at(1), dec!(5), TransactionType::Unknown, "");

        assert!(matches!(
            account.apply(&bogus),
            Err(LedgerError::UnknownTransactionType)
        ));
        assert_eq!(account.current_balance, dec!(100));
    }

    #[test]
    fn test_transaction_type_round_trips_through_storage_text() {
        for kind in [TransactionType::In, TransactionType::Out, TransactionType::Unknown] {
            assert_eq!(kind.as_str().parse::<TransactionType>().ok(), Some(kind));
        }
        assert!("SIDEWAYS".parse::<TransactionType>().is_err());
    }

    #[test]
    fn test_exchange_rate_window_is_inclusive() {
        let rate = ExchangeRate {
            id: ExchangeRateId::new(),
            from_currency: "USD".into(),
            to_currency: "BRL".into(),
            rate: dec!(5.20),
            valid_from: at(0),
            valid_to: at(5),
            created_at: at(0),
        };

        assert!(rate.matches("USD", "BRL", at(0)));
        assert!(rate.matches("USD", "BRL", at(2)));
        assert!(rate.matches("USD", "BRL", at(5)));
        assert!(!rate.matches("USD", "BRL", at(10)));
        assert!(!rate.matches("BRL", "USD", at(2)));
    }
}
