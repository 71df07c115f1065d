//! Balance lookup, transaction recording and summary accumulation.

use crate::metrics::LedgerMetrics;
use ledger_rpc_core::{
    Account, Clock, LedgerError, LedgerStorage, NewTransaction, Transaction, TransactionId,
    TransactionSummary, TransactionType,
};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Most fractional digits a stored amount or balance keeps.
pub const MAX_AMOUNT_SCALE: u32 = 4;

/// Whole digits a stored amount or balance can hold.
pub const MAX_AMOUNT_WHOLE_DIGITS: u32 = 16;

/// Ledger operations on single accounts.
#[derive(Clone)]
pub struct LedgerService {
    storage: Arc<dyn LedgerStorage>,
    clock: Arc<dyn Clock>,
}

impl LedgerService {
    /// Create a service over `storage`, stamping times from `clock`.
    #[must_use]
    pub fn new(storage: Arc<dyn LedgerStorage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Resolves an account by number.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAccountNumber`] for a blank number
    /// - [`LedgerError::AccountNotFound`] when no such account exists
    /// - [`LedgerError::Storage`] when the lookup fails
    pub async fn find_account(&self, account_number: &str) -> Result<Account, LedgerError> {
        validate_account_number(account_number)?;
        self.storage
            .get_account(account_number)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound {
                account_number: account_number.to_string(),
            })
    }

    /// Current balance of an account.
    ///
    /// A missing account is an error, never a zero balance.
    ///
    /// # Errors
    ///
    /// Same as [`find_account`](Self::find_account).
    pub async fn find_current_balance(&self, account_number: &str) -> Result<Decimal, LedgerError> {
        let account = self.find_account(account_number).await?;
        Ok(account.current_balance)
    }

    /// Records a transaction and updates the account balance atomically.
    ///
    /// The transaction is validated before any I/O; a missing timestamp
    /// defaults to the service clock.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAccountNumber`] for a blank number
    /// - [`LedgerError::InvalidAmount`] for a negative amount, or one the ledger
    ///   cannot store exactly (see [`validate_amount`])
    /// - [`LedgerError::UnknownTransactionType`] for UNKNOWN
    /// - [`LedgerError::AccountNotFound`] when no such account exists
    /// - [`LedgerError::Storage`] when the write fails (nothing is applied)
    pub async fn create_transaction(
        &self,
        account_number: &str,
        new_transaction: NewTransaction,
    ) -> Result<TransactionId, LedgerError> {
        validate_account_number(account_number)?;
        validate_transaction(&new_transaction)?;

        let account = self.find_account(account_number).await?;
        let transaction = Transaction::new(
            account.id,
            new_transaction.timestamp.unwrap_or_else(|| self.clock.now()),
            new_transaction.amount,
            new_transaction.transaction_type,
            new_transaction.notes,
        );
        let transaction_type = transaction.transaction_type;

        let id = self
            .storage
            .create_transaction_and_update_balance(&account, transaction)
            .await?;

        LedgerMetrics::record_transaction(transaction_type.as_str());
        tracing::debug!(
            account_number,
            transaction_id = %id,
            transaction_type = %transaction_type,
            "Transaction recorded"
        );
        Ok(id)
    }

    /// Adds a transaction to a running summary. No I/O.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownTransactionType`] for UNKNOWN.
    pub fn accumulate_summary(
        summary: &mut TransactionSummary,
        transaction: &NewTransaction,
    ) -> Result<(), LedgerError> {
        summary.accumulate(transaction.transaction_type, transaction.amount)
    }

    /// Opens a new account; a non-zero opening balance is booked as a transaction.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAccountNumber`] / [`LedgerError::InvalidCurrency`] for blank fields
    /// - [`LedgerError::InvalidAmount`] for an opening balance that cannot be stored exactly
    /// - [`LedgerError::Storage`] when the number is taken or the insert fails
    pub async fn open_account(
        &self,
        account_number: &str,
        name: &str,
        currency: &str,
        opening_balance: Decimal,
    ) -> Result<Account, LedgerError> {
        validate_account_number(account_number)?;
        validate_currency(currency)?;
        validate_amount(opening_balance)?;
        let now = self.clock.now();
        let mut account = Account::open(account_number, name, currency, now);
        self.storage.create_account(account.clone()).await?;

        if let Some(opening) = Transaction::opening(account.id, opening_balance, now) {
            self.storage
                .create_transaction_and_update_balance(&account, opening)
                .await?;
            account.current_balance = opening_balance;
        }

        tracing::info!(account_number, currency, "Account opened");
        Ok(account)
    }

    /// Transactions of an account, oldest first.
    ///
    /// # Errors
    ///
    /// Same as [`find_account`](Self::find_account).
    pub async fn transactions(&self, account_number: &str) -> Result<Vec<Transaction>, LedgerError> {
        let account = self.find_account(account_number).await?;
        Ok(self.storage.transactions_for_account(account.id).await?)
    }

    /// The service clock.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

pub(crate) fn validate_account_number(account_number: &str) -> Result<(), LedgerError> {
    if account_number.trim().is_empty() {
        return Err(LedgerError::InvalidAccountNumber {
            reason: "account number must not be blank".to_string(),
        });
    }
    Ok(())
}

pub(crate) fn validate_currency(currency: &str) -> Result<(), LedgerError> {
    if currency.trim().is_empty() {
        return Err(LedgerError::InvalidCurrency {
            reason: "currency must not be blank".to_string(),
        });
    }
    Ok(())
}

/// Rejects amounts the ledger columns would round or overflow.
///
/// Balances and amounts are stored with [`MAX_AMOUNT_SCALE`] fractional
/// digits. A finer amount would be rounded separately from the balance it
/// changes, so the balance would drift from the sum of its transactions.
///
/// # Errors
///
/// [`LedgerError::InvalidAmount`] for more than [`MAX_AMOUNT_SCALE`]
/// significant fractional digits or [`MAX_AMOUNT_WHOLE_DIGITS`] whole digits.
pub fn validate_amount(amount: Decimal) -> Result<(), LedgerError> {
    let limit = Decimal::from(10_u64.pow(MAX_AMOUNT_WHOLE_DIGITS));
    if amount.normalize().scale() > MAX_AMOUNT_SCALE || amount.abs() >= limit {
        return Err(LedgerError::InvalidAmount { amount });
    }
    Ok(())
}

fn validate_transaction(transaction: &NewTransaction) -> Result<(), LedgerError> {
    if transaction.amount.is_sign_negative() && !transaction.amount.is_zero() {
        return Err(LedgerError::InvalidAmount {
            amount: transaction.amount,
        });
    }
    validate_amount(transaction.amount)?;
    if transaction.transaction_type == TransactionType::Unknown {
        return Err(LedgerError::UnknownTransactionType);
    }
    Ok(())
}
