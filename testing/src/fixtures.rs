//! Seed data helpers.

use ledger_rpc_core::{
    Account, DateTime, ExchangeRate, ExchangeRateId, LedgerStorage, StorageError, Transaction, Utc,
};
use rust_decimal::Decimal;

/// Open and store an account, funding it with an opening transaction.
///
/// # Errors
///
/// Whatever the storage returns for `create_account` or the opening transaction.
pub async fn seed_account(
    storage: &dyn LedgerStorage,
    number: &str,
    currency: &str,
    balance: Decimal,
    at: DateTime<Utc>,
) -> Result<Account, StorageError> {
    let mut account = Account::open(number, format!("Holder of {number}"), currency, at);
    storage.create_account(account.clone()).await?;
    if let Some(opening) = Transaction::opening(account.id, balance, at) {
        storage
            .create_transaction_and_update_balance(&account, opening)
            .await?;
        account.current_balance = balance;
    }
    Ok(account)
}

/// Store an exchange rate window.
///
/// # Errors
///
/// Whatever the storage returns for `create_exchange_rate`.
pub async fn seed_rate(
    storage: &dyn LedgerStorage,
    from: &str,
    to: &str,
    rate: Decimal,
    valid_from: DateTime<Utc>,
    valid_to: DateTime<Utc>,
) -> Result<ExchangeRate, StorageError> {
    let rate = ExchangeRate {
        id: ExchangeRateId::new(),
        from_currency: from.to_string(),
        to_currency: to.to_string(),
        rate,
        valid_from,
        valid_to,
        created_at: valid_from,
    };
    storage.create_exchange_rate(rate.clone()).await?;
    Ok(rate)
}
