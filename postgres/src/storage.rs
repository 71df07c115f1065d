//! [`LedgerStorage`] over a Postgres pool.

use crate::error::with_context;
use chrono::{DateTime, Utc};
use ledger_rpc_core::storage::{LedgerStorage, StorageFuture};
use ledger_rpc_core::{
    Account, AccountId, ExchangeRate, ExchangeRateId, StorageError, Transaction, TransactionId,
    TransactionType, Transfer, TransferId,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

/// Postgres-backed ledger storage.
///
/// Balance changes lock the account rows with `SELECT ... FOR UPDATE` and add
/// the signed delta in SQL, so concurrent writers on the same account
/// serialize. Transfers lock both rows in key order.
#[derive(Clone, Debug)]
pub struct PostgresLedgerStorage {
    pool: PgPool,
}

impl PostgresLedgerStorage {
    /// Create a storage over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    account_uuid: Uuid,
    account_number: String,
    account_name: String,
    currency: String,
    current_balance: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Self {
            id: AccountId::from_uuid(row.account_uuid),
            number: row.account_number,
            name: row.account_name,
            currency: row.currency,
            current_balance: row.current_balance,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    transaction_uuid: Uuid,
    account_uuid: Uuid,
    transaction_timestamp: DateTime<Utc>,
    amount: Decimal,
    transaction_type: String,
    notes: String,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StorageError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let transaction_type: TransactionType = row.transaction_type.parse().map_err(|_| {
            StorageError::Corrupt(format!(
                "transaction {} has type {:?}",
                row.transaction_uuid, row.transaction_type
            ))
        })?;
        Ok(Self {
            id: TransactionId::from_uuid(row.transaction_uuid),
            account_id: AccountId::from_uuid(row.account_uuid),
            timestamp: row.transaction_timestamp,
            amount: row.amount,
            transaction_type,
            notes: row.notes,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ExchangeRateRow {
    exchange_rate_uuid: Uuid,
    from_currency: String,
    to_currency: String,
    rate: Decimal,
    valid_from_timestamp: DateTime<Utc>,
    valid_to_timestamp: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<ExchangeRateRow> for ExchangeRate {
    fn from(row: ExchangeRateRow) -> Self {
        Self {
            id: ExchangeRateId::from_uuid(row.exchange_rate_uuid),
            from_currency: row.from_currency,
            to_currency: row.to_currency,
            rate: row.rate,
            valid_from: row.valid_from_timestamp,
            valid_to: row.valid_to_timestamp,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TransferRow {
    transfer_uuid: Uuid,
    from_account_uuid: Uuid,
    to_account_uuid: Uuid,
    currency: String,
    amount: Decimal,
    transfer_timestamp: DateTime<Utc>,
    transfer_success: bool,
}

impl From<TransferRow> for Transfer {
    fn from(row: TransferRow) -> Self {
        Self {
            id: TransferId::from_uuid(row.transfer_uuid),
            from_account_id: AccountId::from_uuid(row.from_account_uuid),
            to_account_id: AccountId::from_uuid(row.to_account_uuid),
            currency: row.currency,
            amount: row.amount,
            timestamp: row.transfer_timestamp,
            success: row.transfer_success,
        }
    }
}

fn signed(transaction: &Transaction) -> Result<Decimal, StorageError> {
    transaction
        .signed_amount()
        .map_err(|e| StorageError::Corrupt(format!("transaction {}: {e}", transaction.id)))
}

async fn insert_transaction(
    conn: &mut sqlx::PgConnection,
    transaction: &Transaction,
) -> Result<(), StorageError> {
    sqlx::query(
        r"
        INSERT INTO bank_transactions
            (transaction_uuid, account_uuid, transaction_timestamp, amount, transaction_type, notes)
        VALUES ($1, $2, $3, $4, $5, $6)
        ",
    )
    .bind(transaction.id.as_uuid())
    .bind(transaction.account_id.as_uuid())
    .bind(transaction.timestamp)
    .bind(transaction.amount)
    .bind(transaction.transaction_type.as_str())
    .bind(&transaction.notes)
    .execute(conn)
    .await
    .map_err(with_context("Failed to insert transaction"))?;
    Ok(())
}

async fn apply_delta(
    conn: &mut sqlx::PgConnection,
    account_id: AccountId,
    delta: Decimal,
    at: DateTime<Utc>,
) -> Result<(), StorageError> {
    sqlx::query(
        r"
        UPDATE bank_accounts
        SET current_balance = current_balance + $2,
            updated_at = GREATEST(updated_at, $3)
        WHERE account_uuid = $1
        ",
    )
    .bind(account_id.as_uuid())
    .bind(delta)
    .bind(at)
    .execute(conn)
    .await
    .map_err(with_context("Failed to update balance"))?;
    Ok(())
}

/// Locks the given account rows in key order and returns how many exist.
async fn lock_accounts(
    conn: &mut sqlx::PgConnection,
    ids: &[Uuid],
) -> Result<usize, StorageError> {
    let locked: Vec<(Uuid,)> = sqlx::query_as(
        r"
        SELECT account_uuid
        FROM bank_accounts
        WHERE account_uuid = ANY($1)
        ORDER BY account_uuid
        FOR UPDATE
        ",
    )
    .bind(ids)
    .fetch_all(conn)
    .await
    .map_err(with_context("Failed to lock accounts"))?;
    Ok(locked.len())
}

impl LedgerStorage for PostgresLedgerStorage {
    fn create_account(&self, account: Account) -> StorageFuture<'_, AccountId> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO bank_accounts
                    (account_uuid, account_number, account_name, currency, current_balance, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ",
            )
            .bind(account.id.as_uuid())
            .bind(&account.number)
            .bind(&account.name)
            .bind(&account.currency)
            .bind(account.current_balance)
            .bind(account.created_at)
            .bind(account.updated_at)
            .execute(&self.pool)
            .await
            .map_err(with_context("Failed to create account"))?;

            tracing::debug!(account_number = %account.number, "Account row inserted");
            Ok(account.id)
        })
    }

    fn get_account(&self, number: &str) -> StorageFuture<'_, Option<Account>> {
        let number = number.to_string();
        Box::pin(async move {
            let row: Option<AccountRow> = sqlx::query_as(
                r"
                SELECT account_uuid, account_number, account_name, currency,
                       current_balance, created_at, updated_at
                FROM bank_accounts
                WHERE account_number = $1
                ",
            )
            .bind(&number)
            .fetch_optional(&self.pool)
            .await
            .map_err(with_context("Failed to get account"))?;

            Ok(row.map(Account::from))
        })
    }

    fn create_transaction_and_update_balance(
        &self,
        account: &Account,
        transaction: Transaction,
    ) -> StorageFuture<'_, TransactionId> {
        let account_id = account.id;
        Box::pin(async move {
            let delta = signed(&transaction)?;

            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(with_context("Failed to start transaction"))?;

            if lock_accounts(&mut tx, &[*account_id.as_uuid()]).await? != 1 {
                let _ = tx.rollback().await;
                return Err(StorageError::Database(format!(
                    "account {account_id} does not exist"
                )));
            }

            insert_transaction(&mut tx, &transaction).await?;
            apply_delta(&mut tx, account_id, delta, transaction.timestamp).await?;

            tx.commit()
                .await
                .map_err(with_context("Failed to commit transaction"))?;

            Ok(transaction.id)
        })
    }

    fn transactions_for_account(&self, account_id: AccountId) -> StorageFuture<'_, Vec<Transaction>> {
        Box::pin(async move {
            let rows: Vec<TransactionRow> = sqlx::query_as(
                r"
                SELECT transaction_uuid, account_uuid, transaction_timestamp,
                       amount, transaction_type, notes
                FROM bank_transactions
                WHERE account_uuid = $1
                ORDER BY transaction_timestamp, created_at
                ",
            )
            .bind(account_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(with_context("Failed to list transactions"))?;

            rows.into_iter().map(Transaction::try_from).collect()
        })
    }

    fn create_exchange_rate(&self, rate: ExchangeRate) -> StorageFuture<'_, ExchangeRateId> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO bank_exchange_rates
                    (exchange_rate_uuid, from_currency, to_currency, rate,
                     valid_from_timestamp, valid_to_timestamp, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
                ",
            )
            .bind(rate.id.as_uuid())
            .bind(&rate.from_currency)
            .bind(&rate.to_currency)
            .bind(rate.rate)
            .bind(rate.valid_from)
            .bind(rate.valid_to)
            .bind(rate.created_at)
            .execute(&self.pool)
            .await
            .map_err(with_context("Failed to create exchange rate"))?;

            Ok(rate.id)
        })
    }

    fn resolve_exchange_rate(
        &self,
        from: &str,
        to: &str,
        at: DateTime<Utc>,
    ) -> StorageFuture<'_, Option<ExchangeRate>> {
        let from = from.to_string();
        let to = to.to_string();
        Box::pin(async move {
            let row: Option<ExchangeRateRow> = sqlx::query_as(
                r"
                SELECT exchange_rate_uuid, from_currency, to_currency, rate,
                       valid_from_timestamp, valid_to_timestamp, created_at
                FROM bank_exchange_rates
                WHERE from_currency = $1
                  AND to_currency = $2
                  AND $3 BETWEEN valid_from_timestamp AND valid_to_timestamp
                ORDER BY created_at DESC, valid_from_timestamp DESC
                LIMIT 1
                ",
            )
            .bind(&from)
            .bind(&to)
            .bind(at)
            .fetch_optional(&self.pool)
            .await
            .map_err(with_context("Failed to resolve exchange rate"))?;

            Ok(row.map(ExchangeRate::from))
        })
    }

    fn create_transfer_header(&self, transfer: Transfer) -> StorageFuture<'_, TransferId> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO bank_transfers
                    (transfer_uuid, from_account_uuid, to_account_uuid, currency,
                     amount, transfer_timestamp, transfer_success)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ",
            )
            .bind(transfer.id.as_uuid())
            .bind(transfer.from_account_id.as_uuid())
            .bind(transfer.to_account_id.as_uuid())
            .bind(&transfer.currency)
            .bind(transfer.amount)
            .bind(transfer.timestamp)
            .bind(transfer.success)
            .execute(&self.pool)
            .await
            .map_err(with_context("Failed to create transfer"))?;

            Ok(transfer.id)
        })
    }

    fn create_transfer_pair_and_update_balances(
        &self,
        transfer_id: TransferId,
        from: &Account,
        to: &Account,
        from_leg: Transaction,
        to_leg: Transaction,
    ) -> StorageFuture<'_, ()> {
        let from_id = from.id;
        let to_id = to.id;
        Box::pin(async move {
            let from_delta = signed(&from_leg)?;
            let to_delta = signed(&to_leg)?;

            let mut tx: sqlx::Transaction<'_, Postgres> = self
                .pool
                .begin()
                .await
                .map_err(with_context("Failed to start transaction"))?;

            let ids = [*from_id.as_uuid(), *to_id.as_uuid()];
            if lock_accounts(&mut tx, &ids).await? != 2 {
                let _ = tx.rollback().await;
                return Err(StorageError::Database(format!(
                    "account {from_id} or {to_id} does not exist"
                )));
            }

            insert_transaction(&mut tx, &from_leg).await?;
            insert_transaction(&mut tx, &to_leg).await?;
            apply_delta(&mut tx, from_id, from_delta, from_leg.timestamp).await?;
            apply_delta(&mut tx, to_id, to_delta, to_leg.timestamp).await?;

            let marked = sqlx::query(
                r"
                UPDATE bank_transfers
                SET transfer_success = TRUE,
                    updated_at = now()
                WHERE transfer_uuid = $1
                ",
            )
            .bind(transfer_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(with_context("Failed to mark transfer successful"))?;
            if marked.rows_affected() == 0 {
                let _ = tx.rollback().await;
                return Err(StorageError::Database(format!(
                    "transfer {transfer_id} does not exist"
                )));
            }

            tx.commit()
                .await
                .map_err(with_context("Failed to commit transfer"))?;

            Ok(())
        })
    }

    fn update_transfer_status(&self, id: TransferId, success: bool) -> StorageFuture<'_, ()> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE bank_transfers
                SET transfer_success = $2,
                    updated_at = now()
                WHERE transfer_uuid = $1
                ",
            )
            .bind(id.as_uuid())
            .bind(success)
            .execute(&self.pool)
            .await
            .map_err(with_context("Failed to update transfer status"))?;

            if result.rows_affected() == 0 {
                return Err(StorageError::Database(format!("transfer {id} does not exist")));
            }
            Ok(())
        })
    }

    fn get_transfer(&self, id: TransferId) -> StorageFuture<'_, Option<Transfer>> {
        Box::pin(async move {
            let row: Option<TransferRow> = sqlx::query_as(
                r"
                SELECT transfer_uuid, from_account_uuid, to_account_uuid, currency,
                       amount, transfer_timestamp, transfer_success
                FROM bank_transfers
                WHERE transfer_uuid = $1
                ",
            )
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(with_context("Failed to get transfer"))?;

            Ok(row.map(Transfer::from))
        })
    }
}
