//! Two-leg fund transfers.
//!
//! A transfer is written in two phases:
//!
//! 1. A header with `success = false` is stored. It is the audit record of
//!    the attempt and is never deleted.
//! 2. Both legs, both balance changes and the header's `success = true`
//!    flag are written in one storage transaction.
//!
//! A failure in phase 2 leaves no financial effect and a `success = false`
//! header behind. A header never reads `false` once money has moved.

use crate::ledger::{validate_account_number, validate_amount, validate_currency};
use crate::metrics::LedgerMetrics;
use crate::retry::{RetryPolicy, retry_transient};
use ledger_rpc_core::{
    Account, Clock, DateTime, LedgerError, LedgerStorage, Transaction, TransactionType, Transfer,
    TransferId, TransferOrder, TransferReceipt, Utc,
};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Moves funds between two accounts.
#[derive(Clone)]
pub struct TransferEngine {
    storage: Arc<dyn LedgerStorage>,
    clock: Arc<dyn Clock>,
    pair_retry: RetryPolicy,
}

impl TransferEngine {
    /// Create an engine over `storage` with the default retry policy for lock conflicts.
    #[must_use]
    pub fn new(storage: Arc<dyn LedgerStorage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            pair_retry: RetryPolicy::default(),
        }
    }

    /// Override how the leg write is retried on lock conflicts.
    #[must_use]
    pub fn with_pair_retry(mut self, policy: RetryPolicy) -> Self {
        self.pair_retry = policy;
        self
    }

    /// Transfers `order.amount` from one account to another.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAccountNumber`], [`LedgerError::InvalidCurrency`],
    ///   [`LedgerError::InvalidAmount`] for a malformed order (no I/O happens)
    /// - [`LedgerError::SourceAccountNotFound`] / [`LedgerError::DestinationAccountNotFound`]
    /// - [`LedgerError::TransferRecordFailed`] when the header cannot be written
    /// - [`LedgerError::TransferPairFailed`] when the legs roll back; carries the header id
    pub async fn transfer(&self, order: &TransferOrder) -> Result<TransferReceipt, LedgerError> {
        validate_order(order)?;

        let from = self.resolve(&order.from_account_number).await?.ok_or_else(|| {
            LedgerMetrics::record_transfer("rejected");
            LedgerError::SourceAccountNotFound {
                account_number: order.from_account_number.clone(),
            }
        })?;
        let to = self.resolve(&order.to_account_number).await?.ok_or_else(|| {
            LedgerMetrics::record_transfer("rejected");
            LedgerError::DestinationAccountNotFound {
                account_number: order.to_account_number.clone(),
            }
        })?;

        let now = self.clock.now();
        let header = Transfer {
            id: TransferId::new(),
            from_account_id: from.id,
            to_account_id: to.id,
            currency: order.currency.clone(),
            amount: order.amount,
            timestamp: now,
            success: false,
        };

        let transfer_id = self.storage.create_transfer_header(header).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to record transfer header");
            LedgerMetrics::record_transfer("failed");
            LedgerError::TransferRecordFailed(e)
        })?;

        let (from_leg, to_leg) = legs(&from, &to, order, now);
        let committed = retry_transient(&self.pair_retry, "create_transfer_pair", || {
            self.storage.create_transfer_pair_and_update_balances(
                transfer_id,
                &from,
                &to,
                from_leg.clone(),
                to_leg.clone(),
            )
        })
        .await;
        if let Err(source) = committed {
            tracing::warn!(%transfer_id, error = %source, "Transfer legs rolled back");
            LedgerMetrics::record_transfer("failed");
            return Err(LedgerError::TransferPairFailed {
                transfer_id,
                from_account_number: order.from_account_number.clone(),
                to_account_number: order.to_account_number.clone(),
                currency: order.currency.clone(),
                amount: order.amount,
                source,
            });
        }

        LedgerMetrics::record_transfer("success");
        tracing::info!(
            %transfer_id,
            from = %order.from_account_number,
            to = %order.to_account_number,
            amount = %order.amount,
            currency = %order.currency,
            "Transfer completed"
        );

        Ok(TransferReceipt {
            transfer_id,
            success: true,
        })
    }

    async fn resolve(&self, account_number: &str) -> Result<Option<Account>, LedgerError> {
        Ok(self.storage.get_account(account_number).await?)
    }
}

fn validate_order(order: &TransferOrder) -> Result<(), LedgerError> {
    validate_account_number(&order.from_account_number)?;
    validate_account_number(&order.to_account_number)?;
    validate_currency(&order.currency)?;
    if order.amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount {
            amount: order.amount,
        });
    }
    validate_amount(order.amount)?;
    if order.from_account_number == order.to_account_number {
        return Err(LedgerError::InvalidAccountNumber {
            reason: "source and destination accounts must differ".to_string(),
        });
    }
    Ok(())
}

fn legs(
    from: &Account,
    to: &Account,
    order: &TransferOrder,
    at: DateTime<Utc>,
) -> (Transaction, Transaction) {
    let out = Transaction::new(
        from.id,
        at,
        order.amount,
        TransactionType::Out,
        format!("Transfer to {}", order.to_account_number),
    );
    let r#in = Transaction::new(
        to.id,
        at,
        order.amount,
        TransactionType::In,
        format!("Transfer from {}", order.from_account_number),
    );
    (out, r#in)
}
