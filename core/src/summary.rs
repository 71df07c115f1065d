//! Running summary for a client-streamed batch of transactions.

use crate::error::LedgerError;
use crate::types::TransactionType;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Totals accumulated over one streaming session. Never persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummary {
    /// Sum of IN amounts
    pub sum_in: Decimal,
    /// Sum of OUT amounts
    pub sum_out: Decimal,
    /// `sum_in - sum_out`
    pub sum_total: Decimal,
    /// When the summary was finalized
    pub as_of: Option<DateTime<Utc>>,
}

impl TransactionSummary {
    /// An empty summary
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one transaction to the totals.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownTransactionType`] for UNKNOWN; the totals
    /// are left untouched in that case.
    pub fn accumulate(
        &mut self,
        transaction_type: TransactionType,
        amount: Decimal,
    ) -> Result<(), LedgerError> {
        match transaction_type {
            TransactionType::In => self.sum_in += amount,
            TransactionType::Out => self.sum_out += amount,
            TransactionType::Unknown => return Err(LedgerError::UnknownTransactionType),
        }
        self.sum_total = self.sum_in - self.sum_out;
        Ok(())
    }

    /// Stamps the summary with its finalization time.
    #[must_use]
    pub const fn finalize(mut self, at: DateTime<Utc>) -> Self {
        self.as_of = Some(at);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_three_transactions() {
        let mut summary = TransactionSummary::new();
        summary.accumulate(TransactionType::In, dec!(10)).ok();
        summary.accumulate(TransactionType::Out, dec!(4)).ok();
        summary.accumulate(TransactionType::In, dec!(2)).ok();

        assert_eq!(summary.sum_in, dec!(12));
        assert_eq!(summary.sum_out, dec!(4));
        assert_eq!(summary.sum_total, dec!(8));
    }

    #[test]
    fn test_unknown_is_rejected_without_side_effects() {
        let mut summary = TransactionSummary::new();
        summary.accumulate(TransactionType::In, dec!(10)).ok();

        let result = summary.accumulate(TransactionType::Unknown, dec!(99));

        assert!(matches!(result, Err(LedgerError::UnknownTransactionType)));
        assert_eq!(summary.sum_total, dec!(10));
    }

    proptest! {
        #[test]
        fn prop_total_is_in_minus_out(entries in prop::collection::vec((any::<bool>(), 0u32..1_000_000), 0..50)) {
            let mut summary = TransactionSummary::new();
            let mut expected_in = Decimal::ZERO;
            let mut expected_out = Decimal::ZERO;

            for (is_in, cents) in entries {
                let amount = Decimal::new(i64::from(cents), 2);
                if is_in {
                    expected_in += amount;
                    prop_assert!(summary.accumulate(TransactionType::In, amount).is_ok());
                } else {
                    expected_out += amount;
                    prop_assert!(summary.accumulate(TransactionType::Out, amount).is_ok());
                }
            }

            prop_assert_eq!(summary.sum_in, expected_in);
            prop_assert_eq!(summary.sum_out, expected_out);
            prop_assert_eq!(summary.sum_total, expected_in - expected_out);
        }
    }
}
