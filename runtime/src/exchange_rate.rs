//! Time-windowed exchange rates.

use crate::ledger::validate_currency;
use ledger_rpc_core::{
    Clock, DateTime, ExchangeRate, ExchangeRateId, LedgerError, LedgerStorage, NewExchangeRate,
    Utc,
};
use std::sync::Arc;

/// Inserts and resolves exchange rate windows.
///
/// Overlapping windows are allowed; resolution picks the most recently
/// created one.
#[derive(Clone)]
pub struct ExchangeRateService {
    storage: Arc<dyn LedgerStorage>,
    clock: Arc<dyn Clock>,
}

impl ExchangeRateService {
    /// Create a service over `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn LedgerStorage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Stores a new window.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidCurrency`] for a blank currency
    /// - [`LedgerError::InvalidAmount`] for a rate that is not positive
    /// - [`LedgerError::InvalidWindow`] when `valid_from > valid_to`
    /// - [`LedgerError::Storage`] when the insert fails
    pub async fn create_exchange_rate(
        &self,
        rate: NewExchangeRate,
    ) -> Result<ExchangeRateId, LedgerError> {
        validate_currency(&rate.from_currency)?;
        validate_currency(&rate.to_currency)?;
        if rate.rate <= rust_decimal::Decimal::ZERO {
            return Err(LedgerError::InvalidAmount { amount: rate.rate });
        }
        if rate.valid_from > rate.valid_to {
            return Err(LedgerError::InvalidWindow {
                valid_from: rate.valid_from,
                valid_to: rate.valid_to,
            });
        }

        let stored = ExchangeRate {
            id: ExchangeRateId::new(),
            from_currency: rate.from_currency,
            to_currency: rate.to_currency,
            rate: rate.rate,
            valid_from: rate.valid_from,
            valid_to: rate.valid_to,
            created_at: self.clock.now(),
        };
        let id = self.storage.create_exchange_rate(stored).await?;
        tracing::debug!(exchange_rate_id = %id, "Exchange rate stored");
        Ok(id)
    }

    /// Finds the rate for `from → to` valid at `at`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::RateNotFound`] when no window covers `at`
    /// - [`LedgerError::Storage`] when the lookup fails
    pub async fn resolve(
        &self,
        from: &str,
        to: &str,
        at: DateTime<Utc>,
    ) -> Result<ExchangeRate, LedgerError> {
        self.storage
            .resolve_exchange_rate(from, to, at)
            .await?
            .ok_or_else(|| LedgerError::RateNotFound {
                from: from.to_string(),
                to: to.to_string(),
                at,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ledger_rpc_testing::{FixedClock, InMemoryLedgerStorage, test_clock};
    use rust_decimal_macros::dec;

    fn service() -> (ExchangeRateService, FixedClock) {
        let clock = test_clock();
        let service = ExchangeRateService::new(
            Arc::new(InMemoryLedgerStorage::new()),
            Arc::new(clock.clone()),
        );
        (service, clock)
    }

    fn window(rate: rust_decimal::Decimal, from: DateTime<Utc>, to: DateTime<Utc>) -> NewExchangeRate {
        NewExchangeRate {
            from_currency: "USD".to_string(),
            to_currency: "BRL".to_string(),
            rate,
            valid_from: from,
            valid_to: to,
        }
    }

    #[tokio::test]
    async fn test_resolve_inside_and_outside_window() {
        let (service, clock) = service();
        let t0 = clock.now();
        service
            .create_exchange_rate(window(dec!(5.20), t0, t0 + Duration::seconds(5)))
            .await
            .unwrap();

        let inside = service.resolve("USD", "BRL", t0 + Duration::seconds(2)).await.unwrap();
        assert_eq!(inside.rate, dec!(5.20));

        let outside = service.resolve("USD", "BRL", t0 + Duration::seconds(10)).await;
        assert!(matches!(outside, Err(LedgerError::RateNotFound { .. })));
    }

    #[tokio::test]
    async fn test_latest_overlapping_window_wins() {
        let (service, clock) = service();
        let t0 = clock.now();
        service
            .create_exchange_rate(window(dec!(5.00), t0, t0 + Duration::seconds(60)))
            .await
            .unwrap();
        clock.advance(Duration::seconds(1));
        service
            .create_exchange_rate(window(dec!(5.10), t0, t0 + Duration::seconds(60)))
            .await
            .unwrap();

        let resolved = service.resolve("USD", "BRL", t0 + Duration::seconds(30)).await.unwrap();

        assert_eq!(resolved.rate, dec!(5.10));
    }

    #[tokio::test]
    async fn test_invalid_windows_are_rejected() {
        let (service, clock) = service();
        let t0 = clock.now();

        let inverted = service
            .create_exchange_rate(window(dec!(5), t0, t0 - Duration::milliseconds(1)))
            .await;
        assert!(matches!(inverted, Err(LedgerError::InvalidWindow { .. })));

        let zero = service
            .create_exchange_rate(window(dec!(0), t0, t0 + Duration::seconds(1)))
            .await;
        assert!(matches!(zero, Err(LedgerError::InvalidAmount { .. })));
    }

    #[tokio::test]
    async fn test_direction_matters() {
        let (service, clock) = service();
        let t0 = clock.now();
        service
            .create_exchange_rate(window(dec!(5.20), t0, t0 + Duration::seconds(5)))
            .await
            .unwrap();

        let reversed = service.resolve("BRL", "USD", t0).await;

        assert!(matches!(reversed, Err(LedgerError::RateNotFound { .. })));
    }
}
