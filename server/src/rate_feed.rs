//! Background exchange rate generator.
//!
//! Every interval it stores a `from → to` window starting at the current
//! second and ending just before the next one, with a rate of
//! `base + U[0, 300)`. `FetchExchangeRates` therefore always finds a rate
//! while the feed runs.

use crate::config::ExchangeRateConfig;
use chrono::{DateTime, Timelike, Utc};
use ledger_rpc_core::{Clock, LedgerError, NewExchangeRate};
use ledger_rpc_runtime::ExchangeRateService;
use ledger_rpc_web::rpc::CancelSignal;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

const RATE_SPREAD: u32 = 300;

/// Periodically stores generated exchange rate windows.
pub struct RateFeed {
    rates: ExchangeRateService,
    clock: Arc<dyn Clock>,
    from: String,
    to: String,
    interval: Duration,
    base_rate: Decimal,
    rng: StdRng,
}

impl RateFeed {
    /// A feed configured from `config`.
    #[must_use]
    pub fn new(rates: ExchangeRateService, clock: Arc<dyn Clock>, config: &ExchangeRateConfig) -> Self {
        Self {
            rates,
            clock,
            from: config.feed_from.clone(),
            to: config.feed_to.clone(),
            interval: config.feed_interval.max(Duration::from_secs(1)),
            base_rate: config.feed_base_rate,
            rng: StdRng::from_entropy(),
        }
    }

    /// Replace the random source, e.g. with a seeded one.
    #[must_use]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// The next window, starting at the current second.
    fn next_window(&mut self) -> NewExchangeRate {
        let now = self.clock.now();
        let valid_from: DateTime<Utc> = now.with_nanosecond(0).unwrap_or(now);
        let length = chrono::Duration::from_std(self.interval).unwrap_or(chrono::Duration::seconds(1));
        let valid_to = valid_from + length - chrono::Duration::seconds(1);
        let offset = self.rng.gen_range(0..RATE_SPREAD);

        NewExchangeRate {
            from_currency: self.from.clone(),
            to_currency: self.to.clone(),
            rate: self.base_rate + Decimal::from(offset),
            valid_from,
            valid_to,
        }
    }

    /// Store one window.
    ///
    /// # Errors
    ///
    /// Whatever [`ExchangeRateService::create_exchange_rate`] returns.
    pub async fn tick(&mut self) -> Result<NewExchangeRate, LedgerError> {
        let window = self.next_window();
        self.rates.create_exchange_rate(window.clone()).await?;
        tracing::debug!(
            from = %window.from_currency,
            to = %window.to_currency,
            rate = %window.rate,
            "Exchange rate generated"
        );
        Ok(window)
    }

    /// Store a window every interval until `shutdown` fires. Failed inserts
    /// are logged and retried on the next tick.
    pub async fn run(mut self, mut shutdown: CancelSignal) {
        tracing::info!(from = %self.from, to = %self.to, "Exchange rate feed started");
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::warn!(error = %e, "Failed to store generated exchange rate");
                    }
                },
            }
        }
        tracing::info!("Exchange rate feed stopped");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ledger_rpc_testing::{FixedClock, InMemoryLedgerStorage, test_clock};
    use ledger_rpc_web::rpc::cancellation;
    use rust_decimal_macros::dec;

    fn config() -> ExchangeRateConfig {
        ExchangeRateConfig {
            stream_interval: Duration::from_secs(3),
            feed_enabled: true,
            feed_from: "USD".into(),
            feed_to: "BRL".into(),
            feed_interval: Duration::from_secs(5),
            feed_base_rate: dec!(2000),
        }
    }

    fn feed() -> (RateFeed, ExchangeRateService, FixedClock) {
        let clock = test_clock();
        clock.advance(chrono::Duration::milliseconds(750));
        let rates = ExchangeRateService::new(
            Arc::new(InMemoryLedgerStorage::new()),
            Arc::new(clock.clone()),
        );
        let feed = RateFeed::new(rates.clone(), Arc::new(clock.clone()), &config())
            .with_rng(StdRng::seed_from_u64(7));
        (feed, rates, clock)
    }

    #[tokio::test]
    async fn test_window_covers_interval_from_current_second() {
        let (mut feed, rates, clock) = feed();

        let window = feed.tick().await.unwrap();

        let start = clock.now().with_nanosecond(0).unwrap();
        assert_eq!(window.valid_from, start);
        assert_eq!(window.valid_to, start + chrono::Duration::seconds(4));
        assert!(window.rate >= dec!(2000) && window.rate < dec!(2300));

        let found = rates.resolve("USD", "BRL", start + chrono::Duration::seconds(4)).await.unwrap();
        assert_eq!(found.rate, window.rate);
        assert!(rates.resolve("USD", "BRL", start + chrono::Duration::seconds(5)).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stores_until_shutdown() {
        let (feed, rates, clock) = feed();
        let (shutdown, signal) = cancellation();

        let task = tokio::spawn(feed.run(signal));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rates.resolve("USD", "BRL", clock.now()).await.is_ok());

        shutdown.cancel();
        task.await.unwrap();
    }
}
