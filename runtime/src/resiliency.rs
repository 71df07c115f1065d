//! Randomized delay and status-code generator.
//!
//! Used by the resiliency RPC surface to simulate a slow, flaky backend so
//! clients can exercise their retry and backoff logic.

use crate::metrics::ResiliencyMetrics;
use ledger_rpc_core::{Clock, LedgerError};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Result of one fault draw.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FaultOutcome {
    /// Seconds slept before answering
    pub delay_seconds: u64,
    /// Drawn status code; 0 means success
    pub status_code: u32,
    /// Human-readable description of the draw
    pub message: String,
}

/// Delay range after clamping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelayRange {
    /// Inclusive lower bound in seconds
    pub min: u64,
    /// Inclusive upper bound in seconds
    pub max: u64,
}

impl DelayRange {
    /// Clamps raw bounds: `min` to at least 0, and `max` to `min + 1` when
    /// it does not exceed `min`.
    #[must_use]
    pub fn clamp(min_delay: i64, max_delay: i64) -> Self {
        let min = u64::try_from(min_delay.max(0)).unwrap_or(0);
        let max = u64::try_from(max_delay.max(0)).unwrap_or(0);
        let max = if max <= min { min + 1 } else { max };
        Self { min, max }
    }
}

/// Draws delays and status codes.
pub struct FaultInjector {
    rng: Mutex<StdRng>,
    clock: Arc<dyn Clock>,
}

impl FaultInjector {
    /// An injector seeded from OS entropy.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::from_rng(StdRng::from_entropy(), clock)
    }

    /// A reproducible injector.
    #[must_use]
    pub fn seeded(seed: u64, clock: Arc<dyn Clock>) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed), clock)
    }

    fn from_rng(rng: StdRng, clock: Arc<dyn Clock>) -> Self {
        Self {
            rng: Mutex::new(rng),
            clock,
        }
    }

    /// Sleeps for a random delay in the clamped range, then picks a status code.
    ///
    /// # Errors
    ///
    /// [`LedgerError::EmptyStatusCodeSet`] when `status_codes` is empty; this
    /// is checked before sleeping.
    pub async fn generate(
        &self,
        min_delay: i64,
        max_delay: i64,
        status_codes: &[u32],
    ) -> Result<FaultOutcome, LedgerError> {
        if status_codes.is_empty() {
            return Err(LedgerError::EmptyStatusCodeSet);
        }

        let range = DelayRange::clamp(min_delay, max_delay);
        let delay_seconds = self.lock().gen_range(range.min..=range.max);

        tokio::time::sleep(Duration::from_secs(delay_seconds)).await;

        let status_code = status_codes
            .choose(&mut *self.lock())
            .copied()
            .ok_or(LedgerError::EmptyStatusCodeSet)?;

        ResiliencyMetrics::record_fault(status_code);
        let message = format!(
            "The time now is {}, Delay: {delay_seconds} seconds, Status code: {status_code}",
            self.clock.now().format("%H:%M:%S%.3f"),
        );
        tracing::debug!(delay_seconds, status_code, "Fault drawn");

        Ok(FaultOutcome {
            delay_seconds,
            status_code,
            message,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
