//! # Ledger RPC Testing
//!
//! Testing utilities for the ledger RPC service.
//!
//! This crate provides:
//! - [`InMemoryLedgerStorage`]: a storage port that honours the same atomicity
//!   and serialization contract as the Postgres adapter
//! - [`FailingStorage`]: wraps any storage and fails chosen operations
//! - [`FixedClock`]: deterministic, manually advanced time
//! - [`fixtures`]: seed accounts and rates
//!
//! ## Example
//!
//! ```
//! use ledger_rpc_testing::{test_clock, InMemoryLedgerStorage};
//! use ledger_rpc_core::environment::Clock;
//!
//! let storage = InMemoryLedgerStorage::new();
//! let clock = test_clock();
//! assert_eq!(clock.now(), clock.now());
//! # let _ = storage;
//! ```

use chrono::{DateTime, Utc};
use ledger_rpc_core::environment::Clock;

pub mod failing;
pub mod fixtures;
pub mod memory;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, PoisonError, RwLock};

    /// Fixed clock for deterministic tests
    ///
    /// Returns the same time until moved with [`advance`](Self::advance) or
    /// [`set`](Self::set). Clones share the same time.
    ///
    /// # Example
    ///
    /// ```
    /// use ledger_rpc_testing::mocks::FixedClock;
    /// use ledger_rpc_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// clock.advance(Duration::seconds(2));
    /// assert_eq!(clock.now() - time1, Duration::seconds(2));
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.write().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an exact time
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.write().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default())
    }
}

/// Install a `tracing` subscriber that writes to the test output.
///
/// Safe to call from several tests; only the first call installs.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use failing::{FailingStorage, StorageOperation};
pub use memory::InMemoryLedgerStorage;
pub use mocks::{FixedClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
        assert_eq!(time1.to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_clones_share_time() {
        let clock = test_clock();
        let other = clock.clone();
        clock.advance(chrono::Duration::seconds(5));
        assert_eq!(other.now(), clock.now());
    }
}
