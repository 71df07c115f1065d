//! # Ledger RPC Runtime
//!
//! Services behind the ledger RPC surface.
//!
//! - [`LedgerService`]: balance lookup, transaction recording, summaries
//! - [`ExchangeRateService`]: time-windowed rate insertion and resolution
//! - [`TransferEngine`]: two-phase, two-leg fund transfers
//! - [`FaultInjector`]: randomized delay and status-code draws
//!
//! Every service talks to storage through
//! [`LedgerStorage`](ledger_rpc_core::LedgerStorage) and reads time from a
//! [`Clock`](ledger_rpc_core::Clock), so the same code runs against Postgres
//! in production and in memory in tests.
//!
//! ## Example
//!
//! ```ignore
//! let storage: Arc<dyn LedgerStorage> = Arc::new(PostgresLedgerStorage::new(pool));
//! let clock: Arc<dyn Clock> = Arc::new(SystemClock);
//!
//! let ledger = LedgerService::new(Arc::clone(&storage), Arc::clone(&clock));
//! let balance = ledger.find_current_balance("ACC-001").await?;
//! ```

pub mod exchange_rate;
pub mod ledger;
pub mod metrics;
pub mod resiliency;
pub mod retry;
pub mod transfer;

pub use exchange_rate::ExchangeRateService;
pub use ledger::LedgerService;
pub use resiliency::{DelayRange, FaultInjector, FaultOutcome};
pub use retry::RetryPolicy;
pub use transfer::TransferEngine;
