//! State shared by the RPC handlers.

use crate::rpc::CancelSignal;
use crate::service::LedgerRpcService;
use std::sync::Arc;

/// The service plus the server-wide shutdown signal.
///
/// Open streams end when `shutdown` fires, the same way they end on a
/// client cancel.
#[derive(Clone)]
pub struct RpcState {
    /// Bank and resiliency methods
    pub service: Arc<LedgerRpcService>,
    /// Fires once the server starts shutting down
    pub shutdown: CancelSignal,
}

impl RpcState {
    /// Wrap `service`, ending streams when `shutdown` fires.
    #[must_use]
    pub fn new(service: LedgerRpcService, shutdown: CancelSignal) -> Self {
        Self {
            service: Arc::new(service),
            shutdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::cancellation;
    use ledger_rpc_testing::{InMemoryLedgerStorage, test_clock};

    #[test]
    fn test_clones_share_the_shutdown_signal() {
        let (handle, signal) = cancellation();
        let state = RpcState::new(
            LedgerRpcService::new(Arc::new(InMemoryLedgerStorage::new()), Arc::new(test_clock())),
            signal,
        );
        let clone = state.clone();

        handle.cancel();

        assert!(state.shutdown.is_cancelled());
        assert!(clone.shutdown.is_cancelled());
        assert!(Arc::ptr_eq(&state.service, &clone.service));
    }
}
