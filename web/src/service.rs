//! The RPC service: the runtime services plus everything calls share.

use crate::interceptor::InterceptorChain;
use crate::messages::{Inbound, Outbound};
use crate::rpc::{Call, Code, Metadata, Method, RESILIENCY_SERVICE, Reply, Status};
use ledger_rpc_core::{Clock, LedgerStorage};
use ledger_rpc_runtime::metrics::RpcMetrics;
use ledger_rpc_runtime::{ExchangeRateService, FaultInjector, LedgerService, TransferEngine};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Response header with the server wall-clock time (`HH:MM:SS`).
pub const SERVER_TIME_HEADER: &str = "grpc-server-time";
/// Response header naming where the server runs.
pub const SERVER_LOCATION_HEADER: &str = "grpc-server-location";
/// Response header with a fresh id per call.
pub const RESPONSE_UUID_HEADER: &str = "grpc-response-uuid";

/// Tunables of the RPC surface.
#[derive(Debug, Clone)]
pub struct RpcSettings {
    /// Value of the `grpc-server-location` header
    pub server_location: String,
    /// Wait between two `FetchExchangeRates` updates
    pub exchange_rate_interval: Duration,
    /// Per-direction message buffer of a streaming call
    pub stream_buffer: usize,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            server_location: "Uberlandia, Brazil".to_string(),
            exchange_rate_interval: Duration::from_secs(3),
            stream_buffer: 16,
        }
    }
}

/// Bank and resiliency methods over one storage backend.
#[derive(Clone)]
pub struct LedgerRpcService {
    pub(crate) ledger: LedgerService,
    pub(crate) rates: ExchangeRateService,
    pub(crate) transfers: TransferEngine,
    pub(crate) faults: Arc<FaultInjector>,
    pub(crate) clock: Arc<dyn Clock>,
    chain: Arc<InterceptorChain>,
    settings: Arc<RpcSettings>,
}

impl LedgerRpcService {
    /// A service with default settings and no interceptors.
    #[must_use]
    pub fn new(storage: Arc<dyn LedgerStorage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger: LedgerService::new(Arc::clone(&storage), Arc::clone(&clock)),
            rates: ExchangeRateService::new(Arc::clone(&storage), Arc::clone(&clock)),
            transfers: TransferEngine::new(storage, Arc::clone(&clock)),
            faults: Arc::new(FaultInjector::new(Arc::clone(&clock))),
            clock,
            chain: Arc::new(InterceptorChain::new()),
            settings: Arc::new(RpcSettings::default()),
        }
    }

    /// Replace the interceptor chain.
    #[must_use]
    pub fn with_interceptors(mut self, chain: InterceptorChain) -> Self {
        self.chain = Arc::new(chain);
        self
    }

    /// Replace the settings.
    #[must_use]
    pub fn with_settings(mut self, settings: RpcSettings) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    /// Replace the fault injector, e.g. with a seeded one.
    #[must_use]
    pub fn with_fault_injector(mut self, faults: FaultInjector) -> Self {
        self.faults = Arc::new(faults);
        self
    }

    /// Replace the transfer engine, e.g. to tune its retry policy.
    #[must_use]
    pub fn with_transfer_engine(mut self, transfers: TransferEngine) -> Self {
        self.transfers = transfers;
        self
    }

    /// The interceptor chain.
    #[must_use]
    pub fn chain(&self) -> &Arc<InterceptorChain> {
        &self.chain
    }

    /// The settings.
    #[must_use]
    pub fn settings(&self) -> &RpcSettings {
        &self.settings
    }

    /// The ledger service, for seeding and administration.
    #[must_use]
    pub const fn ledger(&self) -> &LedgerService {
        &self.ledger
    }

    /// The exchange rate service, for seeding and administration.
    #[must_use]
    pub const fn rates(&self) -> &ExchangeRateService {
        &self.rates
    }

    /// Starts a call: counts it, runs the `on_call` hooks and returns the
    /// initial response headers.
    ///
    /// `GetCurrentBalance` and the resiliency methods carry the server
    /// headers as well.
    #[must_use]
    pub fn open_call(&self, call: &Call) -> Metadata {
        RpcMetrics::record_call(call.method.name(), call.method.shape().as_str());

        let mut metadata = Metadata::new();
        if call.method == Method::GetCurrentBalance || call.method.service() == RESILIENCY_SERVICE {
            metadata.insert(
                SERVER_TIME_HEADER,
                self.clock.now().format("%H:%M:%S").to_string(),
            );
            metadata.insert(SERVER_LOCATION_HEADER, self.settings.server_location.clone());
            metadata.insert(RESPONSE_UUID_HEADER, Uuid::new_v4().to_string());
        }
        self.chain.on_call(call, &mut metadata);
        metadata
    }

    /// Ends a call: records its duration and, on failure, its code.
    pub fn finish_call(&self, call: &Call, started: Instant, outcome: Result<(), &Status>) {
        let method = call.method.name();
        RpcMetrics::record_duration(method, started.elapsed());
        match outcome {
            Ok(()) => tracing::debug!(method = %call.method, "RPC completed"),
            Err(status) => {
                RpcMetrics::record_error(method, status.code.as_str());
                if matches!(status.code, Code::Internal | Code::Unknown) {
                    tracing::warn!(method = %call.method, code = %status.code, "RPC failed");
                } else {
                    tracing::debug!(method = %call.method, code = %status.code, "RPC rejected");
                }
            },
        }
    }

    /// Runs a unary handler inside the interceptor chain.
    pub(crate) async fn unary<Req, Res, F, Fut>(
        &self,
        call: &Call,
        mut request: Req,
        handler: F,
    ) -> Result<Reply<Res>, Status>
    where
        Req: Inbound,
        Res: Outbound,
        F: FnOnce(Req) -> Fut,
        Fut: Future<Output = Result<Res, Status>>,
    {
        let started = Instant::now();
        let metadata = self.open_call(call);
        self.chain.on_request(call, request.as_request_mut());

        let result = handler(request).await.map(|mut message| {
            self.chain.on_response(call, message.as_response_mut());
            Reply { metadata, message }
        });

        self.finish_call(call, started, result.as_ref().map(|_| ()));
        result
    }
}

/// Ends a streaming session after a failed send: a send that failed because
/// the call was cancelled is a clean end, anything else is an error.
pub(crate) fn end_after_send_failure(
    cancel: &crate::rpc::CancelSignal,
    status: Status,
) -> Result<(), Status> {
    if cancel.is_cancelled() || status.code == Code::Cancelled {
        Ok(())
    } else {
        Err(status)
    }
}
