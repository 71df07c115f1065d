//! Resiliency service methods: fault draws over every call shape.

use crate::messages::{ResiliencyRequest, ResiliencyResponse};
use crate::rpc::{Call, CancelSignal, Code, Reply, RequestStream, ResponseSink, Status};
use crate::service::{LedgerRpcService, end_after_send_failure};
use ledger_rpc_core::LedgerError;
use ledger_rpc_runtime::FaultOutcome;

/// A drawn non-zero code as the call's status.
fn fault_status(outcome: FaultOutcome) -> Result<ResiliencyResponse, Status> {
    if outcome.status_code == 0 {
        return Ok(ResiliencyResponse {
            message: outcome.message,
        });
    }
    let code = Code::from_u32(outcome.status_code).unwrap_or(Code::Unknown);
    Err(Status::new(code, outcome.message))
}

impl LedgerRpcService {
    async fn draw(&self, request: &ResiliencyRequest) -> Result<ResiliencyResponse, Status> {
        if request.status_codes.is_empty() {
            return Err(LedgerError::EmptyStatusCodeSet.into());
        }
        let outcome = self
            .faults
            .generate(
                request.min_delay_second,
                request.max_delay_second,
                &request.status_codes,
            )
            .await?;
        fault_status(outcome)
    }

    /// Like [`draw`](Self::draw), but gives up quietly on cancellation.
    async fn draw_unless_cancelled(
        &self,
        request: &ResiliencyRequest,
        cancel: &mut CancelSignal,
    ) -> Option<Result<ResiliencyResponse, Status>> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            drawn = self.draw(request) => Some(drawn),
        }
    }

    /// `UnaryResiliency` (unary): one draw.
    ///
    /// # Errors
    ///
    /// The drawn status when it is not 0; `INVALID_ARGUMENT` for an empty code set.
    pub async fn unary_resiliency(
        &self,
        call: &Call,
        request: ResiliencyRequest,
    ) -> Result<Reply<ResiliencyResponse>, Status> {
        self.unary(call, request, |request| async move { self.draw(&request).await })
            .await
    }

    /// `ServerStreamResiliency` (server stream): headers first, then one
    /// message per draw until a non-zero code or cancellation.
    ///
    /// # Errors
    ///
    /// The first non-zero drawn status.
    pub async fn server_stream_resiliency(
        &self,
        mut requests: RequestStream<ResiliencyRequest>,
        mut sink: ResponseSink<ResiliencyResponse>,
        mut cancel: CancelSignal,
    ) -> Result<(), Status> {
        let request = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            request = requests.single() => request?,
        };
        if let Err(status) = sink.send_headers().await {
            return end_after_send_failure(&cancel, status);
        }

        loop {
            if cancel.is_cancelled() {
                tracing::info!("Client cancelled resiliency stream");
                return Ok(());
            }
            let Some(drawn) = self.draw_unless_cancelled(&request, &mut cancel).await else {
                return Ok(());
            };
            let response = drawn?;
            let sent = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                sent = sink.send(response) => sent,
            };
            if let Err(status) = sent {
                return end_after_send_failure(&cancel, status);
            }
        }
    }

    /// `ClientStreamResiliency` (client stream): one draw per inbound
    /// message, then a single reply counting them. Headers go out with the
    /// reply.
    ///
    /// # Errors
    ///
    /// The first non-zero drawn status.
    pub async fn client_stream_resiliency(
        &self,
        mut requests: RequestStream<ResiliencyRequest>,
        mut sink: ResponseSink<ResiliencyResponse>,
    ) -> Result<(), Status> {
        let mut received = 0_usize;
        while let Some(request) = requests.message().await? {
            self.draw(&request).await?;
            received += 1;
        }
        sink.send(ResiliencyResponse {
            message: format!("Received {received} requests"),
        })
        .await
    }

    /// `BidirectionalStreamResiliency` (bidirectional stream): headers
    /// first, then one draw and reply per inbound message.
    ///
    /// # Errors
    ///
    /// The first non-zero drawn status.
    pub async fn bidirectional_stream_resiliency(
        &self,
        mut requests: RequestStream<ResiliencyRequest>,
        mut sink: ResponseSink<ResiliencyResponse>,
        mut cancel: CancelSignal,
    ) -> Result<(), Status> {
        if let Err(status) = sink.send_headers().await {
            return end_after_send_failure(&cancel, status);
        }

        loop {
            let request = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::info!("Client cancelled resiliency stream");
                    return Ok(());
                },
                message = requests.message() => match message? {
                    Some(request) => request,
                    None => return Ok(()),
                },
            };
            let Some(drawn) = self.draw_unless_cancelled(&request, &mut cancel).await else {
                return Ok(());
            };
            if let Err(status) = sink.send(drawn?).await {
                return end_after_send_failure(&cancel, status);
            }
        }
    }
}
