//! Bank service methods.

use crate::messages::{
    CurrentBalanceRequest, CurrentBalanceResponse, ExchangeRateRequest, ExchangeRateResponse,
    TransactionRequest, TransactionSummaryResponse, TransferRequest, TransferResponse,
    TransferStatus,
};
use crate::rpc::{Call, CancelSignal, Reply, RequestStream, ResponseSink, Status};
use crate::service::{LedgerRpcService, end_after_send_failure};
use chrono::{SecondsFormat, Timelike};
use ledger_rpc_core::{
    LedgerError, NewTransaction, TransactionSummary, TransferOrder, TransferReceipt,
};
use ledger_rpc_runtime::LedgerService;

impl LedgerRpcService {
    /// `GetCurrentBalance` (unary).
    ///
    /// # Errors
    ///
    /// The classified [`LedgerError`]; a missing account is `NOT_FOUND`.
    pub async fn get_current_balance(
        &self,
        call: &Call,
        request: CurrentBalanceRequest,
    ) -> Result<Reply<CurrentBalanceResponse>, Status> {
        self.unary(call, request, |request| async move {
            let amount = self
                .ledger
                .find_current_balance(&request.account_number)
                .await?;
            Ok(CurrentBalanceResponse {
                amount,
                current_date: self.clock.now().date_naive(),
            })
        })
        .await
    }

    /// `FetchExchangeRates` (server stream).
    ///
    /// Sends the rate valid at the current second, then waits the configured
    /// interval, until cancelled.
    ///
    /// # Errors
    ///
    /// `FAILED_PRECONDITION` as soon as no rate covers the current second.
    pub async fn fetch_exchange_rates(
        &self,
        mut requests: RequestStream<ExchangeRateRequest>,
        mut sink: ResponseSink<ExchangeRateResponse>,
        mut cancel: CancelSignal,
    ) -> Result<(), Status> {
        let request = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            request = requests.single() => request?,
        };

        loop {
            if cancel.is_cancelled() {
                tracing::info!("Client cancelled exchange rate stream");
                return Ok(());
            }

            let now = self.clock.now();
            let now = now.with_nanosecond(0).unwrap_or(now);
            let rate = self
                .rates
                .resolve(&request.from_currency, &request.to_currency, now)
                .await?;

            let update = ExchangeRateResponse {
                from_currency: request.from_currency.clone(),
                to_currency: request.to_currency.clone(),
                rate: rate.rate,
                timestamp: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            };
            if let Err(status) = sink.send(update).await {
                return end_after_send_failure(&cancel, status);
            }
            tracing::debug!(
                from = %request.from_currency,
                to = %request.to_currency,
                rate = %rate.rate,
                "Exchange rate sent"
            );

            tokio::select! {
                () = cancel.cancelled() => {},
                () = tokio::time::sleep(self.settings().exchange_rate_interval) => {},
            }
        }
    }

    /// `SummarizeTransactions` (client stream).
    ///
    /// Records every inbound transaction and replies with the totals once the
    /// client half-closes.
    ///
    /// # Errors
    ///
    /// The first failing transaction aborts the call with its classified
    /// status; transactions already recorded stay recorded.
    pub async fn summarize_transactions(
        &self,
        mut requests: RequestStream<TransactionRequest>,
        mut sink: ResponseSink<TransactionSummaryResponse>,
    ) -> Result<(), Status> {
        let mut summary = TransactionSummary::new();
        let mut account_number = String::new();

        while let Some(request) = requests.message().await? {
            let transaction = NewTransaction {
                amount: request.amount,
                transaction_type: request.transaction_type,
                timestamp: request.timestamp,
                notes: request.notes,
            };
            self.ledger
                .create_transaction(&request.account_number, transaction.clone())
                .await?;
            LedgerService::accumulate_summary(&mut summary, &transaction)?;
            account_number = request.account_number;
        }

        let now = self.clock.now();
        let summary = summary.finalize(now);
        sink.send(TransactionSummaryResponse {
            account_number,
            sum_in: summary.sum_in,
            sum_out: summary.sum_out,
            sum_total: summary.sum_total,
            date: summary.as_of.unwrap_or(now).date_naive(),
        })
        .await
    }

    /// `TransferMultiple` (bidirectional stream).
    ///
    /// One response per request, in order. A transfer whose legs rolled back
    /// is answered with `FAILED` and the session continues.
    ///
    /// # Errors
    ///
    /// Any other transfer error aborts the session with its classified status.
    pub async fn transfer_multiple(
        &self,
        mut requests: RequestStream<TransferRequest>,
        mut sink: ResponseSink<TransferResponse>,
        mut cancel: CancelSignal,
    ) -> Result<(), Status> {
        loop {
            let request = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::info!("Client cancelled transfer stream");
                    return Ok(());
                },
                message = requests.message() => match message? {
                    Some(request) => request,
                    None => return Ok(()),
                },
            };

            let order = TransferOrder {
                from_account_number: request.from_account_number.clone(),
                to_account_number: request.to_account_number.clone(),
                currency: request.currency.clone(),
                amount: request.amount,
            };
            let (status, transfer_id) = match self.transfers.transfer(&order).await {
                Ok(TransferReceipt {
                    transfer_id,
                    success,
                }) => {
                    let status = if success {
                        TransferStatus::Success
                    } else {
                        TransferStatus::Failed
                    };
                    (status, Some(transfer_id))
                },
                Err(LedgerError::TransferPairFailed {
                    transfer_id, source, ..
                }) => {
                    tracing::warn!(%transfer_id, error = %source, "Transfer rolled back");
                    (TransferStatus::Failed, Some(transfer_id))
                },
                Err(error) => return Err(error.into()),
            };

            if cancel.is_cancelled() {
                return Ok(());
            }
            let response = TransferResponse {
                from_account_number: request.from_account_number,
                to_account_number: request.to_account_number,
                currency: request.currency,
                amount: request.amount,
                timestamp: self.clock.now(),
                status,
                transfer_id,
            };
            if let Err(status) = sink.send(response).await {
                return end_after_send_failure(&cancel, status);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::interceptor::{CurrencyNormalizer, InterceptorChain};
    use crate::rpc::{Code, Metadata, Method, Outgoing, StatusDetail, cancellation};
    use chrono::Duration;
    use ledger_rpc_core::{Clock, LedgerStorage, StorageError, TransactionType};
    use ledger_rpc_testing::fixtures::{seed_account, seed_rate};
    use ledger_rpc_testing::{
        FailingStorage, FixedClock, InMemoryLedgerStorage, StorageOperation, init_test_tracing,
        test_clock,
    };
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct Harness {
        service: LedgerRpcService,
        storage: InMemoryLedgerStorage,
        clock: FixedClock,
    }

    async fn harness() -> Harness {
        init_test_tracing();
        let storage = InMemoryLedgerStorage::new();
        let clock = test_clock();
        seed_account(&storage, "A", "USD", dec!(120), clock.now()).await.unwrap();
        seed_account(&storage, "B", "USD", dec!(10), clock.now()).await.unwrap();
        let service = LedgerRpcService::new(Arc::new(storage.clone()), Arc::new(clock.clone()));
        Harness {
            service,
            storage,
            clock,
        }
    }

    fn streams<Req, Res>(
        service: &LedgerRpcService,
        method: Method,
    ) -> (
        mpsc::Sender<Result<Req, Status>>,
        RequestStream<Req>,
        ResponseSink<Res>,
        mpsc::Receiver<Outgoing<Res>>,
    )
    where
        Req: crate::messages::Inbound,
        Res: crate::messages::Outbound,
    {
        let call = Arc::new(Call::new(method));
        let (tx, requests) = RequestStream::channel(16, Arc::clone(&call), Arc::clone(service.chain()));
        let (sink, rx) = ResponseSink::channel(16, call, Arc::clone(service.chain()), Metadata::new());
        (tx, requests, sink, rx)
    }

    fn messages<T>(rx: &mut mpsc::Receiver<Outgoing<T>>) -> Vec<T> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            if let Outgoing::Message(message) = item {
                out.push(message);
            }
        }
        out
    }

    #[tokio::test]
    async fn test_balance_found_and_missing() {
        let h = harness().await;

        let reply = h
            .service
            .get_current_balance(
                &Call::new(Method::GetCurrentBalance),
                CurrentBalanceRequest {
                    account_number: "A".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(reply.message.amount, dec!(120));
        assert_eq!(reply.message.current_date, h.clock.now().date_naive());
        assert!(reply.metadata.get("grpc-response-uuid").is_some());

        let missing = h
            .service
            .get_current_balance(
                &Call::new(Method::GetCurrentBalance),
                CurrentBalanceRequest {
                    account_number: "NOPE".into(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(missing.code, Code::NotFound);
    }

    #[tokio::test]
    async fn test_balance_lookup_is_idempotent() {
        let h = harness().await;
        let call = Call::new(Method::GetCurrentBalance);
        let request = CurrentBalanceRequest {
            account_number: "B".into(),
        };

        let first = h.service.get_current_balance(&call, request.clone()).await.unwrap();
        let second = h.service.get_current_balance(&call, request).await.unwrap();

        assert_eq!(first.message, second.message);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rates_stream_until_cancelled() {
        let h = harness().await;
        let t0 = h.clock.now();
        seed_rate(&h.storage, "USD", "BRL", dec!(5.20), t0, t0 + Duration::seconds(60))
            .await
            .unwrap();
        let (tx, requests, sink, mut rx) = streams(&h.service, Method::FetchExchangeRates);
        let (handle, cancel) = cancellation();
        tx.send(Ok(ExchangeRateRequest {
            from_currency: "USD".into(),
            to_currency: "BRL".into(),
        }))
        .await
        .unwrap();

        let service = h.service.clone();
        let task =
            tokio::spawn(async move { service.fetch_exchange_rates(requests, sink, cancel).await });
        tokio::time::sleep(std::time::Duration::from_millis(6_500)).await;
        handle.cancel();

        assert!(task.await.unwrap().is_ok());
        let sent = messages(&mut rx);
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|m| m.rate == dec!(5.20)));
        assert_eq!(sent[0].timestamp, "2025-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn test_rates_stream_cancelled_before_start_sends_nothing() {
        let h = harness().await;
        let (_tx, requests, sink, mut rx) =
            streams::<ExchangeRateRequest, ExchangeRateResponse>(&h.service, Method::FetchExchangeRates);
        let (handle, cancel) = cancellation();
        handle.cancel();

        let result = h.service.fetch_exchange_rates(requests, sink, cancel).await;

        assert!(result.is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rates_stream_fails_without_rate() {
        let h = harness().await;
        let (tx, requests, sink, mut rx) = streams(&h.service, Method::FetchExchangeRates);
        let (_handle, cancel) = cancellation();
        tx.send(Ok(ExchangeRateRequest {
            from_currency: "USD".into(),
            to_currency: "JPY".into(),
        }))
        .await
        .unwrap();

        let status = h.service.fetch_exchange_rates(requests, sink, cancel).await.unwrap_err();

        assert_eq!(status.code, Code::FailedPrecondition);
        assert!(matches!(
            &status.details[0],
            StatusDetail::ErrorInfo { metadata, .. } if metadata["to_currency"] == "JPY"
        ));
        assert!(messages(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_summary_of_three_transactions() {
        let h = harness().await;
        let (tx, requests, sink, mut rx) = streams(&h.service, Method::SummarizeTransactions);
        for (transaction_type, amount) in [
            (TransactionType::In, dec!(10)),
            (TransactionType::Out, dec!(4)),
            (TransactionType::In, dec!(2)),
        ] {
            tx.send(Ok(TransactionRequest {
                account_number: "B".into(),
                transaction_type,
                amount,
                timestamp: None,
                notes: String::new(),
            }))
            .await
            .unwrap();
        }
        drop(tx);

        h.service.summarize_transactions(requests, sink).await.unwrap();

        let summary = messages(&mut rx).pop().expect("one summary");
        assert_eq!(summary.account_number, "B");
        assert_eq!(summary.sum_in, dec!(12));
        assert_eq!(summary.sum_out, dec!(4));
        assert_eq!(summary.sum_total, dec!(8));
        assert_eq!(h.storage.account("B").unwrap().current_balance, dec!(18));
    }

    #[tokio::test]
    async fn test_summary_aborts_on_bad_message() {
        let h = harness().await;
        let (tx, requests, sink, mut rx) = streams(&h.service, Method::SummarizeTransactions);
        tx.send(Ok(TransactionRequest {
            account_number: "B".into(),
            transaction_type: TransactionType::In,
            amount: dec!(1),
            timestamp: None,
            notes: String::new(),
        }))
        .await
        .unwrap();
        tx.send(Ok(TransactionRequest {
            account_number: "B".into(),
            transaction_type: TransactionType::Out,
            amount: Decimal::NEGATIVE_ONE,
            timestamp: None,
            notes: String::new(),
        }))
        .await
        .unwrap();
        drop(tx);

        let status = h.service.summarize_transactions(requests, sink).await.unwrap_err();

        assert_eq!(status.code, Code::InvalidArgument);
        assert!(messages(&mut rx).is_empty());
        assert_eq!(h.storage.account("B").unwrap().current_balance, dec!(11));
    }

    #[tokio::test]
    async fn test_transfers_pair_one_response_each() {
        let h = harness().await;
        let service = h
            .service
            .clone()
            .with_interceptors(InterceptorChain::new().with(CurrencyNormalizer));
        let (tx, requests, sink, mut rx) = streams(&service, Method::TransferMultiple);
        let (_handle, cancel) = cancellation();
        for amount in [dec!(40), dec!(5)] {
            tx.send(Ok(TransferRequest {
                from_account_number: "A".into(),
                to_account_number: "B".into(),
                currency: "usd".into(),
                amount,
            }))
            .await
            .unwrap();
        }
        drop(tx);

        service.transfer_multiple(requests, sink, cancel).await.unwrap();

        let sent = messages(&mut rx);
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|r| r.status == TransferStatus::Success));
        assert_eq!(sent[0].amount, dec!(40));
        assert_eq!(sent[0].currency, "USD");
        assert_eq!(h.storage.account("A").unwrap().current_balance, dec!(75));
        assert_eq!(h.storage.account("B").unwrap().current_balance, dec!(55));
    }

    #[tokio::test]
    async fn test_rolled_back_transfer_reports_failed_and_continues() {
        let h = harness().await;
        let failing = FailingStorage::new(h.storage.clone());
        failing.fail_times(
            StorageOperation::CreateTransferPair,
            1,
            StorageError::Database("disk full".into()),
        );
        let storage: Arc<dyn LedgerStorage> = Arc::new(failing);
        let service = LedgerRpcService::new(storage, Arc::new(h.clock.clone()));
        let (tx, requests, sink, mut rx) = streams(&service, Method::TransferMultiple);
        let (_handle, cancel) = cancellation();
        for _ in 0..2 {
            tx.send(Ok(TransferRequest {
                from_account_number: "A".into(),
                to_account_number: "B".into(),
                currency: "USD".into(),
                amount: dec!(10),
            }))
            .await
            .unwrap();
        }
        drop(tx);

        service.transfer_multiple(requests, sink, cancel).await.unwrap();

        let sent = messages(&mut rx);
        assert_eq!(sent[0].status, TransferStatus::Failed);
        assert_eq!(sent[1].status, TransferStatus::Success);
        let failed = h.storage.transfers().into_iter().find(|t| Some(t.id) == sent[0].transfer_id);
        assert!(!failed.expect("header kept").success);
        assert_eq!(h.storage.account("A").unwrap().current_balance, dec!(110));
    }

    #[tokio::test]
    async fn test_missing_destination_aborts_session() {
        let h = harness().await;
        let (tx, requests, sink, mut rx) = streams(&h.service, Method::TransferMultiple);
        let (_handle, cancel) = cancellation();
        tx.send(Ok(TransferRequest {
            from_account_number: "A".into(),
            to_account_number: "X".into(),
            currency: "USD".into(),
            amount: dec!(10),
        }))
        .await
        .unwrap();

        let status = h.service.transfer_multiple(requests, sink, cancel).await.unwrap_err();

        assert_eq!(status.code, Code::NotFound);
        assert!(messages(&mut rx).is_empty());
        assert!(h.storage.transfers().is_empty());
    }

    #[tokio::test]
    async fn test_transfer_stream_cancelled_before_start_sends_nothing() {
        let h = harness().await;
        let (tx, requests, sink, mut rx) = streams(&h.service, Method::TransferMultiple);
        let (handle, cancel) = cancellation();
        tx.send(Ok(TransferRequest {
            from_account_number: "A".into(),
            to_account_number: "B".into(),
            currency: "USD".into(),
            amount: dec!(10),
        }))
        .await
        .unwrap();
        handle.cancel();

        assert!(h.service.transfer_multiple(requests, sink, cancel).await.is_ok());
        assert!(messages(&mut rx).is_empty());
        assert_eq!(h.storage.account("A").unwrap().current_balance, dec!(120));
    }
}
