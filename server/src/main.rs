//! Ledger RPC server.
//!
//! Serves the bank and resiliency services over HTTP and WebSocket, backed by
//! Postgres, with an optional exchange rate feed and Prometheus endpoint.

use anyhow::Context;
use axum::routing::get;
use ledger_rpc_core::{Clock, SystemClock};
use ledger_rpc_postgres::PostgresLedgerStorage;
use ledger_rpc_runtime::metrics::MetricsExporter;
use ledger_rpc_server::{Config, RateFeed};
use ledger_rpc_web::interceptor::{
    CurrencyNormalizer, InterceptorChain, LoggingInterceptor, ResponseMetadataInterceptor,
    ResponseTagInterceptor,
};
use ledger_rpc_web::rpc::cancellation;
use ledger_rpc_web::{LedgerRpcService, Metadata, RpcSettings, RpcState, router};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledger_rpc=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ledger RPC server");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        address = %config.bind_address(),
        location = %config.server.location,
        feed_enabled = config.exchange_rates.feed_enabled,
        metrics_enabled = config.metrics_enabled,
        "Configuration loaded"
    );

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(config.database.connect_timeout)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to Postgres")?;
    let storage = PostgresLedgerStorage::new(pool.clone());
    storage.migrate().await.context("Failed to run migrations")?;
    info!("Database ready");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let response_metadata: Metadata = [
        ("my-response-metadata-key-1", "my-response-metadata-value-1"),
        ("my-response-metadata-key-2", "my-response-metadata-value-2"),
    ]
    .into_iter()
    .collect();
    let mut chain = InterceptorChain::new()
        .with(LoggingInterceptor)
        .with(CurrencyNormalizer)
        .with(ResponseMetadataInterceptor::new(response_metadata));
    if !config.server.response_tag.is_empty() {
        chain = chain.with(ResponseTagInterceptor::new(config.server.response_tag.clone()));
    }
    info!(interceptors = ?chain.names().collect::<Vec<_>>(), "Interceptor chain configured");

    let settings = RpcSettings {
        server_location: config.server.location.clone(),
        exchange_rate_interval: config.exchange_rates.stream_interval,
        ..RpcSettings::default()
    };
    let service = LedgerRpcService::new(Arc::new(storage), Arc::clone(&clock))
        .with_interceptors(chain)
        .with_settings(settings);

    let (shutdown, shutdown_signal) = cancellation();

    let feed = if config.exchange_rates.feed_enabled {
        let feed = RateFeed::new(service.rates().clone(), Arc::clone(&clock), &config.exchange_rates);
        Some(tokio::spawn(feed.run(shutdown.signal())))
    } else {
        None
    };

    let mut app = router(RpcState::new(service, shutdown_signal));
    if config.metrics_enabled {
        let mut exporter = MetricsExporter::new();
        exporter.install().context("Failed to install metrics exporter")?;
        let exporter = Arc::new(exporter);
        app = app.route(
            "/metrics",
            get(move || {
                let exporter = Arc::clone(&exporter);
                async move { exporter.render().unwrap_or_default() }
            }),
        );
        info!("Metrics available at /metrics");
    }

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_signal().await;
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    if let Some(feed) = feed {
        if let Err(e) = feed.await {
            warn!(error = %e, "Exchange rate feed ended abnormally");
        }
    }

    if tokio::time::timeout(config.server.shutdown_timeout, pool.close())
        .await
        .is_err()
    {
        warn!("Database pool did not close within the shutdown timeout");
    }

    info!("Server stopped");
    Ok(())
}

/// Completes on Ctrl+C or SIGTERM.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
