//! Application lifecycle: wiring, serving, and ordered shutdown.
//!
//! ```text
//! bind ─► metrics ─► connect store ─► migrate ─► producer ─► consumer (ready) ─► serve HTTP
//!                                                                                     │
//!                             SIGINT / SIGTERM / fatal consumer error ─► shutdown token
//!                                                                                     │
//!              close store ◄─ close producer ◄─ stop consumer ◄─ HTTP drained ◄────────┘
//! ```
//!
//! A failure during startup releases whatever was opened before it, in the
//! same order.

use crate::config::Config;
use anyhow::Context;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use msgflow_core::environment::SystemClock;
use msgflow_postgres::PostgresMessageStore;
use msgflow_redpanda::{CompletionConsumer, RedpandaProducer};
use msgflow_runtime::{metrics, MessageService};
use msgflow_web::{router, AppState};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{error, info, warn};

/// The running service and its configuration.
pub struct Application {
    config: Config,
    shutdown: CancellationToken,
}

impl Application {
    /// Create an application that shuts down on SIGINT or SIGTERM.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Run until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound, a collaborator
    /// cannot be started, or the event consumer stopped on a fatal broker
    /// error.
    pub async fn run(self) -> anyhow::Result<()> {
        let Self { config, shutdown } = self;
        let timeout = config.shutdown_timeout();

        let address = config.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .with_context(|| format!("Failed to bind {address}"))?;
        info!(address = %address, "HTTP listener bound");

        // Aborted when `run` returns, on every path.
        let _signals = AbortOnDropHandle::new(tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                tokio::select! {
                    () = shutdown_signal() => {
                        info!("Shutdown signal received");
                        shutdown.cancel();
                    },
                    () = shutdown.cancelled() => {},
                }
            }
        }));

        let metrics_handle = match metrics::install_prometheus() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "Metrics endpoint disabled");
                None
            },
        };

        let store = Arc::new(
            PostgresMessageStore::connect(&config.database.url, &config.database.pool_settings())
                .await
                .context("Failed to connect to PostgreSQL")?,
        );
        if let Err(e) = store.migrate().await {
            close_store(&store).await;
            return Err(e).context("Failed to run migrations");
        }
        info!("Database ready");

        let producer = match RedpandaProducer::builder()
            .brokers(&config.kafka.brokers)
            .topic(&config.kafka.processing_topic)
            .timeout(Duration::from_millis(config.kafka.producer_timeout_ms))
            .build()
        {
            Ok(producer) => Arc::new(producer),
            Err(e) => {
                close_store(&store).await;
                return Err(e).context("Failed to create event producer");
            },
        };

        let service = Arc::new(MessageService::new(store.clone(), producer.clone()));

        let started = match CompletionConsumer::builder()
            .brokers(&config.kafka.brokers)
            .group_id(&config.kafka.consumer_group)
            .topic(&config.kafka.processed_topic)
            .auto_offset_reset(&config.kafka.auto_offset_reset)
            .clock(Arc::new(SystemClock))
            .build()
        {
            Ok(consumer) => {
                info!(
                    topic = consumer.topic(),
                    group_id = consumer.group_id(),
                    "Waiting for partition assignment"
                );
                consumer
                    .start(service.clone(), shutdown.clone())
                    .await
                    .context("Event consumer did not become ready")
            },
            Err(e) => Err(e).context("Failed to configure event consumer"),
        };
        let running = match started {
            Ok(running) => running,
            Err(e) => {
                close_producer(&producer, timeout).await;
                close_store(&store).await;
                return Err(e);
            },
        };
        info!("Event consumer ready");

        let mut app = router(AppState::new(service));
        if let Some(handle) = metrics_handle {
            app = app.merge(metrics_router(handle));
        }

        info!(address = %address, "HTTP server listening");
        let served = axum::serve(listener, app)
            .with_graceful_shutdown({
                let shutdown = shutdown.clone();
                async move { shutdown.cancelled().await }
            })
            .await;
        // Reached on server error as well as on shutdown.
        shutdown.cancel();
        info!("HTTP server stopped");

        let consumer_result = match tokio::time::timeout(timeout, running.stop()).await {
            Ok(result) => result.map_err(anyhow::Error::from),
            Err(_) => Err(anyhow::anyhow!(
                "Event consumer did not stop within {}s",
                timeout.as_secs()
            )),
        };

        close_producer(&producer, timeout).await;
        close_store(&store).await;

        served.context("HTTP server failed")?;
        consumer_result.context("Event consumer stopped with an error")?;

        info!("Shutdown complete");
        Ok(())
    }
}

/// `GET /metrics` in the Prometheus text format.
#[must_use]
pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new().route(
        "/metrics",
        get(move || std::future::ready(handle.render())),
    )
}

/// Flush pending start events. The flush blocks, so it runs off the
/// runtime threads.
async fn close_producer(producer: &Arc<RedpandaProducer>, timeout: Duration) {
    let flush = tokio::task::spawn_blocking({
        let producer = producer.clone();
        move || producer.close(timeout)
    })
    .await;
    match flush {
        Ok(Ok(())) => info!("Event producer closed"),
        Ok(Err(e)) => warn!(error = %e, "Event producer did not flush cleanly"),
        Err(e) => error!(error = %e, "Event producer close task failed"),
    }
}

async fn close_store(store: &PostgresMessageStore) {
    store.close().await;
    info!("Database pool closed");
}

/// Resolve on Ctrl+C or, on unix, SIGTERM.
///
/// A handler that cannot be installed is logged and never fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
