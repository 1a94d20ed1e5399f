//! Event Consumer - Main Entry Point
//! Bridges broker queues to HTTP endpoints: one consumer loop per configured queue

mod logging;
mod settings;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use event_consumer_core::application::{
    check_connectivity, RunExit, SharedConnector, WorkerSupervisor,
};
use event_consumer_core::port::BrokerConnector;
use event_consumer_infra_amqp::AmqpConnector;
use event_consumer_infra_http::HttpForwarder;
use settings::DaemonConfig;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    let _log_guard = logging::init_logging().context("Failed to initialize logging")?;

    info!("Event Consumer v{} starting...", VERSION);

    // 2. Load configuration (fatal if missing or malformed)
    let config = DaemonConfig::from_env().context("Configuration could not be loaded")?;
    info!(
        queues = config.consumer.queues.len(),
        broker = %config.broker.address(),
        http_timeout_secs = config.http_timeout.as_secs(),
        max_in_flight = config.max_in_flight,
        "Configuration loaded"
    );

    // 3. Setup dependencies (DI wiring)
    let forwarder = Arc::new(
        HttpForwarder::new(config.http_timeout).context("Failed to build HTTP client")?,
    );
    let amqp: Arc<dyn BrokerConnector> = Arc::new(AmqpConnector::new());

    // 4. Optional connectivity probe (never stops startup)
    if config.probe_on_startup {
        check_connectivity(amqp.as_ref(), &config.broker).await;
    }

    // 5. Start one consumer loop per queue over a shared connection
    let connector = Arc::new(SharedConnector::new(amqp));
    let mut supervisor = WorkerSupervisor::start_with_limit(
        &config.consumer,
        Arc::new(config.broker.clone()),
        connector.clone(),
        forwarder,
        config.max_in_flight,
    );

    info!("System ready. Consuming {} queue(s)", supervisor.active_queues().len());
    info!("Press Ctrl+C to shutdown");

    // 6. Wait for shutdown signal
    if supervisor.run_until(shutdown_signal()).await == RunExit::AllLoopsExited {
        // Loops do not reconnect; stay up so the failure is visible, not a crash loop
        warn!("No consumer loop is running. Waiting for shutdown signal");
        shutdown_signal().await;
    }

    // 7. Graceful shutdown
    info!("Shutdown signal received. Exiting gracefully...");
    let reports = supervisor.shutdown().await;
    for report in &reports {
        info!(
            queue = %report.queue_name,
            outcome = ?report.outcome,
            received = report.stats.received,
            forwarded = report.stats.forwarded,
            rejected = report.stats.rejected,
            failed = report.stats.failed,
            "Consumer loop summary"
        );
    }

    if let Err(e) = connector.close().await {
        warn!(error = %e, "Failed to close broker connection");
    }

    info!("Shutdown complete.");

    Ok(())
}

/// Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
