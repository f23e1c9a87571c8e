use std::sync::Arc;

use route_emitter::config::RouteEmitterConfig;
use route_emitter::metrics;
use route_emitter::nats::CoreNatsClient;
use route_emitter::nats::NatsEmitter;
use route_emitter::routing_table::RoutingTable;
use route_emitter::scheduler::HttpSchedulerClient;
use route_emitter::syncer::sync_event_bus;
use route_emitter::syncer::Syncer;
use route_emitter::utils::spawn_task;
use route_emitter::watcher::Watcher;
use route_emitter::Error;
use route_emitter::Result;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let settings = RouteEmitterConfig::load()?;

    // Initializing Logs
    init_observability();

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());

    // Wire up the core
    let nats_client = Arc::new(CoreNatsClient::connect(&settings.nats).await?);
    let scheduler = Arc::new(HttpSchedulerClient::new(&settings.scheduler)?);
    let table = Arc::new(RoutingTable::new());
    let emitter = Arc::new(NatsEmitter::new(nats_client.clone()));

    let (sync_events, sync_signals) = sync_event_bus();
    let syncer = Syncer::new(
        scheduler.clone(),
        table.clone(),
        emitter.clone(),
        nats_client,
        &settings.sync,
        sync_events,
        graceful_rx.clone(),
    );
    let watcher = Watcher::new(scheduler, table, emitter, sync_signals, graceful_rx.clone());

    if settings.monitoring.prometheus_enabled {
        tokio::spawn(metrics::start_server(settings.monitoring.prometheus_port, graceful_rx.clone()));
    }

    let handles = vec![spawn_task("syncer", syncer.run()), spawn_task("watcher", watcher.run())];

    info!("Route emitter started. Waiting for shutdown signal...");
    graceful_shutdown(graceful_tx).await?;

    for handle in handles {
        let _ = handle.await;
    }

    info!("Exiting program.");
    Ok(())
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt()).map_err(|e| Error::Fatal(format!("signal handler: {e}")))?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(|e| Error::Fatal(format!("signal handler: {e}")))?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
    }

    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        Error::Fatal(format!("Failed to send shutdown signal: {}", e))
    })?;

    info!("Shutdown completed");
    Ok(())
}

fn init_observability() {
    let base_subscriber = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();
}
