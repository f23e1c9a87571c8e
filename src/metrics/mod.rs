
use lazy_static::lazy_static;
use prometheus::Gauge;
use prometheus::IntCounter;
use prometheus::IntGauge;
use prometheus::Registry;
use tokio::sync::watch;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

lazy_static! {
    /// Number of (hostname, endpoint) bindings currently in the table.
    pub static ref ROUTES_TOTAL: IntGauge =
        IntGauge::new("RoutesTotal", "Number of hostname to endpoint bindings in the routing table")
            .expect("metric can not be created");
    /// Registrations announced by sync and heartbeat emits.
    pub static ref ROUTES_SYNCED: IntCounter =
        IntCounter::new("RoutesSynced", "Registrations announced by sync and heartbeat emits")
            .expect("metric can not be created");
    /// Registrations announced in response to scheduler events.
    pub static ref ROUTES_REGISTERED: IntCounter =
        IntCounter::new("RoutesRegistered", "Registrations announced in response to scheduler events")
            .expect("metric can not be created");
    /// Unregistrations announced in response to scheduler events.
    pub static ref ROUTES_UNREGISTERED: IntCounter =
        IntCounter::new("RoutesUnRegistered", "Unregistrations announced in response to scheduler events")
            .expect("metric can not be created");
    /// Wall time of the last full sync, in seconds.
    pub static ref ROUTE_EMITTER_SYNC_DURATION: Gauge =
        Gauge::new("RouteEmitterSyncDuration", "Wall time of the last full sync in seconds")
            .expect("metric can not be created");
    pub static ref CUSTOM_REGISTRY: Registry =
        Registry::new_custom(Some("route_emitter".to_string()), None).expect("registry can not be created");
}

pub(crate) fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(ROUTES_TOTAL.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(ROUTES_SYNCED.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(ROUTES_REGISTERED.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(ROUTES_UNREGISTERED.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(ROUTE_EMITTER_SYNC_DURATION.clone()))
        .expect("collector can be registered");
}

/// Serves the registry on `/metrics` until the shutdown signal fires.
pub async fn start_server(
    port: u16,
    mut shutdown_signal: watch::Receiver<()>,
) {
    register_custom_metrics(&CUSTOM_REGISTRY);

    let registry = CUSTOM_REGISTRY.clone();
    let metrics_route = warp::path!("metrics")
        .map(move || registry.clone())
        .and_then(metrics_handler);

    let (_, server) = warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
        let _ = shutdown_signal.changed().await;
    });
    server.await;
}

async fn metrics_handler(registry: Registry) -> Result<impl Reply, Rejection> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&registry.gather(), &mut buffer) {
        eprintln!("could not encode custom metrics: {}", err);
    };
    let body = match String::from_utf8(buffer) {
        Ok(body) => body,
        Err(err) => {
            eprintln!("custom metrics could not be from_utf8'd: {}", err);
            String::default()
        }
    };

    Ok(body)
}
