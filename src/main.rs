use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use fleetd::engine::Engine;
use fleetd::http::{AppState, RateLimiter, router};
use fleetd::notify::NotifyHub;
use fleetd::{compactor, observability};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("FLEETD_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    observability::init(metrics_port);

    let port = std::env::var("FLEETD_PORT").unwrap_or_else(|_| "8080".into());
    let bind = std::env::var("FLEETD_BIND").unwrap_or_else(|_| "0.0.0.0".into());
    let data_dir = std::env::var("FLEETD_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let admin_token = std::env::var("FLEETD_ADMIN_TOKEN").unwrap_or_else(|_| "fleetd".into());
    let compact_threshold: u64 = std::env::var("FLEETD_COMPACT_THRESHOLD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);
    let rate_limit_disabled = std::env::var("FLEETD_RATE_LIMIT_DISABLED")
        .is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));

    // Ensure data directory exists
    std::fs::create_dir_all(&data_dir)?;

    let notify = Arc::new(NotifyHub::new());
    let wal_path = PathBuf::from(&data_dir).join("fleetd.wal");
    let engine = Arc::new(Engine::new(wal_path, notify)?);

    let compactor_engine = engine.clone();
    tokio::spawn(async move {
        compactor::run_compactor(compactor_engine, compact_threshold).await;
    });

    let state = AppState {
        engine,
        admin_token: admin_token.into(),
        rate: Arc::new(RateLimiter::new()),
        rate_limit_disabled,
    };
    let app = router(state);

    let addr = format!("{bind}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("fleetd listening on {addr}");
    info!("  data_dir: {data_dir}");
    info!("  rate_limit: {}", if rate_limit_disabled { "disabled" } else { "enabled" });
    info!(
        "  metrics: {}",
        metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight requests
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("fleetd stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
