use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use staylock::api::{self, AppState};
use staylock::config::Config;
use staylock::directory::InMemoryDirectory;
use staylock::engine::Engine;
use staylock::notify::NotifyHub;
use staylock::reaper;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    staylock::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let directory = Arc::new(InMemoryDirectory::new());
    let notify = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::new(
        config.wal_path(),
        directory.clone(),
        notify,
        config.engine.clone(),
    )?);

    let sweeper = tokio::spawn(reaper::run_sweeper(engine.clone(), config.sweep_interval));
    let compactor = tokio::spawn(reaper::run_compactor(engine.clone(), config.compact_threshold));

    let app = api::router(AppState {
        engine: engine.clone(),
        directory,
    });

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("staylock listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  reservations: {}", engine.store().len());
    info!("  admission_timeout: {:?}", config.engine.admission_timeout);
    info!(
        "  pending_ttl: {}",
        config
            .engine
            .pending_ttl
            .map_or("disabled".to_string(), |ttl| format!("{ttl:?}"))
    );
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, let in-flight requests finish
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    compactor.abort();
    info!("staylock stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("failed to register SIGTERM handler: {e}");
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    info!("shutdown signal received, draining requests");
}
