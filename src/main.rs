use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use chime::config::EngineConfig;
use chime::engine::Engine;
use chime::notify::NotifyHub;
use chime::{migrate, observability, scheduler};

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let data_dir = PathBuf::from(env_or("CHIME_DATA_DIR", "./data"));
    let metrics_port = std::env::var("CHIME_METRICS_PORT")
        .ok()
        .and_then(|p| p.parse().ok());
    let compact_threshold: u64 = env_or("CHIME_COMPACT_THRESHOLD", "1000").parse()?;

    observability::init(metrics_port);

    let schema_version = migrate::run(&data_dir)?;
    info!("data directory {} at schema v{schema_version}", data_dir.display());

    let config = EngineConfig::from_env();
    info!(
        "engine config: {} admins, {} reminder offsets, tick every {:?}",
        config.admin_ids.len(),
        config.offsets.len(),
        config.tick_interval
    );

    let notify = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::new(data_dir.join("chime.wal"), notify, config)?);

    tokio::spawn(scheduler::run_scheduler(engine.clone()));
    tokio::spawn(scheduler::run_compactor(engine.clone(), compact_threshold));
    info!("chime engine up");

    shutdown_signal().await;
    info!("shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
