use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use hotel_engine::config::EngineConfig;
use hotel_engine::engine::Engine;
use hotel_engine::maintenance;
use hotel_engine::notify::NotifyHub;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::from_env();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    hotel_engine::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let engine = Arc::new(Engine::new(config.wal_path(), Arc::new(NotifyHub::new()))?);
    let rooms = engine.list_rooms(true).await;
    let today = chrono::Local::now().date_naive();
    info!("hotel engine ready");
    info!("  wal: {}", config.wal_path().display());
    info!("  room types: {}", engine.list_room_types().len());
    info!(
        "  rooms: {} ({} active)",
        rooms.len(),
        rooms.iter().filter(|r| r.active).count()
    );
    info!("  season rules: {}", engine.season_rules().await.len());
    info!("  active reservations: {}", engine.active_reservations(today).await.len());
    info!("  in house: {}", engine.in_house().await.len());
    info!(
        "  compaction: every {:?} past {} appends",
        config.compact_interval, config.compact_threshold
    );
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let compactor = tokio::spawn(maintenance::run_compactor(
        engine.clone(),
        config.compact_threshold,
        config.compact_interval,
    ));

    // Graceful shutdown on SIGTERM/ctrl-c
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    info!("shutdown signal received, stopping compactor");
    compactor.abort();
    if let Err(e) = engine.compact_wal().await {
        tracing::warn!("final compaction failed: {e}");
    }
    info!("hotel engine stopped");
    Ok(())
}
