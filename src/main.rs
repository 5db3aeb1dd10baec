use std::sync::Arc;

use tracing::info;

use gymslot::config::Config;
use gymslot::tenant::TenantManager;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    gymslot::observability::init(config.metrics_port);

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let tenant_manager = Arc::new(
        TenantManager::new(
            config.data_dir.clone(),
            config.compact_threshold,
            config.policy,
        )
        .with_reminder_interval(config.reminder_every),
    );
    for tenant in &config.tenants {
        tenant_manager.get_or_create(tenant)?;
    }

    info!("gymslot started");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  tenants: {}", config.tenants.join(", "));
    info!(
        "  slots: {:02}:00-{:02}:00 every {} min, horizon {} days, utc offset {}",
        config.policy.grid.first_hour(),
        config.policy.grid.last_hour(),
        config.policy.grid.step_minutes(),
        config.policy.horizon_days,
        config.policy.offset
    );
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

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
    info!("shutdown signal received, compacting WALs");

    for (name, engine) in tenant_manager.engines() {
        if let Err(e) = engine.compact_wal().await {
            tracing::error!("final compaction of tenant {name} failed: {e}");
        }
    }

    info!("gymslot stopped");
    Ok(())
}
