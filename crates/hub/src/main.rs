mod clock;
mod config;
mod coordinator;
mod db;
mod error;
mod hub;
mod protocol;
mod scheduler;
mod sensors;
mod session;
mod state;
mod web;

use std::path::Path;
use std::{env, time::Duration};

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use clock::Clock;
use config::Config;
use coordinator::Coordinator;
use db::Db;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // ── Env config ──────────────────────────────────────────────────
    let db_url = env::var("DB_URL").unwrap_or_else(|_| "sqlite::memory:".to_string());
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let web_port: u16 = env::var("WEB_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    // ── Config file (tuning + seed schedules) ───────────────────────
    let cfg = if Path::new(&config_path).exists() {
        config::load(&config_path)?
    } else {
        warn!(path = %config_path, "config file not found, using defaults");
        Config::default()
    };

    // ── Database ────────────────────────────────────────────────────
    let db = Db::connect(&db_url).await?;
    db.migrate().await?;
    config::apply(&cfg, &db).await?;

    let schedules = db.count_schedules().await?;
    info!(db = %db_url, schedules, "db ready");

    // A file database may hold sessions that were open when the last
    // process died; nothing is watering now, so close them.
    let orphaned = db.running_log_count().await?;
    if orphaned > 0 {
        let closed = db.stop_orphaned_logs(time::OffsetDateTime::now_utc()).await?;
        warn!(orphaned, closed, "stopped watering logs left running by a previous run");
    }

    // ── Coordinator + background loops ──────────────────────────────
    let clock = Clock::from_minutes(cfg.scheduler.utc_offset_minutes)?;
    let coordinator = Coordinator::new(db, &cfg, clock);

    tokio::spawn(sensors::run(
        coordinator.clone(),
        Duration::from_secs(cfg.sensors.interval_sec),
    ));
    tokio::spawn(scheduler::run(coordinator.clone(), clock));

    // ── Web server ──────────────────────────────────────────────────
    let db = coordinator.db().clone();
    web::serve(coordinator, web_port).await?;

    db.close().await;
    info!("shut down");
    Ok(())
}
