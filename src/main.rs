//! PADDOCK — Race lifecycle orchestrator and settlement engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores the store from its snapshot (or starts fresh), and runs the
//! recurring race scheduler with graceful shutdown.

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

use paddock::config;
use paddock::engine::ledger::Ledger;
use paddock::engine::orchestrator::RaceOrchestrator;
use paddock::notify::LogSink;
use paddock::scheduler::Scheduler;
use paddock::store::MemoryStore;

const BANNER: &str = r#"
 ____   _    ____  ____   ___   ____ _  __
|  _ \ / \  |  _ \|  _ \ / _ \ / ___| |/ /
| |_) / _ \ | | | | | | | | | | |   | ' /
|  __/ ___ \| |_| | |_| | |_| | |___| . \
|_| /_/   \_\____/|____/ \___/ \____|_|\_\

  Race lifecycle orchestrator & settlement engine
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = config::AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        tick_interval_secs = cfg.service.tick_interval_secs,
        contexts = cfg.service.tracked_contexts.len(),
        races_per_day = cfg.race.frequency_per_day,
        field_size = cfg.race.field_size,
        "PADDOCK starting up"
    );

    // -- Restore or create state -----------------------------------------

    let snapshot_path = cfg.service.snapshot_path.clone();
    let store = Arc::new(MemoryStore::load(&snapshot_path)?);

    // -- Initialise components -------------------------------------------

    let ledger = Arc::new(Ledger::new(store.clone()));
    let orchestrator = Arc::new(RaceOrchestrator::new(
        store.clone(),
        ledger,
        Arc::new(LogSink),
        cfg.race.clone(),
        cfg.economy.clone(),
        cfg.service.tracked_contexts.clone(),
        rand::random(),
    ));

    // Snapshot the store after every tick so a crash loses at most one
    // cycle of state.
    let scheduler = {
        let store = store.clone();
        let path = snapshot_path.clone();
        Scheduler::new(orchestrator, cfg.service.tick_interval()).with_on_tick(move |_report| {
            if let Err(e) = store.save(&path) {
                error!(error = %e, "Failed to save snapshot");
            }
        })
    };

    // -- Main loop -------------------------------------------------------

    info!(
        interval_secs = cfg.service.tick_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );
    scheduler.start();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");
    scheduler.stop().await;

    // Save final state
    store.save(&snapshot_path)?;
    info!(snapshot = %snapshot_path, "PADDOCK shut down cleanly.");

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("paddock=info"));

    let json_logging = std::env::var("PADDOCK_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
