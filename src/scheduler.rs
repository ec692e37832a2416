//! Recurring tick scheduler.
//!
//! Wraps the orchestrator in an explicit start/stop ticker so the binary,
//! admin commands, and tests all drive the same entry point: `start`
//! spawns the loop, `stop` cancels it, and `tick_now` runs one tick
//! inline without any timer involved.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::engine::orchestrator::{RaceOrchestrator, TickReport};
use crate::types::Result;

/// Hook invoked with every completed tick's report. The binary uses it
/// to snapshot the store after each cycle.
pub type TickHook = Arc<dyn Fn(&TickReport) + Send + Sync>;

pub struct Scheduler {
    orchestrator: Arc<RaceOrchestrator>,
    interval: Duration,
    on_tick: Option<TickHook>,
    handle: Mutex<Option<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<RaceOrchestrator>, interval: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            orchestrator,
            interval,
            on_tick: None,
            handle: Mutex::new(None),
            shutdown,
        }
    }

    /// Install a hook that runs after every completed tick.
    pub fn with_on_tick(mut self, hook: impl Fn(&TickReport) + Send + Sync + 'static) -> Self {
        self.on_tick = Some(Arc::new(hook));
        self
    }

    /// Spawn the recurring tick loop. The first tick fires immediately.
    /// Calling `start` while the loop is already running is a logged
    /// no-op.
    pub fn start(&self) {
        let mut handle = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        if handle.is_some() {
            warn!("Scheduler already running");
            return;
        }

        let orchestrator = self.orchestrator.clone();
        let on_tick = self.on_tick.clone();
        let mut shutdown = self.shutdown.subscribe();
        let tick_interval = self.interval;

        *handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match orchestrator.tick().await {
                            Ok(report) => {
                                info!(%report, "Tick complete");
                                if let Some(hook) = &on_tick {
                                    hook(&report);
                                }
                            }
                            Err(e) => error!(error = %e, "Tick failed; continuing to next"),
                        }
                    }
                    _ = shutdown.changed() => {
                        info!("Scheduler stopping");
                        break;
                    }
                }
            }
        }));
        info!(interval_secs = tick_interval.as_secs(), "Scheduler started");
    }

    /// Signal the loop to stop and wait for it to wind down. Safe to call
    /// repeatedly or before `start`.
    pub async fn stop(&self) {
        let handle = {
            let mut handle = self.handle.lock().unwrap_or_else(|e| e.into_inner());
            handle.take()
        };
        let Some(handle) = handle else {
            return;
        };
        let _ = self.shutdown.send(true);
        if let Err(e) = handle.await {
            error!(error = %e, "Scheduler task ended abnormally");
        }
    }

    /// Run one tick inline, outside the timer loop. Used by admin
    /// force-start and by tests.
    pub async fn tick_now(&self) -> Result<TickReport> {
        self.orchestrator.tick().await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
