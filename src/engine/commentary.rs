//! Commentary streamer.
//!
//! Replays a race's event log to the notification sink, one entry per
//! tick. Cancellation is polled: before each emission the race's
//! existence is re-checked, so deleting the race stops the stream within
//! one interval. Sink failures stop the stream too — they are logged,
//! never propagated.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::notify::NotificationSink;
use crate::store::Repository;
use crate::types::{ContextId, RaceId, Result};

/// Why a stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStop {
    /// Every log entry was delivered.
    Completed,
    /// The race row disappeared mid-stream (admin cancellation).
    Cancelled,
    /// The sink rejected a delivery.
    DeliveryFailed,
}

/// Summary of one streaming run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamReport {
    pub emitted: usize,
    pub stop: StreamStop,
}

pub struct CommentaryStreamer {
    repo: Arc<dyn Repository>,
}

impl CommentaryStreamer {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Emit `log` entries in order, waiting `tick` between emissions.
    ///
    /// The first entry goes out immediately; total wall clock is bounded
    /// by `log.len() * tick`. The interval timer is dropped on every exit
    /// path.
    pub async fn stream(
        &self,
        race_id: RaceId,
        context_id: ContextId,
        log: &[String],
        sink: &dyn NotificationSink,
        tick: Duration,
    ) -> Result<StreamReport> {
        // A zero tick (tests, replays) must not panic the interval timer.
        let mut interval = (!tick.is_zero()).then(|| tokio::time::interval(tick));
        let mut emitted = 0;

        for entry in log {
            if let Some(interval) = interval.as_mut() {
                interval.tick().await;
            }

            if self.repo.race(race_id).await?.is_none() {
                info!(race_id, emitted, "Race deleted, commentary stopped");
                return Ok(StreamReport {
                    emitted,
                    stop: StreamStop::Cancelled,
                });
            }

            if let Err(e) = sink.announce(context_id, entry).await {
                warn!(race_id, emitted, error = %e, "Commentary delivery failed");
                return Ok(StreamReport {
                    emitted,
                    stop: StreamStop::DeliveryFailed,
                });
            }
            emitted += 1;
        }

        debug!(race_id, emitted, "Commentary complete");
        Ok(StreamReport {
            emitted,
            stop: StreamStop::Completed,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
