//! Notification sink contract.
//!
//! The chat layer (embeds, buttons, channels) lives outside this crate;
//! the engine only needs a way to post to a context channel and to reach
//! a single user. Both operations may fail and callers treat failures as
//! non-fatal.

use async_trait::async_trait;
use tracing::info;

use crate::types::{ContextId, Result, UserId};

/// Outbound messaging abstraction consumed by the orchestrator and the
/// commentary streamer.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Post a message to a context's shared channel.
    async fn announce(&self, context_id: ContextId, message: &str) -> Result<()>;

    /// Send a private message to one user.
    async fn direct_message(&self, user_id: UserId, message: &str) -> Result<()>;
}

/// Sink that writes every message to the log. Used by the binary when no
/// chat integration is wired up, and handy for local runs.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn announce(&self, context_id: ContextId, message: &str) -> Result<()> {
        info!(context_id, message, "announce");
        Ok(())
    }

    async fn direct_message(&self, user_id: UserId, message: &str) -> Result<()> {
        info!(user_id, message, "direct message");
        Ok(())
    }
}
