//! Storage layer.
//!
//! Defines the `Repository` trait every engine component consumes, and
//! provides the default in-memory implementation with JSON snapshot
//! persistence. Alternative backends only need to implement the trait.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{
    Bet, BetId, ContextId, ContextSettings, CourseSegment, NewBet, NewRacer, NewSegment, Race,
    RaceId, RacePatch, RaceRecord, Racer, RacerId, RacerPatch, Result, SegmentId, UserId, Wallet,
};

pub use memory::MemoryStore;

/// Durable storage contract for all game entities.
///
/// Every method call is atomic with respect to every other call; the
/// multi-step financial invariants (refund-and-replace, settlement) are
/// enforced above this trait by the ledger's per-wallet locks.
#[async_trait]
pub trait Repository: Send + Sync {
    // -- Racers ---------------------------------------------------------

    async fn create_racer(&self, new: NewRacer) -> Result<Racer>;

    async fn racer(&self, id: RacerId) -> Result<Option<Racer>>;

    /// Apply a partial update. Fails with `RacerNotFound` for unknown ids.
    async fn update_racer(&self, id: RacerId, patch: RacerPatch) -> Result<Racer>;

    /// Explicit admin delete. Deleting an unknown racer is a no-op.
    async fn delete_racer(&self, id: RacerId) -> Result<()>;

    /// All racers with `retired == false`, in id order.
    async fn active_racers(&self) -> Result<Vec<Racer>>;

    // -- Races ----------------------------------------------------------

    async fn create_race(&self, context_id: ContextId) -> Result<Race>;

    async fn race(&self, id: RaceId) -> Result<Option<Race>>;

    async fn update_race(&self, id: RaceId, patch: RacePatch) -> Result<Race>;

    /// Deleting an open race is the cancellation signal. Its course
    /// segments go with it; no-op for unknown ids.
    async fn delete_race(&self, id: RaceId) -> Result<()>;

    /// All races with `finished == false`, in id order.
    async fn unfinished_races(&self) -> Result<Vec<Race>>;

    /// Number of races created for `context_id` at or after `since`.
    async fn races_created_since(
        &self,
        context_id: ContextId,
        since: DateTime<Utc>,
    ) -> Result<u64>;

    /// The `limit` most recently finished races for `context_id`, newest
    /// first, each with the winner and total payout recomputed from the
    /// bets still stored for the race (`None`/0 when no bets remain).
    async fn race_history(&self, context_id: ContextId, limit: usize) -> Result<Vec<RaceRecord>>;

    // -- Bets -----------------------------------------------------------

    async fn create_bet(&self, new: NewBet) -> Result<Bet>;

    async fn bet(&self, id: BetId) -> Result<Option<Bet>>;

    /// Deleting an unknown bet is a no-op, so settlement stays idempotent.
    async fn delete_bet(&self, id: BetId) -> Result<()>;

    async fn bets_by_race(&self, race_id: RaceId) -> Result<Vec<Bet>>;

    // -- Wallets --------------------------------------------------------

    async fn wallet(&self, user_id: UserId) -> Result<Option<Wallet>>;

    /// Create or overwrite a wallet with the given balance.
    async fn upsert_wallet(&self, user_id: UserId, balance: i64) -> Result<Wallet>;

    async fn delete_wallet(&self, user_id: UserId) -> Result<()>;

    // -- Course segments ------------------------------------------------

    async fn create_segment(&self, new: NewSegment) -> Result<CourseSegment>;

    /// Segments for a race ordered by position.
    async fn segments_by_race(&self, race_id: RaceId) -> Result<Vec<CourseSegment>>;

    async fn delete_segment(&self, id: SegmentId) -> Result<()>;

    // -- Context settings -----------------------------------------------

    async fn context_settings(&self, context_id: ContextId) -> Result<Option<ContextSettings>>;

    async fn upsert_context_settings(&self, settings: ContextSettings) -> Result<()>;

    /// Drop a context's overrides, reverting it to the file configuration.
    /// No-op for contexts without stored settings.
    async fn delete_context_settings(&self, context_id: ContextId) -> Result<()>;

    /// Contexts that have stored settings.
    async fn known_contexts(&self) -> Result<Vec<ContextId>>;
}
