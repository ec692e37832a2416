//! Shared types for the PADDOCK engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that the store, engine, and
//! notification modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier aliases. Entities use small monotonically increasing ids
/// assigned by the store; users and contexts carry platform-assigned ids.
pub type RacerId = i64;
pub type RaceId = i64;
pub type BetId = i64;
pub type UserId = i64;
pub type ContextId = i64;
pub type SegmentId = i64;

// ---------------------------------------------------------------------------
// Racer
// ---------------------------------------------------------------------------

/// A persistent contestant owned by a user.
///
/// Racers are never physically removed except by explicit admin delete:
/// retirement flips `retired` and spawns a successor instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Racer {
    pub id: RacerId,
    pub name: String,
    pub owner_id: UserId,
    pub retired: bool,
    pub speed: i32,
    pub cornering: i32,
    pub stamina: i32,
    pub temperament: Temperament,
    pub mood: i32,
    pub injuries: String,
}

impl fmt::Display for Racer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} ({}) spd={} crn={} sta={}{}",
            self.id,
            self.name,
            self.temperament,
            self.speed,
            self.cornering,
            self.stamina,
            if self.retired { " [retired]" } else { "" },
        )
    }
}

impl Racer {
    /// Raw stat block, unadjusted.
    pub fn stats(&self) -> Stats {
        Stats {
            speed: self.speed,
            cornering: self.cornering,
            stamina: self.stamina,
        }
    }

    /// Stat block after the temperament modifier is applied.
    pub fn adjusted_stats(&self) -> Stats {
        self.temperament.apply(self.stats())
    }
}

/// Fields for creating a racer. Admin creation and retirement succession
/// both go through this; defaults match a freshly stabled racer.
#[derive(Debug, Clone)]
pub struct NewRacer {
    pub name: String,
    pub owner_id: UserId,
    pub speed: i32,
    pub cornering: i32,
    pub stamina: i32,
    pub temperament: Temperament,
    pub mood: i32,
    pub injuries: String,
}

impl NewRacer {
    pub fn new(name: impl Into<String>, owner_id: UserId) -> Self {
        Self {
            name: name.into(),
            owner_id,
            speed: 0,
            cornering: 0,
            stamina: 0,
            temperament: Temperament::Quirky,
            mood: 3,
            injuries: String::new(),
        }
    }
}

/// Partial update for a racer. `None` fields are left untouched, so
/// storage mutations stay statically checked.
#[derive(Debug, Clone, Default)]
pub struct RacerPatch {
    pub name: Option<String>,
    pub retired: Option<bool>,
    pub speed: Option<i32>,
    pub cornering: Option<i32>,
    pub stamina: Option<i32>,
    pub temperament: Option<Temperament>,
    pub mood: Option<i32>,
    pub injuries: Option<String>,
}

impl RacerPatch {
    /// Patch that only flips the retired flag.
    pub fn retire() -> Self {
        Self {
            retired: Some(true),
            ..Default::default()
        }
    }

    /// Patch that only renames.
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Stats & temperament
// ---------------------------------------------------------------------------

/// The three performance statistics a racer carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub speed: i32,
    pub cornering: i32,
    pub stamina: i32,
}

impl Stats {
    fn get(&self, stat: StatKind) -> i32 {
        match stat {
            StatKind::Speed => self.speed,
            StatKind::Cornering => self.cornering,
            StatKind::Stamina => self.stamina,
        }
    }

    fn set(&mut self, stat: StatKind, value: i32) {
        match stat {
            StatKind::Speed => self.speed = value,
            StatKind::Cornering => self.cornering = value,
            StatKind::Stamina => self.stamina = value,
        }
    }
}

/// Which statistic a temperament touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    Speed,
    Cornering,
    Stamina,
}

/// Fraction by which a temperament boosts or hampers a statistic.
pub const TEMPERAMENT_MODIFIER: f64 = 0.1;

/// A racer's temperament category. Each one boosts one stat and hampers
/// another; `Quirky` leaves everything alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Temperament {
    Agile,
    Reckless,
    Tactical,
    Burly,
    Steady,
    Sharpshift,
    Quirky,
}

impl Temperament {
    /// All known temperaments (useful for iteration).
    pub const ALL: &'static [Temperament] = &[
        Temperament::Agile,
        Temperament::Reckless,
        Temperament::Tactical,
        Temperament::Burly,
        Temperament::Steady,
        Temperament::Sharpshift,
        Temperament::Quirky,
    ];

    /// The stat this temperament boosts, if any.
    pub fn boosts(&self) -> Option<StatKind> {
        match self {
            Temperament::Agile | Temperament::Reckless => Some(StatKind::Speed),
            Temperament::Tactical | Temperament::Sharpshift => Some(StatKind::Cornering),
            Temperament::Burly | Temperament::Steady => Some(StatKind::Stamina),
            Temperament::Quirky => None,
        }
    }

    /// The stat this temperament hampers, if any.
    pub fn hampers(&self) -> Option<StatKind> {
        match self {
            Temperament::Agile | Temperament::Sharpshift => Some(StatKind::Stamina),
            Temperament::Reckless | Temperament::Burly => Some(StatKind::Cornering),
            Temperament::Tactical | Temperament::Steady => Some(StatKind::Speed),
            Temperament::Quirky => None,
        }
    }

    /// Apply the boost/hamper modifier to a stat block.
    pub fn apply(&self, stats: Stats) -> Stats {
        let mut result = stats;
        if let Some(up) = self.boosts() {
            let adjusted = (result.get(up) as f64 * (1.0 + TEMPERAMENT_MODIFIER)).round();
            result.set(up, adjusted as i32);
        }
        if let Some(down) = self.hampers() {
            let adjusted = (result.get(down) as f64 * (1.0 - TEMPERAMENT_MODIFIER)).round();
            result.set(down, adjusted as i32);
        }
        result
    }
}

impl fmt::Display for Temperament {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Temperament::Agile => write!(f, "Agile"),
            Temperament::Reckless => write!(f, "Reckless"),
            Temperament::Tactical => write!(f, "Tactical"),
            Temperament::Burly => write!(f, "Burly"),
            Temperament::Steady => write!(f, "Steady"),
            Temperament::Sharpshift => write!(f, "Sharpshift"),
            Temperament::Quirky => write!(f, "Quirky"),
        }
    }
}

impl std::str::FromStr for Temperament {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "agile" => Ok(Temperament::Agile),
            "reckless" => Ok(Temperament::Reckless),
            "tactical" => Ok(Temperament::Tactical),
            "burly" => Ok(Temperament::Burly),
            "steady" => Ok(Temperament::Steady),
            "sharpshift" => Ok(Temperament::Sharpshift),
            "quirky" => Ok(Temperament::Quirky),
            _ => Err(anyhow::anyhow!("Unknown temperament: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Race
// ---------------------------------------------------------------------------

/// A scheduled race within one context (community).
///
/// Deleting the row while the race is open is the cancellation signal —
/// the commentary streamer polls for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Race {
    pub id: RaceId,
    pub context_id: ContextId,
    pub created_at: DateTime<Utc>,
    pub finished: bool,
}

impl fmt::Display for Race {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "race {} (context {}, {})",
            self.id,
            self.context_id,
            if self.finished { "finished" } else { "open" },
        )
    }
}

/// Partial update for a race. Settlement is the only writer.
#[derive(Debug, Clone, Default)]
pub struct RacePatch {
    pub finished: Option<bool>,
}

impl RacePatch {
    pub fn finish() -> Self {
        Self {
            finished: Some(true),
        }
    }
}

/// Lifecycle phases a race passes through during a tick.
///
/// `Settled` and `Cancelled` are terminal; cancellation is only possible
/// before the countdown starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RacePhase {
    Scheduled,
    BettingOpen,
    Countdown,
    Simulating,
    Settled,
    Cancelled,
}

impl RacePhase {
    /// Whether the lifecycle may move from `self` to `next`.
    pub fn can_transition(&self, next: RacePhase) -> bool {
        use RacePhase::*;
        matches!(
            (self, next),
            (Scheduled, BettingOpen)
                | (BettingOpen, Countdown)
                | (Countdown, Simulating)
                | (Simulating, Settled)
                | (Scheduled, Cancelled)
                | (BettingOpen, Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RacePhase::Settled | RacePhase::Cancelled)
    }
}

impl fmt::Display for RacePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RacePhase::Scheduled => write!(f, "scheduled"),
            RacePhase::BettingOpen => write!(f, "betting-open"),
            RacePhase::Countdown => write!(f, "countdown"),
            RacePhase::Simulating => write!(f, "simulating"),
            RacePhase::Settled => write!(f, "settled"),
            RacePhase::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ---------------------------------------------------------------------------
// Bet & wallet
// ---------------------------------------------------------------------------

/// A wager by a user on one racer within one race.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bet {
    pub id: BetId,
    pub race_id: RaceId,
    pub user_id: UserId,
    pub racer_id: RacerId,
    pub amount: i64,
}

impl fmt::Display for Bet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bet {} coins by user {} on racer {} (race {})",
            self.amount, self.user_id, self.racer_id, self.race_id,
        )
    }
}

/// Fields for creating a bet. Validation happens in the ledger.
#[derive(Debug, Clone)]
pub struct NewBet {
    pub race_id: RaceId,
    pub user_id: UserId,
    pub racer_id: RacerId,
    pub amount: i64,
}

/// A user's coin balance. Never negative at a commit point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: UserId,
    pub balance: i64,
}

impl fmt::Display for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wallet {}: {} coins", self.user_id, self.balance)
    }
}

// ---------------------------------------------------------------------------
// Course & settings
// ---------------------------------------------------------------------------

/// One leg of a race course. The number of segments drives the number of
/// simulated commentary events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseSegment {
    pub id: SegmentId,
    pub race_id: RaceId,
    pub position: i32,
    pub description: String,
}

/// Fields for creating a course segment.
#[derive(Debug, Clone)]
pub struct NewSegment {
    pub race_id: RaceId,
    pub position: i32,
    pub description: String,
}

/// Per-context overrides of the global game settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSettings {
    pub context_id: ContextId,
    pub race_frequency: u32,
    pub default_wallet: i64,
    pub retirement_threshold: u8,
}

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

/// Outcome of one bet after settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetOutcome {
    pub user_id: UserId,
    pub racer_id: RacerId,
    pub amount: i64,
    /// Coins credited; zero for a losing bet.
    pub payout: i64,
}

impl BetOutcome {
    pub fn won(&self) -> bool {
        self.payout > 0
    }
}

/// Result of settling one race's bets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settlement {
    pub race_id: RaceId,
    pub winner: RacerId,
    pub outcomes: Vec<BetOutcome>,
}

impl Settlement {
    /// Total coins paid out to winning bets.
    pub fn total_payout(&self) -> i64 {
        self.outcomes.iter().map(|o| o.payout).sum()
    }
}

impl fmt::Display for Settlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "race {} settled: winner {} | {} bets | {} coins paid",
            self.race_id,
            self.winner,
            self.outcomes.len(),
            self.total_payout(),
        )
    }
}

/// One entry of the finished-race history: a race plus its resolved
/// winner and total payout, recomputed from the bets still stored for it.
#[derive(Debug, Clone)]
pub struct RaceRecord {
    pub race: Race,
    pub winner: Option<RacerId>,
    pub total_payout: i64,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for PADDOCK.
#[derive(Debug, thiserror::Error)]
pub enum PaddockError {
    #[error("Race not found: {0}")]
    RaceNotFound(RaceId),

    #[error("Racer not found: {0}")]
    RacerNotFound(RacerId),

    #[error("Bet not found: {0}")]
    BetNotFound(BetId),

    #[error("Wallet not found for user: {0}")]
    WalletNotFound(UserId),

    #[error("Invalid bet amount: {0}")]
    InvalidAmount(i64),

    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: i64, available: i64 },

    #[error("Storage error: {0}")]
    Persistence(String),

    #[error("Notification delivery failed: {0}")]
    Notification(String),
}

impl PaddockError {
    /// Whether the error may abort a race's remaining lifecycle steps.
    /// Notification failures never do.
    pub fn is_fatal_for_race(&self) -> bool {
        !matches!(self, PaddockError::Notification(_))
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PaddockError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
