//! Race lifecycle orchestrator.
//!
//! Drives every open race through its full lifecycle on each tick:
//! announce odds, hold the betting window, count down, simulate, settle,
//! apply retirements, stream commentary, post results, and message the
//! bettors. Races run sequentially; a tick never overlaps with itself.

use chrono::{DateTime, NaiveTime, Utc};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{EconomyConfig, RaceConfig};
use crate::engine::commentary::CommentaryStreamer;
use crate::engine::ledger::Ledger;
use crate::engine::odds::payout_multipliers;
use crate::engine::payout::PayoutResolver;
use crate::engine::retirement::RetirementEngine;
use crate::engine::simulator::simulate;
use crate::notify::NotificationSink;
use crate::store::Repository;
use crate::types::{
    ContextId, NewSegment, Race, RacePatch, RacePhase, Racer, RacerId, Result, Settlement,
};

/// Summary of one orchestrator tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub started_at: DateTime<Utc>,
    /// Contexts served this tick (config ∪ stored settings).
    pub contexts: usize,
    pub races_created: usize,
    pub races_run: usize,
    pub races_failed: usize,
    /// True when the tick found a previous one still in progress and
    /// returned without doing anything.
    pub skipped: bool,
}

impl TickReport {
    fn skipped() -> Self {
        Self {
            started_at: Utc::now(),
            contexts: 0,
            races_created: 0,
            races_run: 0,
            races_failed: 0,
            skipped: true,
        }
    }
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.skipped {
            return write!(f, "tick skipped (previous tick still running)");
        }
        write!(
            f,
            "tick at {}: {} contexts | {} races created | {} run | {} failed",
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            self.contexts,
            self.races_created,
            self.races_run,
            self.races_failed,
        )
    }
}

/// Frequency and retirement settings effective for one context, after
/// stored overrides are applied on top of the file configuration.
struct EffectiveSettings {
    race_frequency: u32,
    retirement_threshold: u8,
}

pub struct RaceOrchestrator {
    repo: Arc<dyn Repository>,
    sink: Arc<dyn NotificationSink>,
    payouts: PayoutResolver,
    retirement: RetirementEngine,
    streamer: CommentaryStreamer,
    race_cfg: RaceConfig,
    economy: EconomyConfig,
    tracked_contexts: Vec<ContextId>,
    /// Seeded draw source for participant sampling and retirement rolls.
    /// The simulator seeds its own generator from the race id instead.
    rng: tokio::sync::Mutex<ChaCha8Rng>,
    /// Non-reentrancy guard: `tick` takes it with `try_lock` and bails
    /// out when a previous tick still holds it.
    tick_guard: tokio::sync::Mutex<()>,
}

impl RaceOrchestrator {
    pub fn new(
        repo: Arc<dyn Repository>,
        ledger: Arc<Ledger>,
        sink: Arc<dyn NotificationSink>,
        race_cfg: RaceConfig,
        economy: EconomyConfig,
        tracked_contexts: Vec<ContextId>,
        rng_seed: u64,
    ) -> Self {
        Self {
            payouts: PayoutResolver::new(repo.clone(), ledger),
            retirement: RetirementEngine::new(repo.clone()),
            streamer: CommentaryStreamer::new(repo.clone()),
            repo,
            sink,
            race_cfg,
            economy,
            tracked_contexts,
            rng: tokio::sync::Mutex::new(ChaCha8Rng::seed_from_u64(rng_seed)),
            tick_guard: tokio::sync::Mutex::new(()),
        }
    }

    /// Run one tick: top up the daily race quota for every context, then
    /// drive each unfinished race through its lifecycle, sequentially.
    ///
    /// A tick that finds a previous one still running returns a skipped
    /// report instead of overlapping with it — two ticks observing the
    /// same unfinished races would run them twice.
    pub async fn tick(&self) -> Result<TickReport> {
        let Ok(_guard) = self.tick_guard.try_lock() else {
            warn!("Tick already in progress, skipping");
            return Ok(TickReport::skipped());
        };

        let mut report = TickReport {
            started_at: Utc::now(),
            contexts: 0,
            races_created: 0,
            races_run: 0,
            races_failed: 0,
            skipped: false,
        };

        let contexts = self.contexts().await?;
        report.contexts = contexts.len();
        for context_id in &contexts {
            report.races_created += self.ensure_daily_races(*context_id).await?;
        }

        let races = self.repo.unfinished_races().await?;
        if races.is_empty() {
            return Ok(report);
        }
        if self.repo.active_racers().await?.is_empty() {
            info!(
                open_races = races.len(),
                "No active racers; races stay open"
            );
            return Ok(report);
        }

        for race in &races {
            match self.run_race(race).await {
                Ok(()) => report.races_run += 1,
                Err(e) => {
                    report.races_failed += 1;
                    error!(
                        race_id = race.id,
                        context_id = race.context_id,
                        error = %e,
                        "Race aborted; remaining steps dropped until next tick"
                    );
                }
            }
        }

        Ok(report)
    }

    /// Contexts the orchestrator serves: the configured list merged with
    /// every context that has stored settings.
    async fn contexts(&self) -> Result<Vec<ContextId>> {
        let mut contexts: BTreeSet<ContextId> = self.tracked_contexts.iter().copied().collect();
        contexts.extend(self.repo.known_contexts().await?);
        Ok(contexts.into_iter().collect())
    }

    async fn effective_settings(&self, context_id: ContextId) -> Result<EffectiveSettings> {
        Ok(match self.repo.context_settings(context_id).await? {
            Some(s) => EffectiveSettings {
                race_frequency: s.race_frequency,
                retirement_threshold: s.retirement_threshold,
            },
            None => EffectiveSettings {
                race_frequency: self.race_cfg.frequency_per_day,
                retirement_threshold: self.economy.retirement_threshold,
            },
        })
    }

    /// Create open races until the context holds its daily quota, each
    /// seeded with the configured course segments. Returns how many were
    /// created.
    async fn ensure_daily_races(&self, context_id: ContextId) -> Result<usize> {
        let settings = self.effective_settings(context_id).await?;
        let start_of_day = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();
        let existing = self.repo.races_created_since(context_id, start_of_day).await?;
        let needed = u64::from(settings.race_frequency).saturating_sub(existing) as usize;

        for _ in 0..needed {
            let race = self.repo.create_race(context_id).await?;
            for position in 1..=self.race_cfg.course_segments {
                self.repo
                    .create_segment(NewSegment {
                        race_id: race.id,
                        position: position as i32,
                        description: format!("Leg {position}"),
                    })
                    .await?;
            }
            info!(context_id, race_id = race.id, "Race scheduled");
        }
        Ok(needed)
    }

    /// Drive one race through announce → bet window → countdown →
    /// simulate → settle → retire → commentary → results → bettor DMs.
    ///
    /// Notification failures along the way are logged and skipped; a
    /// persistence failure propagates and aborts the remaining steps.
    async fn run_race(&self, race: &Race) -> Result<()> {
        let settings = self.effective_settings(race.context_id).await?;

        // Sampling sees the racer pool as of this race, so anyone retired
        // by an earlier race in the same tick is already excluded.
        let racers = self.repo.active_racers().await?;
        let field: Vec<Racer> = {
            let mut rng = self.rng.lock().await;
            let size = self.race_cfg.field_size.min(racers.len());
            racers
                .choose_multiple(&mut *rng, size)
                .cloned()
                .collect()
        };
        if field.is_empty() {
            info!(race_id = race.id, "No racers to sample; race stays open");
            return Ok(());
        }

        self.announce_race_start(race, &field).await;
        info!(
            race_id = race.id,
            phase = %RacePhase::BettingOpen,
            window_secs = self.race_cfg.bet_window_secs,
            "Bets open"
        );
        tokio::time::sleep(self.race_cfg.bet_window()).await;

        info!(race_id = race.id, phase = %RacePhase::Countdown, "Betting closed");
        self.countdown(race.context_id).await;

        info!(
            race_id = race.id,
            phase = %RacePhase::Simulating,
            entrants = field.len(),
            "Race starting"
        );
        let participant_ids: Vec<RacerId> = field.iter().map(|r| r.id).collect();
        let segments = self.repo.segments_by_race(race.id).await?;
        let outcome = simulate(&participant_ids, segments.len(), race.id as u64);

        // From here on the race is settled exactly once: `finished` flips
        // before payouts, and settlement deletes the bets it processes.
        self.repo.update_race(race.id, RacePatch::finish()).await?;
        let settlement = self.payouts.settle(race.id).await?;

        {
            let mut rng = self.rng.lock().await;
            self.retirement
                .process(&field, settings.retirement_threshold, &mut *rng)
                .await?;
        }

        self.streamer
            .stream(
                race.id,
                race.context_id,
                &outcome.log,
                self.sink.as_ref(),
                self.race_cfg.commentary_interval(),
            )
            .await?;

        self.post_results(race.context_id, &outcome.placements).await?;
        if let Some(settlement) = settlement {
            self.dm_outcomes(&settlement).await;
        }
        info!(race_id = race.id, phase = %RacePhase::Settled, "Race complete");
        Ok(())
    }

    /// Post the field and its payout odds to the context channel.
    async fn announce_race_start(&self, race: &Race, field: &[Racer]) {
        let ids: Vec<RacerId> = field.iter().map(|r| r.id).collect();
        let odds = payout_multipliers(&ids, self.race_cfg.house_edge);
        let minutes = self.race_cfg.bet_window_secs / 60;

        let mut message = format!(
            "Race Starting Soon: Race {} begins in {} minutes. Place your bets!",
            race.id, minutes,
        );
        for racer in field {
            let multiplier = odds.get(&racer.id).copied().unwrap_or(0.0);
            message.push_str(&format!("\n{}: {multiplier:.1}x", racer.name));
        }

        if let Err(e) = self.sink.announce(race.context_id, &message).await {
            warn!(race_id = race.id, error = %e, "Race announcement failed");
        }
    }

    /// Three-step countdown spread over the configured total duration.
    /// A delivery failure abandons the remaining steps, as the channel is
    /// evidently unreachable; the race itself continues.
    async fn countdown(&self, context_id: ContextId) {
        let step = self.race_cfg.countdown_total() / 3;
        for number in ["3", "2", "1"] {
            if let Err(e) = self.sink.announce(context_id, number).await {
                warn!(context_id, error = %e, "Countdown delivery failed");
                return;
            }
            tokio::time::sleep(step).await;
        }
    }

    /// Post the finishing order with racer names. Racers deleted since
    /// the sample fall back to their id.
    async fn post_results(&self, context_id: ContextId, placements: &[RacerId]) -> Result<()> {
        let mut message = String::from("Race Results");
        for (position, racer_id) in placements.iter().enumerate() {
            let name = match self.repo.racer(*racer_id).await? {
                Some(racer) => racer.name,
                None => format!("Racer {racer_id}"),
            };
            message.push_str(&format!("\n{}. {name}", position + 1));
        }
        if let Err(e) = self.sink.announce(context_id, &message).await {
            warn!(context_id, error = %e, "Results delivery failed");
        }
        Ok(())
    }

    /// Tell every bettor how their wager went. Unreachable recipients are
    /// logged and skipped.
    async fn dm_outcomes(&self, settlement: &Settlement) {
        for outcome in &settlement.outcomes {
            let message = if outcome.won() {
                format!(
                    "You won {} coins on race {}!",
                    outcome.payout, settlement.race_id,
                )
            } else {
                format!(
                    "You lost your bet of {} coins on race {}.",
                    outcome.amount, settlement.race_id,
                )
            };
            if let Err(e) = self.sink.direct_message(outcome.user_id, &message).await {
                warn!(
                    user_id = outcome.user_id,
                    race_id = settlement.race_id,
                    error = %e,
                    "Bettor DM failed"
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
