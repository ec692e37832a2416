//! In-memory repository with JSON snapshot persistence.
//!
//! The whole store lives behind one mutex, so every `Repository` call is
//! atomic with respect to every other. Snapshots serialize the full state
//! to a pretty-printed JSON file; loading an absent file yields a fresh
//! store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use super::Repository;
use crate::types::{
    Bet, BetId, ContextId, ContextSettings, CourseSegment, NewBet, NewRacer, NewSegment,
    PaddockError, Race, RaceId, RacePatch, RaceRecord, Racer, RacerId, RacerPatch, Result,
    SegmentId, UserId, Wallet,
};

/// Full store state. `BTreeMap` keeps iteration in id order, which the
/// minimum-racer-id winner rule and the history query rely on.
#[derive(Debug, Default, Serialize, Deserialize)]
struct State {
    racers: BTreeMap<RacerId, Racer>,
    races: BTreeMap<RaceId, Race>,
    bets: BTreeMap<BetId, Bet>,
    wallets: BTreeMap<UserId, Wallet>,
    segments: BTreeMap<SegmentId, CourseSegment>,
    settings: BTreeMap<ContextId, ContextSettings>,
    next_racer_id: RacerId,
    next_race_id: RaceId,
    next_bet_id: BetId,
    next_segment_id: SegmentId,
}

impl State {
    fn next_id(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }
}

/// Default in-memory `Repository` implementation.
pub struct MemoryStore {
    inner: Mutex<State>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(State::default()),
        }
    }

    /// Load a store from a JSON snapshot. An absent file yields a fresh
    /// store, matching a first run.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No snapshot found, starting fresh");
            return Ok(Self::new());
        }

        let json = std::fs::read_to_string(path)
            .map_err(|e| PaddockError::Persistence(format!("read {}: {e}", path.display())))?;
        let state: State = serde_json::from_str(&json)
            .map_err(|e| PaddockError::Persistence(format!("parse {}: {e}", path.display())))?;

        info!(
            path = %path.display(),
            racers = state.racers.len(),
            races = state.races.len(),
            wallets = state.wallets.len(),
            "Snapshot loaded"
        );
        Ok(Self {
            inner: Mutex::new(state),
        })
    }

    /// Serialize the full store state to a JSON snapshot file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let json = {
            let state = self.lock();
            serde_json::to_string_pretty(&*state)
                .map_err(|e| PaddockError::Persistence(format!("serialise snapshot: {e}")))?
        };
        std::fs::write(&path, &json)
            .map_err(|e| PaddockError::Persistence(format!("write {}: {e}", path.display())))?;
        debug!(path = %path.display(), "Snapshot saved");
        Ok(())
    }

    /// Delete a snapshot file (for testing or reset).
    pub fn delete_snapshot(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if path.exists() {
            std::fs::remove_file(path)
                .map_err(|e| PaddockError::Persistence(format!("delete {}: {e}", path.display())))?;
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned mutex means a panic mid-mutation; propagating the
        // poison here would wedge every later call, so take the data.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Repository for MemoryStore {
    // -- Racers ---------------------------------------------------------

    async fn create_racer(&self, new: NewRacer) -> Result<Racer> {
        let mut state = self.lock();
        let id = State::next_id(&mut state.next_racer_id);
        let racer = Racer {
            id,
            name: new.name,
            owner_id: new.owner_id,
            retired: false,
            speed: new.speed,
            cornering: new.cornering,
            stamina: new.stamina,
            temperament: new.temperament,
            mood: new.mood,
            injuries: new.injuries,
        };
        state.racers.insert(id, racer.clone());
        Ok(racer)
    }

    async fn racer(&self, id: RacerId) -> Result<Option<Racer>> {
        Ok(self.lock().racers.get(&id).cloned())
    }

    async fn update_racer(&self, id: RacerId, patch: RacerPatch) -> Result<Racer> {
        let mut state = self.lock();
        let racer = state
            .racers
            .get_mut(&id)
            .ok_or(PaddockError::RacerNotFound(id))?;
        if let Some(name) = patch.name {
            racer.name = name;
        }
        if let Some(retired) = patch.retired {
            racer.retired = retired;
        }
        if let Some(speed) = patch.speed {
            racer.speed = speed;
        }
        if let Some(cornering) = patch.cornering {
            racer.cornering = cornering;
        }
        if let Some(stamina) = patch.stamina {
            racer.stamina = stamina;
        }
        if let Some(temperament) = patch.temperament {
            racer.temperament = temperament;
        }
        if let Some(mood) = patch.mood {
            racer.mood = mood;
        }
        if let Some(injuries) = patch.injuries {
            racer.injuries = injuries;
        }
        Ok(racer.clone())
    }

    async fn delete_racer(&self, id: RacerId) -> Result<()> {
        self.lock().racers.remove(&id);
        Ok(())
    }

    async fn active_racers(&self) -> Result<Vec<Racer>> {
        Ok(self
            .lock()
            .racers
            .values()
            .filter(|r| !r.retired)
            .cloned()
            .collect())
    }

    // -- Races ----------------------------------------------------------

    async fn create_race(&self, context_id: ContextId) -> Result<Race> {
        let mut state = self.lock();
        let id = State::next_id(&mut state.next_race_id);
        let race = Race {
            id,
            context_id,
            created_at: Utc::now(),
            finished: false,
        };
        state.races.insert(id, race.clone());
        Ok(race)
    }

    async fn race(&self, id: RaceId) -> Result<Option<Race>> {
        Ok(self.lock().races.get(&id).cloned())
    }

    async fn update_race(&self, id: RaceId, patch: RacePatch) -> Result<Race> {
        let mut state = self.lock();
        let race = state
            .races
            .get_mut(&id)
            .ok_or(PaddockError::RaceNotFound(id))?;
        if let Some(finished) = patch.finished {
            race.finished = finished;
        }
        Ok(race.clone())
    }

    async fn delete_race(&self, id: RaceId) -> Result<()> {
        let mut state = self.lock();
        state.races.remove(&id);
        state.segments.retain(|_, s| s.race_id != id);
        Ok(())
    }

    async fn unfinished_races(&self) -> Result<Vec<Race>> {
        Ok(self
            .lock()
            .races
            .values()
            .filter(|r| !r.finished)
            .cloned()
            .collect())
    }

    async fn races_created_since(
        &self,
        context_id: ContextId,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        Ok(self
            .lock()
            .races
            .values()
            .filter(|r| r.context_id == context_id && r.created_at >= since)
            .count() as u64)
    }

    async fn race_history(&self, context_id: ContextId, limit: usize) -> Result<Vec<RaceRecord>> {
        let state = self.lock();
        let mut history = Vec::new();
        for race in state
            .races
            .values()
            .rev()
            .filter(|r| r.context_id == context_id && r.finished)
            .take(limit)
        {
            let bets: Vec<&Bet> = state
                .bets
                .values()
                .filter(|b| b.race_id == race.id)
                .collect();
            let (winner, total_payout) = match bets.iter().map(|b| b.racer_id).min() {
                Some(winner) => (
                    Some(winner),
                    bets.iter()
                        .filter(|b| b.racer_id == winner)
                        .map(|b| b.amount * 2)
                        .sum(),
                ),
                None => (None, 0),
            };
            history.push(RaceRecord {
                race: race.clone(),
                winner,
                total_payout,
            });
        }
        Ok(history)
    }

    // -- Bets -----------------------------------------------------------

    async fn create_bet(&self, new: NewBet) -> Result<Bet> {
        let mut state = self.lock();
        let id = State::next_id(&mut state.next_bet_id);
        let bet = Bet {
            id,
            race_id: new.race_id,
            user_id: new.user_id,
            racer_id: new.racer_id,
            amount: new.amount,
        };
        state.bets.insert(id, bet.clone());
        Ok(bet)
    }

    async fn bet(&self, id: BetId) -> Result<Option<Bet>> {
        Ok(self.lock().bets.get(&id).cloned())
    }

    async fn delete_bet(&self, id: BetId) -> Result<()> {
        self.lock().bets.remove(&id);
        Ok(())
    }

    async fn bets_by_race(&self, race_id: RaceId) -> Result<Vec<Bet>> {
        Ok(self
            .lock()
            .bets
            .values()
            .filter(|b| b.race_id == race_id)
            .cloned()
            .collect())
    }

    // -- Wallets --------------------------------------------------------

    async fn wallet(&self, user_id: UserId) -> Result<Option<Wallet>> {
        Ok(self.lock().wallets.get(&user_id).cloned())
    }

    async fn upsert_wallet(&self, user_id: UserId, balance: i64) -> Result<Wallet> {
        let wallet = Wallet { user_id, balance };
        self.lock().wallets.insert(user_id, wallet.clone());
        Ok(wallet)
    }

    async fn delete_wallet(&self, user_id: UserId) -> Result<()> {
        self.lock().wallets.remove(&user_id);
        Ok(())
    }

    // -- Course segments ------------------------------------------------

    async fn create_segment(&self, new: NewSegment) -> Result<CourseSegment> {
        let mut state = self.lock();
        let id = State::next_id(&mut state.next_segment_id);
        let segment = CourseSegment {
            id,
            race_id: new.race_id,
            position: new.position,
            description: new.description,
        };
        state.segments.insert(id, segment.clone());
        Ok(segment)
    }

    async fn segments_by_race(&self, race_id: RaceId) -> Result<Vec<CourseSegment>> {
        let mut segments: Vec<CourseSegment> = self
            .lock()
            .segments
            .values()
            .filter(|s| s.race_id == race_id)
            .cloned()
            .collect();
        segments.sort_by_key(|s| s.position);
        Ok(segments)
    }

    async fn delete_segment(&self, id: SegmentId) -> Result<()> {
        self.lock().segments.remove(&id);
        Ok(())
    }

    // -- Context settings -----------------------------------------------

    async fn context_settings(&self, context_id: ContextId) -> Result<Option<ContextSettings>> {
        Ok(self.lock().settings.get(&context_id).cloned())
    }

    async fn upsert_context_settings(&self, settings: ContextSettings) -> Result<()> {
        self.lock().settings.insert(settings.context_id, settings);
        Ok(())
    }

    async fn delete_context_settings(&self, context_id: ContextId) -> Result<()> {
        self.lock().settings.remove(&context_id);
        Ok(())
    }

    async fn known_contexts(&self) -> Result<Vec<ContextId>> {
        Ok(self.lock().settings.keys().copied().collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
