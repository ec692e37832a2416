//! End-to-end race lifecycle tests.
//!
//! Drives the orchestrator through whole ticks against the in-memory
//! store: daily scheduling, betting, settlement, retirement, commentary,
//! notifications, failure handling, and snapshot persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use paddock::config::{EconomyConfig, RaceConfig};
use paddock::engine::ledger::Ledger;
use paddock::engine::orchestrator::RaceOrchestrator;
use paddock::notify::NotificationSink;
use paddock::scheduler::Scheduler;
use paddock::store::{MemoryStore, Repository};
use paddock::types::{
    Bet, BetId, ContextId, ContextSettings, CourseSegment, NewBet, NewRacer, NewSegment,
    PaddockError, Race, RaceId, RacePatch, RaceRecord, Racer, RacerId, RacerPatch, Result,
    SegmentId, UserId, Wallet,
};

fn race_cfg() -> RaceConfig {
    RaceConfig {
        frequency_per_day: 1,
        field_size: 8,
        bet_window_secs: 60,
        countdown_secs: 3,
        commentary_interval_secs: 1,
        course_segments: 2,
        house_edge: 0.1,
    }
}

fn economy_cfg() -> EconomyConfig {
    EconomyConfig {
        default_wallet: 100,
        // Above the 1..=100 draw range, so nobody retires unless a test
        // lowers the bar through context settings.
        retirement_threshold: 101,
    }
}

/// Sink recording everything the engine sends.
#[derive(Default)]
struct RecordingSink {
    announcements: Mutex<Vec<(ContextId, String)>>,
    dms: Mutex<Vec<(UserId, String)>>,
}

impl RecordingSink {
    fn announcements(&self) -> Vec<(ContextId, String)> {
        self.announcements.lock().unwrap().clone()
    }

    fn dms(&self) -> Vec<(UserId, String)> {
        self.dms.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn announce(&self, context_id: ContextId, message: &str) -> Result<()> {
        self.announcements
            .lock()
            .unwrap()
            .push((context_id, message.to_string()));
        Ok(())
    }

    async fn direct_message(&self, user_id: UserId, message: &str) -> Result<()> {
        self.dms.lock().unwrap().push((user_id, message.to_string()));
        Ok(())
    }
}

/// Repository wrapper that can be armed to fail `update_race`, standing
/// in for a storage outage at the settlement boundary.
struct FailingStore {
    inner: Arc<MemoryStore>,
    fail_update_race: AtomicBool,
}

impl FailingStore {
    fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_update_race: AtomicBool::new(false),
        }
    }

    fn arm(&self) {
        self.fail_update_race.store(true, Ordering::SeqCst);
    }

    fn disarm(&self) {
        self.fail_update_race.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Repository for FailingStore {
    async fn create_racer(&self, new: NewRacer) -> Result<Racer> {
        self.inner.create_racer(new).await
    }

    async fn racer(&self, id: RacerId) -> Result<Option<Racer>> {
        self.inner.racer(id).await
    }

    async fn update_racer(&self, id: RacerId, patch: RacerPatch) -> Result<Racer> {
        self.inner.update_racer(id, patch).await
    }

    async fn delete_racer(&self, id: RacerId) -> Result<()> {
        self.inner.delete_racer(id).await
    }

    async fn active_racers(&self) -> Result<Vec<Racer>> {
        self.inner.active_racers().await
    }

    async fn create_race(&self, context_id: ContextId) -> Result<Race> {
        self.inner.create_race(context_id).await
    }

    async fn race(&self, id: RaceId) -> Result<Option<Race>> {
        self.inner.race(id).await
    }

    async fn update_race(&self, id: RaceId, patch: RacePatch) -> Result<Race> {
        if self.fail_update_race.load(Ordering::SeqCst) {
            return Err(PaddockError::Persistence("disk full".into()));
        }
        self.inner.update_race(id, patch).await
    }

    async fn delete_race(&self, id: RaceId) -> Result<()> {
        self.inner.delete_race(id).await
    }

    async fn unfinished_races(&self) -> Result<Vec<Race>> {
        self.inner.unfinished_races().await
    }

    async fn races_created_since(
        &self,
        context_id: ContextId,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        self.inner.races_created_since(context_id, since).await
    }

    async fn race_history(&self, context_id: ContextId, limit: usize) -> Result<Vec<RaceRecord>> {
        self.inner.race_history(context_id, limit).await
    }

    async fn create_bet(&self, new: NewBet) -> Result<Bet> {
        self.inner.create_bet(new).await
    }

    async fn bet(&self, id: BetId) -> Result<Option<Bet>> {
        self.inner.bet(id).await
    }

    async fn delete_bet(&self, id: BetId) -> Result<()> {
        self.inner.delete_bet(id).await
    }

    async fn bets_by_race(&self, race_id: RaceId) -> Result<Vec<Bet>> {
        self.inner.bets_by_race(race_id).await
    }

    async fn wallet(&self, user_id: UserId) -> Result<Option<Wallet>> {
        self.inner.wallet(user_id).await
    }

    async fn upsert_wallet(&self, user_id: UserId, balance: i64) -> Result<Wallet> {
        self.inner.upsert_wallet(user_id, balance).await
    }

    async fn delete_wallet(&self, user_id: UserId) -> Result<()> {
        self.inner.delete_wallet(user_id).await
    }

    async fn create_segment(&self, new: NewSegment) -> Result<CourseSegment> {
        self.inner.create_segment(new).await
    }

    async fn segments_by_race(&self, race_id: RaceId) -> Result<Vec<CourseSegment>> {
        self.inner.segments_by_race(race_id).await
    }

    async fn delete_segment(&self, id: SegmentId) -> Result<()> {
        self.inner.delete_segment(id).await
    }

    async fn context_settings(&self, context_id: ContextId) -> Result<Option<ContextSettings>> {
        self.inner.context_settings(context_id).await
    }

    async fn upsert_context_settings(&self, settings: ContextSettings) -> Result<()> {
        self.inner.upsert_context_settings(settings).await
    }

    async fn delete_context_settings(&self, context_id: ContextId) -> Result<()> {
        self.inner.delete_context_settings(context_id).await
    }

    async fn known_contexts(&self) -> Result<Vec<ContextId>> {
        self.inner.known_contexts().await
    }
}

fn build_orchestrator(
    repo: Arc<dyn Repository>,
    sink: Arc<RecordingSink>,
    tracked: Vec<ContextId>,
) -> (Arc<Ledger>, Arc<RaceOrchestrator>) {
    let ledger = Arc::new(Ledger::new(repo.clone()));
    let orchestrator = Arc::new(RaceOrchestrator::new(
        repo,
        ledger.clone(),
        sink,
        race_cfg(),
        economy_cfg(),
        tracked,
        2024,
    ));
    (ledger, orchestrator)
}

async fn stable_racers(repo: &dyn Repository, count: usize) {
    for i in 0..count {
        repo.create_racer(NewRacer::new(format!("Racer-{i}"), i as i64 + 1))
            .await
            .unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_drives_full_lifecycle() {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(RecordingSink::default());
    let (ledger, orchestrator) = build_orchestrator(store.clone(), sink.clone(), vec![100]);
    let scheduler = Scheduler::new(orchestrator, std::time::Duration::from_secs(86400));

    stable_racers(store.as_ref(), 4).await;

    // First tick schedules the daily race with its course segments; there
    // are bets on nothing yet, so it also runs the race to completion.
    let report = scheduler.tick_now().await.unwrap();
    assert_eq!(report.races_created, 1);
    assert_eq!(report.races_run, 1);
    assert_eq!(report.races_failed, 0);

    // A fresh race next day would be a new row; today the quota is met.
    let report = scheduler.tick_now().await.unwrap();
    assert_eq!(report.races_created, 0);
    assert_eq!(report.races_run, 0);

    // The race was announced, counted down, commentated (two segments),
    // and its results were posted.
    let messages: Vec<String> = sink.announcements().into_iter().map(|(_, m)| m).collect();
    assert_eq!(messages.len(), 7);
    assert!(messages[0].starts_with("Race Starting Soon"));
    assert_eq!(&messages[1..4], &["3", "2", "1"]);
    assert!(messages[4].starts_with("Segment 1: Racer "));
    assert!(messages[6].starts_with("Race Results"));

    // No bets were placed, so no wallets were touched and no DMs sent.
    assert!(sink.dms().is_empty());
    assert!(ledger.balance(1).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_bets_settle_against_min_racer_id_winner() {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(RecordingSink::default());
    let (ledger, orchestrator) = build_orchestrator(store.clone(), sink.clone(), vec![]);

    stable_racers(store.as_ref(), 3).await;
    let race = store.create_race(100).await.unwrap();

    // Racer 1 has the minimum id among the bets, so it wins regardless of
    // the simulated finishing order.
    ledger.place_bet(50, race.id, 1, 10, 100).await.unwrap();
    ledger.place_bet(60, race.id, 3, 25, 100).await.unwrap();

    let report = orchestrator.tick().await.unwrap();
    assert_eq!(report.races_run, 1);

    assert_eq!(ledger.balance(50).await.unwrap(), 110); // 100 - 10 + 20
    assert_eq!(ledger.balance(60).await.unwrap(), 75); // 100 - 25
    assert!(store.bets_by_race(race.id).await.unwrap().is_empty());
    assert!(store.race(race.id).await.unwrap().unwrap().finished);

    let dms = sink.dms();
    assert_eq!(dms.len(), 2);
    assert!(dms.iter().any(|(user, msg)| *user == 50 && msg.starts_with("You won 20 coins")));
    assert!(dms
        .iter()
        .any(|(user, msg)| *user == 60 && msg.starts_with("You lost your bet of 25 coins")));

    // The history query reproduces the outcome for the context. The bets
    // are gone by now, so winner and payout read as empty.
    let history = store.race_history(100, 5).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].race.id, race.id);
}

#[tokio::test(start_paused = true)]
async fn test_persistence_failure_aborts_race_until_next_tick() {
    let store = Arc::new(MemoryStore::new());
    let failing = Arc::new(FailingStore::new(store.clone()));
    let sink = Arc::new(RecordingSink::default());
    let (ledger, orchestrator) = build_orchestrator(failing.clone(), sink.clone(), vec![]);

    stable_racers(failing.as_ref(), 2).await;
    let race = failing.create_race(100).await.unwrap();
    ledger.place_bet(50, race.id, 1, 10, 100).await.unwrap();

    // Storage fails at the finished-flag update: the race aborts before
    // settlement, leaving the bet and wallet exactly as they were.
    failing.arm();
    let report = orchestrator.tick().await.unwrap();
    assert_eq!(report.races_run, 0);
    assert_eq!(report.races_failed, 1);
    assert!(!store.race(race.id).await.unwrap().unwrap().finished);
    assert_eq!(store.bets_by_race(race.id).await.unwrap().len(), 1);
    assert_eq!(ledger.balance(50).await.unwrap(), 90);
    assert!(sink.dms().is_empty());

    // The next tick naturally retries the still-unfinished race.
    failing.disarm();
    let report = orchestrator.tick().await.unwrap();
    assert_eq!(report.races_run, 1);
    assert!(store.race(race.id).await.unwrap().unwrap().finished);
    assert!(store.bets_by_race(race.id).await.unwrap().is_empty());
    assert_eq!(ledger.balance(50).await.unwrap(), 110);
}

#[tokio::test(start_paused = true)]
async fn test_finished_race_is_never_resettled() {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(RecordingSink::default());
    let (ledger, orchestrator) = build_orchestrator(store.clone(), sink.clone(), vec![]);

    stable_racers(store.as_ref(), 2).await;
    let race = store.create_race(100).await.unwrap();
    ledger.place_bet(50, race.id, 1, 10, 100).await.unwrap();

    // The race is already marked finished, as after a settlement that
    // committed the flag but crashed before completing. Later ticks must
    // not run or re-settle it.
    store.update_race(race.id, RacePatch::finish()).await.unwrap();

    let report = orchestrator.tick().await.unwrap();
    assert_eq!(report.races_run, 0);
    assert_eq!(report.races_failed, 0);
    assert_eq!(store.bets_by_race(race.id).await.unwrap().len(), 1);
    assert_eq!(ledger.balance(50).await.unwrap(), 90);
    assert!(sink.announcements().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_survives_restart_mid_game() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("paddock_state.json");

    let race_id;
    {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        let (ledger, _orchestrator) = build_orchestrator(store.clone(), sink, vec![]);

        stable_racers(store.as_ref(), 3).await;
        let race = store.create_race(100).await.unwrap();
        race_id = race.id;
        ledger.place_bet(50, race_id, 2, 30, 100).await.unwrap();

        store.save(&path).unwrap();
    }

    // Restart: the restored store carries the open race, the bet, and
    // the wallet, and the orchestrator finishes the game from there.
    let store = Arc::new(MemoryStore::load(&path).unwrap());
    let sink = Arc::new(RecordingSink::default());
    let (ledger, orchestrator) = build_orchestrator(store.clone(), sink.clone(), vec![]);

    assert_eq!(store.unfinished_races().await.unwrap().len(), 1);
    assert_eq!(ledger.balance(50).await.unwrap(), 70);

    let report = orchestrator.tick().await.unwrap();
    assert_eq!(report.races_run, 1);
    assert!(store.race(race_id).await.unwrap().unwrap().finished);
    // Sole bettor backed the minimum racer id among the bets, so the
    // 30-coin stake comes back doubled.
    assert_eq!(ledger.balance(50).await.unwrap(), 130);
    assert!(sink.dms().iter().any(|(user, _)| *user == 50));
}
