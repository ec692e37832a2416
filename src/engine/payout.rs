//! Payout resolver.
//!
//! Settles all bets of a finished race. The winner is the minimum racer
//! id among the race's bets — not the simulated placements. That rule is
//! deliberate and covered by tests; changing it is a product decision,
//! not a cleanup.

use std::sync::Arc;
use tracing::{debug, info};

use crate::engine::ledger::Ledger;
use crate::store::Repository;
use crate::types::{BetOutcome, RaceId, Result, Settlement};

/// Winning bets pay out double their stake.
const WIN_MULTIPLIER: i64 = 2;

pub struct PayoutResolver {
    repo: Arc<dyn Repository>,
    ledger: Arc<Ledger>,
}

impl PayoutResolver {
    pub fn new(repo: Arc<dyn Repository>, ledger: Arc<Ledger>) -> Self {
        Self { repo, ledger }
    }

    /// Settle every bet on `race_id`: credit winners through the ledger,
    /// then remove all the race's bets.
    ///
    /// Returns `None` when the race has no bets, which also makes a
    /// repeat invocation a safe no-op — settlement deletes the bets it
    /// processes. Credits run under the ledger's per-wallet locks, so a
    /// concurrent bet placement on the same wallet cannot interleave.
    pub async fn settle(&self, race_id: RaceId) -> Result<Option<Settlement>> {
        let bets = self.repo.bets_by_race(race_id).await?;
        let Some(winner) = bets.iter().map(|b| b.racer_id).min() else {
            debug!(race_id, "No bets to settle");
            return Ok(None);
        };

        let mut outcomes = Vec::with_capacity(bets.len());
        for bet in &bets {
            let payout = if bet.racer_id == winner {
                bet.amount * WIN_MULTIPLIER
            } else {
                0
            };
            if payout > 0 {
                self.ledger.credit(bet.user_id, payout).await?;
            }
            self.repo.delete_bet(bet.id).await?;
            outcomes.push(BetOutcome {
                user_id: bet.user_id,
                racer_id: bet.racer_id,
                amount: bet.amount,
                payout,
            });
        }

        let settlement = Settlement {
            race_id,
            winner,
            outcomes,
        };
        info!(
            race_id,
            winner,
            bets = settlement.outcomes.len(),
            paid = settlement.total_payout(),
            "Race settled"
        );
        Ok(Some(settlement))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::NewBet;

    async fn setup() -> (Arc<MemoryStore>, Arc<Ledger>, PayoutResolver, RaceId) {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(Ledger::new(store.clone()));
        let resolver = PayoutResolver::new(store.clone(), ledger.clone());
        let race = store.create_race(1).await.unwrap();
        (store, ledger, resolver, race.id)
    }

    async fn add_bet(store: &MemoryStore, race_id: RaceId, user_id: i64, racer_id: i64, amount: i64) {
        store
            .create_bet(NewBet {
                race_id,
                user_id,
                racer_id,
                amount,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_settle_pays_double_to_min_racer_id() {
        let (store, ledger, resolver, race_id) = setup().await;
        store.upsert_wallet(1, 50).await.unwrap();
        store.upsert_wallet(2, 0).await.unwrap();
        add_bet(&store, race_id, 1, 1, 10).await;
        add_bet(&store, race_id, 2, 2, 20).await;

        let settlement = resolver.settle(race_id).await.unwrap().unwrap();

        assert_eq!(settlement.winner, 1);
        assert_eq!(ledger.balance(1).await.unwrap(), 70); // 50 + 2*10
        assert_eq!(ledger.balance(2).await.unwrap(), 0);
        assert!(store.bets_by_race(race_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_winner_ignores_simulated_placements() {
        // The rule is the minimum racer id among the bets, regardless of
        // which id actually "won" the simulation.
        let (store, _ledger, resolver, race_id) = setup().await;
        store.upsert_wallet(9, 0).await.unwrap();
        add_bet(&store, race_id, 9, 42, 10).await;
        add_bet(&store, race_id, 9, 7, 5).await; // same user betting twice is
                                                 // prevented upstream; here we
                                                 // only exercise the min rule
        let settlement = resolver.settle(race_id).await.unwrap().unwrap();
        assert_eq!(settlement.winner, 7);
    }

    #[tokio::test]
    async fn test_settle_no_bets_is_noop() {
        let (_store, _ledger, resolver, race_id) = setup().await;
        assert!(resolver.settle(race_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_settle_is_idempotent() {
        let (store, ledger, resolver, race_id) = setup().await;
        store.upsert_wallet(1, 0).await.unwrap();
        add_bet(&store, race_id, 1, 3, 10).await;

        let first = resolver.settle(race_id).await.unwrap();
        assert!(first.is_some());
        assert_eq!(ledger.balance(1).await.unwrap(), 20);

        // Re-running finds no bets and changes nothing
        let second = resolver.settle(race_id).await.unwrap();
        assert!(second.is_none());
        assert_eq!(ledger.balance(1).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_settle_creates_missing_winner_wallet() {
        let (store, ledger, resolver, race_id) = setup().await;
        add_bet(&store, race_id, 5, 1, 15).await;

        resolver.settle(race_id).await.unwrap();
        // Wallet did not exist; it is created empty and then credited
        assert_eq!(ledger.balance(5).await.unwrap(), 30);
    }

    #[tokio::test]
    async fn test_settlement_outcomes_cover_every_bet() {
        let (store, _ledger, resolver, race_id) = setup().await;
        add_bet(&store, race_id, 1, 2, 10).await;
        add_bet(&store, race_id, 2, 3, 20).await;
        add_bet(&store, race_id, 3, 4, 30).await;

        let settlement = resolver.settle(race_id).await.unwrap().unwrap();
        assert_eq!(settlement.outcomes.len(), 3);
        assert_eq!(settlement.winner, 2);
        assert_eq!(settlement.total_payout(), 20);

        let winners: Vec<_> = settlement.outcomes.iter().filter(|o| o.won()).collect();
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].user_id, 1);
    }

    #[tokio::test]
    async fn test_bets_from_other_races_untouched() {
        let (store, _ledger, resolver, race_id) = setup().await;
        let other = store.create_race(1).await.unwrap().id;
        add_bet(&store, race_id, 1, 2, 10).await;
        add_bet(&store, other, 2, 3, 20).await;

        resolver.settle(race_id).await.unwrap();
        assert_eq!(store.bets_by_race(other).await.unwrap().len(), 1);
    }
}
