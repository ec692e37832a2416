//! Payout odds.
//!
//! Odds are flat: every entrant is assumed to have an equal chance, and
//! the multiplier is the fair payout shaved by the house edge. Stats and
//! temperament do not feed in yet.

use std::collections::HashMap;

use crate::types::RacerId;

/// Payout multiplier for each entrant.
///
/// With `n` entrants and house edge `h`, every multiplier is
/// `(1 - h) * n`. An empty field yields an empty map.
pub fn payout_multipliers(racer_ids: &[RacerId], house_edge: f64) -> HashMap<RacerId, f64> {
    if racer_ids.is_empty() {
        return HashMap::new();
    }

    let base_prob = 1.0 / racer_ids.len() as f64;
    let payout = (1.0 - house_edge) / base_prob;

    racer_ids.iter().map(|id| (*id, payout)).collect()
}
