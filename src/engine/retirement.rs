//! Post-race retirement and succession.
//!
//! After every race each participant rolls against the retirement
//! threshold. A retiree is flagged — never deleted — and spawns exactly
//! one successor with the same owner and fresh stats, so the racer
//! population never shrinks.

use rand::Rng;
use std::sync::Arc;
use tracing::info;

use crate::store::Repository;
use crate::types::{NewRacer, Racer, RacerId, RacerPatch, Result};

/// Suffix appended to a retiree's name for its successor.
const SUCCESSOR_SUFFIX: &str = " II";

pub struct RetirementEngine {
    repo: Arc<dyn Repository>,
}

impl RetirementEngine {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Roll retirement for each participant: a uniform draw in [1, 100]
    /// at or above `threshold` retires the racer and creates its
    /// successor. Returns the ids of the racers that retired.
    pub async fn process<R: Rng + Send>(
        &self,
        participants: &[Racer],
        threshold: u8,
        rng: &mut R,
    ) -> Result<Vec<RacerId>> {
        let mut retired = Vec::new();
        for racer in participants {
            let draw: i32 = rng.gen_range(1..=100);
            if draw < threshold as i32 {
                continue;
            }

            self.repo.update_racer(racer.id, RacerPatch::retire()).await?;
            let successor = self
                .repo
                .create_racer(NewRacer::new(
                    format!("{}{SUCCESSOR_SUFFIX}", racer.name),
                    racer.owner_id,
                ))
                .await?;
            info!(
                racer_id = racer.id,
                racer = %racer.name,
                successor_id = successor.id,
                successor = %successor.name,
                draw,
                threshold,
                "Racer retired, successor stabled"
            );
            retired.push(racer.id);
        }
        Ok(retired)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
