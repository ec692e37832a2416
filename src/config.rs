//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Per-context overrides live in the store (`ContextSettings`); this file
//! only carries the global defaults and timing knobs.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::types::ContextId;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub race: RaceConfig,
    pub economy: EconomyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    /// Seconds between orchestrator ticks.
    pub tick_interval_secs: u64,
    /// Where the default store snapshots its state.
    pub snapshot_path: String,
    /// Contexts the orchestrator always serves, merged with contexts that
    /// have stored settings.
    #[serde(default)]
    pub tracked_contexts: Vec<ContextId>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RaceConfig {
    /// Races created per context per day.
    pub frequency_per_day: u32,
    /// Racers sampled into each race. One constant for every call site.
    pub field_size: usize,
    /// Betting window length in seconds.
    pub bet_window_secs: u64,
    /// Total countdown duration in seconds, split over three steps.
    pub countdown_secs: u64,
    /// Seconds between commentary events.
    pub commentary_interval_secs: u64,
    /// Course segments seeded for each scheduled race.
    pub course_segments: u32,
    /// Fraction shaved off fair odds, in [0, 1).
    pub house_edge: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EconomyConfig {
    /// Starting balance for lazily created wallets.
    pub default_wallet: i64,
    /// Retirement cutoff for the post-race 1..=100 draw.
    pub retirement_threshold: u8,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.race.house_edge) {
            anyhow::bail!("house_edge must be in [0, 1): {}", self.race.house_edge);
        }
        if self.race.field_size == 0 {
            anyhow::bail!("field_size must be at least 1");
        }
        if !(1..=100).contains(&self.economy.retirement_threshold) {
            anyhow::bail!(
                "retirement_threshold must be in 1..=100: {}",
                self.economy.retirement_threshold
            );
        }
        Ok(())
    }
}

impl ServiceConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}

impl RaceConfig {
    pub fn bet_window(&self) -> Duration {
        Duration::from_secs(self.bet_window_secs)
    }

    pub fn countdown_total(&self) -> Duration {
        Duration::from_secs(self.countdown_secs)
    }

    pub fn commentary_interval(&self) -> Duration {
        Duration::from_secs(self.commentary_interval_secs)
    }
}
