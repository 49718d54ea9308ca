use std::env;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::{DEFAULT_MAX_RECORD_RANK, DEFAULT_MIN_RECORDS_REQUIRED, MAX_RECORD_RANK_FLOOR, MIN_RECORDS_FLOOR};

/// Settings consumed by the rank calculator and the map-end announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingSettings {
    /// A player needs strictly more local records than this to be ranked
    pub min_records_required: u32,
    /// Deepest per-map placement that still counts; also the penalty for unplaced maps
    pub max_record_rank: u32,
    /// Whether every connected player is told their rank after a map-end recomputation
    pub announce_rank_on_map_end: bool
}

impl RankingSettings {
    /// Reads the settings from environment variables, falling back to defaults
    /// for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            min_records_required: parse_var("MIN_RECORDS_REQUIRED").unwrap_or(defaults.min_records_required),
            max_record_rank: parse_var("MAX_RECORD_RANK").unwrap_or(defaults.max_record_rank),
            announce_rank_on_map_end: parse_var("ANNOUNCE_RANK_ON_MAP_END")
                .unwrap_or(defaults.announce_rank_on_map_end)
        }
    }

    /// Applies the lower bounds. Called once per recomputation so a single run
    /// always works with one consistent set of values.
    pub fn resolved(&self) -> Self {
        if self.min_records_required < MIN_RECORDS_FLOOR {
            warn!(
                "minimum_records_required={} is below the floor, using {}",
                self.min_records_required, MIN_RECORDS_FLOOR
            );
        }

        Self {
            min_records_required: self.min_records_required.max(MIN_RECORDS_FLOOR),
            max_record_rank: self.max_record_rank.max(MAX_RECORD_RANK_FLOOR),
            announce_rank_on_map_end: self.announce_rank_on_map_end
        }
    }
}

impl Default for RankingSettings {
    fn default() -> Self {
        Self {
            min_records_required: DEFAULT_MIN_RECORDS_REQUIRED,
            max_record_rank: DEFAULT_MAX_RECORD_RANK,
            announce_rank_on_map_end: false
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Source of the current settings. Queried at the start of every recomputation.
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn ranking_settings(&self) -> RankingSettings;
}

/// Settings fixed for the lifetime of the process
pub struct StaticSettings(pub RankingSettings);

#[async_trait]
impl SettingsProvider for StaticSettings {
    async fn ranking_settings(&self) -> RankingSettings {
        self.0
    }
}
