//! Seams between the ranking core and its collaborators. The Postgres client
//! and the in-memory test store both implement these.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::{
    database::db_structs::{FinishRecord, LocalRecord, Map, MapId, PersistedRanks, Player, PlayerId, PlayerRankEntry, TopSum},
    error::StoreError
};

/// Read-only view over the persisted best times
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Number of local records each player holds across `maps`
    async fn record_count_by_player(&self, maps: &[MapId]) -> Result<HashMap<PlayerId, i64>, StoreError>;

    /// Best times on `map`, fastest first, at most `limit` rows
    async fn leaderboard(&self, map: MapId, limit: u32) -> Result<Vec<LocalRecord>, StoreError>;

    /// Display identities for `ids`. Unknown ids are left out.
    async fn players(&self, ids: &[PlayerId]) -> Result<Vec<Player>, StoreError>;
}

/// The maps currently considered "on this server"
#[async_trait]
pub trait MapRoster: Send + Sync {
    async fn maps(&self) -> Result<Vec<Map>, StoreError>;
}

/// Durable copy of the rank table
#[async_trait]
pub trait RankRepository: Send + Sync {
    /// Replaces every stored entry with `entries`, together with the number of
    /// maps they were computed over, in a single transaction
    async fn save_ranks(&self, entries: &[PlayerRankEntry], server_map_count: usize) -> Result<(), StoreError>;

    async fn load_ranks(&self) -> Result<PersistedRanks, StoreError>;
}

/// Append-only log of every finish
#[async_trait]
pub trait ScoreLog: Send + Sync {
    async fn save_score(&self, record: &FinishRecord) -> Result<(), StoreError>;

    /// All finishes of `player` on `map`, oldest first
    async fn score_progression(&self, player: PlayerId, map: MapId) -> Result<Vec<FinishRecord>, StoreError>;
}

/// Aggregate of podium placements, computed outside the ranking core
#[async_trait]
pub trait TopSumsProvider: Send + Sync {
    async fn top_sums(&self, limit: usize) -> Result<Vec<TopSum>, StoreError>;
}

/// A fixed roster, for callers that already know the map list
pub struct StaticRoster(pub Vec<Map>);

#[async_trait]
impl MapRoster for StaticRoster {
    async fn maps(&self) -> Result<Vec<Map>, StoreError> {
        Ok(self.0.clone())
    }
}
