use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type PlayerId = i32;
pub type MapId = i32;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    /// Unique account name, used as the live leaderboard key
    pub login: String,
    pub nickname: String
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Map {
    pub id: MapId,
    pub uid: String,
    pub name: String
}

/// A player's best time on a map, as kept by the local records table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRecord {
    pub player_id: PlayerId,
    pub map_id: MapId,
    /// Race time in milliseconds
    pub score: i32
}

/// One finish, appended to the score log on every finish event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishRecord {
    pub player_id: PlayerId,
    pub map_id: MapId,
    /// Race time in milliseconds
    pub score: i32,
    pub checkpoints: Vec<i32>,
    pub created_at: DateTime<Utc>
}

impl FinishRecord {
    /// Checkpoint splits in the comma-joined form they are stored as
    pub fn checkpoints_column(&self) -> String {
        self.checkpoints.iter().map(|cp| cp.to_string()).collect::<Vec<_>>().join(",")
    }

    pub fn parse_checkpoints(column: &str) -> Vec<i32> {
        column
            .split(',')
            .filter_map(|cp| cp.trim().parse().ok())
            .collect()
    }
}

/// A row of the rank table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerRankEntry {
    pub player_id: PlayerId,
    /// Mean per-map rank multiplied by [`crate::constants::AVERAGE_SCALE`]; lower is better
    pub average: i64
}

/// The rank table as last persisted, with the map count its averages were computed over
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PersistedRanks {
    /// `None` when nothing was persisted yet
    pub server_map_count: Option<usize>,
    pub ranks: Vec<(PlayerRankEntry, Player)>
}

/// Count of first, second and third places a player holds across local records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopSum {
    pub player_id: PlayerId,
    pub nickname: String,
    pub first: i64,
    pub second: i64,
    pub third: i64
}

impl TopSum {
    pub fn total(&self) -> i64 {
        self.first + self.second + self.third
    }
}
