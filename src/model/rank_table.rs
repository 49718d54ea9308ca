use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use crate::{
    constants::AVERAGE_SCALE,
    database::db_structs::{PlayerId, PlayerRankEntry}
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedPlayer {
    pub player_id: PlayerId,
    pub nickname: String,
    pub average: i64
}

impl RankedPlayer {
    pub fn entry(&self) -> PlayerRankEntry {
        PlayerRankEntry {
            player_id: self.player_id,
            average: self.average
        }
    }

    /// Unscaled mean rank, e.g. `12.3456`
    pub fn average_display(&self) -> f64 {
        self.average as f64 / AVERAGE_SCALE as f64
    }
}

/// One complete, immutable result of a recomputation.
///
/// Entries are kept in ascending `average` order; equal averages keep the
/// order they were inserted in. A player's position is one plus the number of
/// entries with a strictly lower average, so tied players share a position.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RankSnapshot {
    entries: IndexMap<PlayerId, RankedPlayer>,
    /// Number of maps on the server when this snapshot was computed
    server_map_count: usize,
    computed_at: Option<DateTime<Utc>>
}

impl RankSnapshot {
    pub fn new(mut ranked: Vec<RankedPlayer>, server_map_count: usize, computed_at: Option<DateTime<Utc>>) -> Self {
        ranked.sort_by_key(|r| r.average);

        let mut entries = IndexMap::with_capacity(ranked.len());
        for r in ranked {
            entries.entry(r.player_id).or_insert(r);
        }

        RankSnapshot {
            entries,
            server_map_count,
            computed_at
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn server_map_count(&self) -> usize {
        self.server_map_count
    }

    pub fn computed_at(&self) -> Option<DateTime<Utc>> {
        self.computed_at
    }

    pub fn get(&self, player_id: PlayerId) -> Option<&RankedPlayer> {
        self.entries.get(&player_id)
    }

    /// 1-based position of `player_id`, if ranked
    pub fn position(&self, player_id: PlayerId) -> Option<usize> {
        self.get(player_id).map(|r| self.position_of_average(r.average))
    }

    pub fn position_of_average(&self, average: i64) -> usize {
        self.entries.partition_point(|_, r| r.average < average) + 1
    }

    /// The best-placed player whose average is the closest one strictly below
    /// `player_id`'s. `None` when `player_id` is unranked or already best.
    pub fn next_better(&self, player_id: PlayerId) -> Option<&RankedPlayer> {
        let mine = self.get(player_id)?.average;
        let better = self.entries.partition_point(|_, r| r.average < mine);
        if better == 0 {
            return None;
        }

        let (_, closest) = self.entries.get_index(better - 1)?;
        let group_start = self.entries.partition_point(|_, r| r.average < closest.average);

        self.entries.get_index(group_start).map(|(_, r)| r)
    }

    pub fn top(&self, n: usize) -> impl Iterator<Item = &RankedPlayer> {
        self.entries.values().take(n)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RankedPlayer> {
        self.entries.values()
    }

    pub fn entries(&self) -> Vec<PlayerRankEntry> {
        self.entries.values().map(RankedPlayer::entry).collect()
    }
}

/// Holder of the current [`RankSnapshot`].
///
/// Readers take an `Arc` to the snapshot and keep using it for the whole
/// query; writers only ever swap in a complete replacement.
#[derive(Debug, Default)]
pub struct RankTable {
    current: RwLock<Arc<RankSnapshot>>
}

impl RankTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<RankSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Swaps in `snapshot`, returning the one it replaced
    pub fn replace(&self, snapshot: RankSnapshot) -> Arc<RankSnapshot> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(snapshot))
    }
}
