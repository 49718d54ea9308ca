use std::sync::Arc;

use serde::Serialize;

use crate::{
    constants::AVERAGE_SCALE,
    database::db_structs::{PlayerId, TopSum},
    error::StoreError,
    model::{
        rank_table::{RankSnapshot, RankTable},
        store::TopSumsProvider
    }
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlayerRank {
    pub position: usize,
    pub total_ranked: usize,
    pub average: i64
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RankLookup {
    Ranked(PlayerRank),
    /// The player has no entry in the current rank table
    Unranked
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextBetterPlayer {
    pub player_id: PlayerId,
    pub nickname: String,
    pub position: usize,
    pub average: i64,
    /// The difference in averages expressed as placements summed over all server maps
    pub rank_point_gap: u64
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum NextRankLookup {
    Found(NextBetterPlayer),
    /// The queried player already holds the best average
    NoBetterPlayer,
    Unranked
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopRank {
    pub position: usize,
    pub player_id: PlayerId,
    pub nickname: String,
    pub average: i64
}

/// Unscaled average, e.g. `12.3456`
pub fn average_display(average: i64) -> f64 {
    average as f64 / AVERAGE_SCALE as f64
}

/// `ceil((mine - theirs) / AVERAGE_SCALE * server_map_count)`, in integers
pub fn rank_point_gap(mine: i64, theirs: i64, server_map_count: usize) -> u64 {
    let diff = mine.saturating_sub(theirs).max(0) as u64;
    (diff * server_map_count as u64).div_ceil(AVERAGE_SCALE as u64)
}

/// Read-only queries over the rank table. Every query works on the snapshot
/// current when it started.
pub struct RankQueryService {
    table: Arc<RankTable>,
    top_sums: Option<Arc<dyn TopSumsProvider>>
}

impl RankQueryService {
    pub fn new(table: Arc<RankTable>) -> Self {
        RankQueryService { table, top_sums: None }
    }

    pub fn with_top_sums(mut self, provider: Arc<dyn TopSumsProvider>) -> Self {
        self.top_sums = Some(provider);
        self
    }

    pub fn snapshot(&self) -> Arc<RankSnapshot> {
        self.table.snapshot()
    }

    pub fn get_player_rank(&self, player_id: PlayerId) -> RankLookup {
        let snapshot = self.table.snapshot();

        match (snapshot.get(player_id), snapshot.position(player_id)) {
            (Some(ranked), Some(position)) => RankLookup::Ranked(PlayerRank {
                position,
                total_ranked: snapshot.len(),
                average: ranked.average
            }),
            _ => RankLookup::Unranked
        }
    }

    pub fn get_next_better_player(&self, player_id: PlayerId) -> NextRankLookup {
        let snapshot = self.table.snapshot();

        let Some(mine) = snapshot.get(player_id) else {
            return NextRankLookup::Unranked;
        };
        let Some(better) = snapshot.next_better(player_id) else {
            return NextRankLookup::NoBetterPlayer;
        };

        NextRankLookup::Found(NextBetterPlayer {
            player_id: better.player_id,
            nickname: better.nickname.clone(),
            position: snapshot.position_of_average(better.average),
            average: better.average,
            rank_point_gap: rank_point_gap(mine.average, better.average, snapshot.server_map_count())
        })
    }

    pub fn get_top_ranks(&self, n: usize) -> Vec<TopRank> {
        let snapshot = self.table.snapshot();

        snapshot
            .top(n)
            .map(|r| TopRank {
                position: snapshot.position_of_average(r.average),
                player_id: r.player_id,
                nickname: r.nickname.clone(),
                average: r.average
            })
            .collect()
    }

    /// Podium counts, delegated to the configured provider
    pub async fn get_top_sums(&self, limit: usize) -> Result<Vec<TopSum>, StoreError> {
        match &self.top_sums {
            Some(provider) => provider.top_sums(limit).await,
            None => Ok(Vec::new())
        }
    }
}
