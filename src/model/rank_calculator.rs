use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant}
};

use chrono::Utc;
use itertools::Itertools;
use tracing::{error, info, warn};

use crate::{
    constants::AVERAGE_SCALE,
    database::db_structs::{LocalRecord, MapId, Player, PlayerId, PlayerRankEntry},
    error::RankingError,
    model::{
        rank_table::{RankSnapshot, RankTable, RankedPlayer},
        single_flight::{FlightOutcome, SingleFlight},
        store::{MapRoster, RankRepository, RecordStore}
    },
    settings::{RankingSettings, SettingsProvider},
    utils::progress_utils::progress_bar
};

/// Players holding strictly more than `min_records` records, in ascending id order
pub fn eligible_players(record_counts: &HashMap<PlayerId, i64>, min_records: u32) -> Vec<PlayerId> {
    record_counts
        .iter()
        .filter(|(_, count)| **count > min_records as i64)
        .map(|(player_id, _)| *player_id)
        .sorted()
        .collect()
}

/// 1-based placements of `eligible` players within the first `max_rank` rows
/// of a map leaderboard. Only the first row of a player counts.
pub fn map_placements(
    leaderboard: &[LocalRecord],
    eligible: &HashSet<PlayerId>,
    max_rank: u32
) -> Vec<(PlayerId, u32)> {
    let mut seen = HashSet::new();

    leaderboard
        .iter()
        .take(max_rank as usize)
        .enumerate()
        .filter(|(_, record)| eligible.contains(&record.player_id) && seen.insert(record.player_id))
        .map(|(i, record)| (record.player_id, i as u32 + 1))
        .collect()
}

/// Mean placement over `server_map_count` maps, every map without a placement
/// costing `max_rank`, scaled by [`AVERAGE_SCALE`] and rounded half to even.
pub fn scaled_average(placements: &[u32], server_map_count: usize, max_rank: u32) -> i64 {
    if server_map_count == 0 {
        return 0;
    }

    let placed = placements.len().min(server_map_count);
    let unplaced = (server_map_count - placed) as i64;
    let rank_sum = placements.iter().map(|p| *p as i64).sum::<i64>() + unplaced * max_rank as i64;

    let total = server_map_count as i64;
    let scaled = rank_sum * AVERAGE_SCALE;
    let (quotient, remainder) = (scaled / total, scaled % total);

    match (2 * remainder).cmp(&total) {
        Ordering::Greater => quotient + 1,
        Ordering::Equal if quotient % 2 == 1 => quotient + 1,
        _ => quotient
    }
}

/// Computes the rank entries of `eligible` players from one leaderboard per
/// server map. Output follows `eligible` order.
pub fn calculate_ranks(
    eligible: &[PlayerId],
    leaderboards: &[Vec<LocalRecord>],
    max_rank: u32
) -> Vec<PlayerRankEntry> {
    let eligible_set: HashSet<PlayerId> = eligible.iter().copied().collect();
    let mut placements: HashMap<PlayerId, Vec<u32>> = HashMap::new();

    for leaderboard in leaderboards {
        for (player_id, placement) in map_placements(leaderboard, &eligible_set, max_rank) {
            placements.entry(player_id).or_default().push(placement);
        }
    }

    eligible
        .iter()
        .map(|player_id| PlayerRankEntry {
            player_id: *player_id,
            average: scaled_average(
                placements.get(player_id).map(Vec::as_slice).unwrap_or_default(),
                leaderboards.len(),
                max_rank
            )
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecomputeSummary {
    pub ranked_players: usize,
    pub server_maps: usize,
    pub elapsed: Duration
}

/// Rebuilds the server rank table from the record store.
///
/// Each recomputation reads everything it needs first, persists the result,
/// and only then swaps the in-memory table. Any failure along the way leaves
/// the previous table untouched. [`RankCalculator::trigger`] guarantees that
/// at most one recomputation is in flight.
pub struct RankCalculator {
    store: Arc<dyn RecordStore>,
    roster: Arc<dyn MapRoster>,
    settings: Arc<dyn SettingsProvider>,
    repository: Option<Arc<dyn RankRepository>>,
    table: Arc<RankTable>,
    flight: SingleFlight,
    show_progress: bool
}

impl RankCalculator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        roster: Arc<dyn MapRoster>,
        settings: Arc<dyn SettingsProvider>,
        table: Arc<RankTable>
    ) -> Self {
        RankCalculator {
            store,
            roster,
            settings,
            repository: None,
            table,
            flight: SingleFlight::new(),
            show_progress: false
        }
    }

    pub fn with_repository(mut self, repository: Arc<dyn RankRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn table(&self) -> Arc<RankTable> {
        Arc::clone(&self.table)
    }

    /// Runs a recomputation unless one is already in flight, in which case a
    /// single follow-up is scheduled and this call returns immediately.
    /// Failures are logged; they never reach the caller.
    pub async fn trigger(&self) -> FlightOutcome {
        self.flight
            .run(|| async {
                if let Err(e) = self.recompute().await {
                    error!("[RANKING] Recomputation aborted, keeping the previous rank table: {}", e);
                }
            })
            .await
    }

    /// A single recomputation, bypassing the in-flight guard
    pub async fn recompute(&self) -> Result<RecomputeSummary, RankingError> {
        let start = Instant::now();
        let settings = self.settings.ranking_settings().await.resolved();

        let maps = self.roster.maps().await.map_err(RankingError::RosterUnavailable)?;
        let map_ids: Vec<MapId> = maps.iter().map(|m| m.id).collect();

        let record_counts = self
            .store
            .record_count_by_player(&map_ids)
            .await
            .map_err(RankingError::StoreUnavailable)?;
        let eligible = eligible_players(&record_counts, settings.min_records_required);

        if eligible.is_empty() {
            info!("[RANKING] No eligible players, clearing the rank table");
            self.publish(RankSnapshot::new(Vec::new(), maps.len(), Some(Utc::now())))
                .await?;

            return Ok(RecomputeSummary {
                ranked_players: 0,
                server_maps: maps.len(),
                elapsed: start.elapsed()
            });
        }

        info!(
            "[RANKING] {} eligible players across {} maps",
            eligible.len(),
            maps.len()
        );

        let leaderboards = self.fetch_leaderboards(&map_ids, &settings).await?;
        let entries = calculate_ranks(&eligible, &leaderboards, settings.max_record_rank);

        let players = self
            .store
            .players(&eligible)
            .await
            .map_err(RankingError::StoreUnavailable)?;
        let ranked = join_players(entries, &players);
        let ranked_players = ranked.len();

        self.publish(RankSnapshot::new(ranked, maps.len(), Some(Utc::now())))
            .await?;

        let elapsed = start.elapsed();
        info!("[RANKING] Total time elapsed: {}ms", elapsed.as_millis());

        Ok(RecomputeSummary {
            ranked_players,
            server_maps: maps.len(),
            elapsed
        })
    }

    /// Loads the persisted rank table into memory. Returns the number of
    /// restored entries; without a repository nothing is restored.
    pub async fn restore(&self) -> Result<usize, RankingError> {
        let Some(repository) = &self.repository else {
            return Ok(0);
        };

        let persisted = repository.load_ranks().await.map_err(RankingError::StoreUnavailable)?;
        let server_maps = match persisted.server_map_count {
            Some(count) => count,
            None => self.roster.maps().await.map_err(RankingError::RosterUnavailable)?.len()
        };

        let ranked = persisted
            .ranks
            .into_iter()
            .map(|(entry, player)| RankedPlayer {
                player_id: entry.player_id,
                nickname: player.nickname,
                average: entry.average
            })
            .collect_vec();
        let restored = ranked.len();

        self.table.replace(RankSnapshot::new(ranked, server_maps, None));
        info!("[RANKING] Restored {} persisted ranks", restored);

        Ok(restored)
    }

    async fn fetch_leaderboards(
        &self,
        map_ids: &[MapId],
        settings: &RankingSettings
    ) -> Result<Vec<Vec<LocalRecord>>, RankingError> {
        let bar = if self.show_progress {
            progress_bar(map_ids.len() as u64, "Ranking server maps".to_string())
        } else {
            None
        };

        let mut leaderboards = Vec::with_capacity(map_ids.len());
        for map_id in map_ids {
            let leaderboard = self
                .store
                .leaderboard(*map_id, settings.max_record_rank)
                .await
                .map_err(RankingError::StoreUnavailable)?;
            leaderboards.push(leaderboard);

            if let Some(bar) = &bar {
                bar.inc(1);
            }
        }

        if let Some(bar) = bar {
            bar.finish();
        }

        Ok(leaderboards)
    }

    async fn publish(&self, snapshot: RankSnapshot) -> Result<(), RankingError> {
        if let Some(repository) = &self.repository {
            repository
                .save_ranks(&snapshot.entries(), snapshot.server_map_count())
                .await
                .map_err(RankingError::PersistFailed)?;
        }

        self.table.replace(snapshot);
        Ok(())
    }
}

fn join_players(entries: Vec<PlayerRankEntry>, players: &[Player]) -> Vec<RankedPlayer> {
    let nicknames: HashMap<PlayerId, &str> = players.iter().map(|p| (p.id, p.nickname.as_str())).collect();

    entries
        .into_iter()
        .map(|entry| {
            let nickname = match nicknames.get(&entry.player_id) {
                Some(nickname) => nickname.to_string(),
                None => {
                    warn!("Player {} has records but no identity, ranking by id", entry.player_id);
                    entry.player_id.to_string()
                }
            };

            RankedPlayer {
                player_id: entry.player_id,
                nickname,
                average: entry.average
            }
        })
        .collect()
}
