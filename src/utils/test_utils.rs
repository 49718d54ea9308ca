//! In-memory collaborators and data generators for tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, PoisonError
    }
};

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::Semaphore;

use crate::{
    database::db_structs::{FinishRecord, LocalRecord, Map, MapId, PersistedRanks, Player, PlayerId, PlayerRankEntry, TopSum},
    error::StoreError,
    model::{
        live_rankings::LiveSnapshot,
        store::{MapRoster, RankRepository, RecordStore, ScoreLog, TopSumsProvider}
    },
    render::{ChatSink, LiveRankingsRenderer}
};

#[derive(Debug, Default)]
struct MemoryState {
    players: Vec<Player>,
    maps: Vec<Map>,
    records: Vec<LocalRecord>,
    scores: Vec<FinishRecord>,
    ranks: Vec<PlayerRankEntry>,
    rank_map_count: Option<usize>
}

/// Record store, roster, rank repository and score log backed by vectors.
///
/// Failures can be switched on per concern, and reads can be held at a
/// semaphore to observe a recomputation mid-flight.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    state: Mutex<MemoryState>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    unavailable: AtomicBool,
    roster_unavailable: AtomicBool,
    persist_failure: AtomicBool,
    record_count_queries: AtomicUsize
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_player(&self, id: PlayerId) -> Player {
        let player = generate_player(id);
        self.lock().players.push(player.clone());
        player
    }

    pub fn add_map(&self, id: MapId) -> Map {
        let map = generate_map(id);
        self.lock().maps.push(map.clone());
        map
    }

    /// Stores a local record, keeping only the best time per player and map
    pub fn add_record(&self, player_id: PlayerId, map_id: MapId, score: i32) {
        let mut state = self.lock();
        let existing = state
            .records
            .iter_mut()
            .find(|r| r.player_id == player_id && r.map_id == map_id);

        match existing {
            Some(record) => record.score = record.score.min(score),
            None => state.records.push(LocalRecord {
                player_id,
                map_id,
                score
            })
        }
    }

    pub fn map_list(&self) -> Vec<Map> {
        self.lock().maps.clone()
    }

    pub fn saved_ranks(&self) -> Vec<PlayerRankEntry> {
        self.lock().ranks.clone()
    }

    pub fn scores(&self) -> Vec<FinishRecord> {
        self.lock().scores.clone()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_roster_unavailable(&self, unavailable: bool) {
        self.roster_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_persist_failure(&self, failure: bool) {
        self.persist_failure.store(failure, Ordering::SeqCst);
    }

    /// Makes every record store read wait for a permit on the returned semaphore
    pub fn pause_reads(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&gate));
        gate
    }

    pub fn record_count_queries(&self) -> usize {
        self.record_count_queries.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn read_gate(&self) -> Result<(), StoreError> {
        let gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?
                .forget();
        }

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn record_count_by_player(&self, maps: &[MapId]) -> Result<HashMap<PlayerId, i64>, StoreError> {
        self.record_count_queries.fetch_add(1, Ordering::SeqCst);
        self.read_gate().await?;

        let mut counts = HashMap::new();
        for record in self.lock().records.iter().filter(|r| maps.contains(&r.map_id)) {
            *counts.entry(record.player_id).or_insert(0) += 1;
        }

        Ok(counts)
    }

    async fn leaderboard(&self, map: MapId, limit: u32) -> Result<Vec<LocalRecord>, StoreError> {
        self.read_gate().await?;

        let mut leaderboard: Vec<LocalRecord> = self
            .lock()
            .records
            .iter()
            .filter(|r| r.map_id == map)
            .cloned()
            .collect();
        leaderboard.sort_by_key(|r| r.score);
        leaderboard.truncate(limit as usize);

        Ok(leaderboard)
    }

    async fn players(&self, ids: &[PlayerId]) -> Result<Vec<Player>, StoreError> {
        self.read_gate().await?;

        Ok(self
            .lock()
            .players
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MapRoster for MemoryRecordStore {
    async fn maps(&self) -> Result<Vec<Map>, StoreError> {
        if self.roster_unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("map roster switched off".to_string()));
        }

        Ok(self.map_list())
    }
}

#[async_trait]
impl RankRepository for MemoryRecordStore {
    async fn save_ranks(&self, entries: &[PlayerRankEntry], server_map_count: usize) -> Result<(), StoreError> {
        if self.persist_failure.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("rank table write refused".to_string()));
        }

        let mut state = self.lock();
        state.ranks = entries.to_vec();
        state.rank_map_count = Some(server_map_count);
        Ok(())
    }

    async fn load_ranks(&self) -> Result<PersistedRanks, StoreError> {
        let state = self.lock();

        let ranks = state
            .ranks
            .iter()
            .filter_map(|entry| {
                let player = state.players.iter().find(|p| p.id == entry.player_id)?;
                Some((*entry, player.clone()))
            })
            .collect();

        Ok(PersistedRanks {
            server_map_count: state.rank_map_count,
            ranks
        })
    }
}

#[async_trait]
impl ScoreLog for MemoryRecordStore {
    async fn save_score(&self, record: &FinishRecord) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }

        self.lock().scores.push(record.clone());
        Ok(())
    }

    async fn score_progression(&self, player: PlayerId, map: MapId) -> Result<Vec<FinishRecord>, StoreError> {
        Ok(self
            .lock()
            .scores
            .iter()
            .filter(|s| s.player_id == player && s.map_id == map)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TopSumsProvider for MemoryRecordStore {
    async fn top_sums(&self, limit: usize) -> Result<Vec<TopSum>, StoreError> {
        let state = self.lock();
        let mut sums: HashMap<PlayerId, [i64; 3]> = HashMap::new();

        // Every map that has records counts, roster or not
        let mut by_map: HashMap<MapId, Vec<&LocalRecord>> = HashMap::new();
        for record in &state.records {
            by_map.entry(record.map_id).or_default().push(record);
        }

        for leaderboard in by_map.values_mut() {
            leaderboard.sort_by_key(|r| r.score);

            for (i, record) in leaderboard.iter().take(3).enumerate() {
                sums.entry(record.player_id).or_default()[i] += 1;
            }
        }

        let mut top: Vec<TopSum> = sums
            .into_iter()
            .map(|(player_id, [first, second, third])| TopSum {
                player_id,
                nickname: state
                    .players
                    .iter()
                    .find(|p| p.id == player_id)
                    .map(|p| p.nickname.clone())
                    .unwrap_or_default(),
                first,
                second,
                third
            })
            .collect();
        top.sort_by(|a, b| {
            (b.first, b.second, b.third, a.player_id).cmp(&(a.first, a.second, a.third, b.player_id))
        });
        top.truncate(limit);

        Ok(top)
    }
}

/// Renderer that keeps every snapshot it was asked to draw
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    renders: Mutex<Vec<(LiveSnapshot, Option<Player>)>>
}

impl RecordingRenderer {
    pub fn renders(&self) -> Vec<(LiveSnapshot, Option<Player>)> {
        self.renders.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn count(&self) -> usize {
        self.renders.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl LiveRankingsRenderer for RecordingRenderer {
    fn render(&self, snapshot: &LiveSnapshot, target: Option<&Player>) {
        self.renders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((snapshot.clone(), target.cloned()));
    }
}

/// Chat sink that keeps every message it was asked to send
#[derive(Debug, Default)]
pub struct RecordingChat {
    messages: Mutex<Vec<(String, String)>>
}

impl RecordingChat {
    /// `(login, message)` pairs in send order
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl ChatSink for RecordingChat {
    async fn send(&self, player: &Player, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((player.login.clone(), message.to_string()));
    }
}

pub fn generate_player(id: PlayerId) -> Player {
    Player {
        id,
        login: format!("player{}", id),
        nickname: format!("Player{}", id)
    }
}

pub fn generate_map(id: MapId) -> Map {
    Map {
        id,
        uid: format!("map-uid-{}", id),
        name: format!("Map {}", id)
    }
}

/// A store with `n_players` players and `n_maps` maps. Each player finishes a
/// map with a 3 in 4 chance at a random time; player 1 finishes every map.
/// The same seed always yields the same store.
pub fn generate_store(n_players: i32, n_maps: i32, seed: u64) -> MemoryRecordStore {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let store = MemoryRecordStore::new();

    for map_id in 1..=n_maps {
        store.add_map(map_id);
    }

    for player_id in 1..=n_players {
        store.add_player(player_id);

        for map_id in 1..=n_maps {
            if player_id == 1 || rng.random_bool(0.75) {
                store.add_record(player_id, map_id, rng.random_range(20_000..60_000));
            }
        }
    }

    store
}
