use std::sync::Arc;

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, task::JoinSet};
use tracing::{debug, info, warn};

use crate::{
    commands::{Command, CommandResponse},
    constants::{TOP_RANKS_LIMIT, TOP_SUMS_LIMIT},
    database::db_structs::{FinishRecord, Map, Player},
    model::{
        live_rankings::{LiveLeaderboard, LiveUpdate, ScoreSnapshotPlayer},
        rank_calculator::RankCalculator,
        rank_query::RankQueryService,
        single_flight::FlightOutcome,
        store::ScoreLog,
        structures::game_mode::GameMode
    },
    render::{ChatSink, LiveRankingsRenderer},
    settings::SettingsProvider
};

/// Callbacks delivered by the game server, one at a time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerEvent {
    Finish {
        player: Player,
        race_time: i32,
        lap_time: i32,
        checkpoints: Vec<i32>,
        mode: GameMode
    },
    Waypoint {
        player: Player,
        race_time: i32,
        mode: GameMode
    },
    ScoresSnapshot {
        section: String,
        players: Vec<ScoreSnapshotPlayer>
    },
    MapBegin {
        map: Map
    },
    MapEnd {
        map: Map
    },
    PlayerConnect {
        player: Player
    },
    PlayerDisconnect {
        player: Player
    },
    ModeChanged {
        mode: GameMode
    }
}

/// Collaborators the engine calls out to
pub struct EngineServices {
    pub calculator: Arc<RankCalculator>,
    pub queries: Arc<RankQueryService>,
    pub score_log: Arc<dyn ScoreLog>,
    pub settings: Arc<dyn SettingsProvider>,
    pub renderer: Arc<dyn LiveRankingsRenderer>,
    pub chat: Arc<dyn ChatSink>
}

/// Reacts to server events: logs finishes, keeps the live leaderboard
/// current and recomputes server ranks when a map ends.
///
/// Events are handled strictly in order. Recomputation runs as a background
/// task so the events that follow a map end are not held up by it.
pub struct RankingEngine {
    services: Arc<EngineServices>,
    live: LiveLeaderboard,
    current_map: Option<Map>,
    connected: IndexMap<String, Player>,
    background: JoinSet<()>
}

impl RankingEngine {
    pub fn new(services: EngineServices, mode: GameMode) -> Self {
        RankingEngine {
            services: Arc::new(services),
            live: LiveLeaderboard::new(mode),
            current_map: None,
            connected: IndexMap::new(),
            background: JoinSet::new()
        }
    }

    pub fn live(&self) -> &LiveLeaderboard {
        &self.live
    }

    pub fn current_map(&self) -> Option<&Map> {
        self.current_map.as_ref()
    }

    pub fn connected_players(&self) -> impl Iterator<Item = &Player> {
        self.connected.values()
    }

    /// Consumes events until every sender is dropped, then waits for any
    /// recomputation still running.
    pub async fn run(mut self, mut events: mpsc::Receiver<ServerEvent>) {
        info!("Ranking engine started");

        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }

        self.drain_background().await;
        info!("Ranking engine stopped");
    }

    pub async fn handle(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Finish {
                player,
                race_time,
                lap_time,
                checkpoints,
                mode
            } => self.on_finish(player, race_time, lap_time, checkpoints, mode).await,
            ServerEvent::Waypoint { player, race_time, mode } => self.on_waypoint(&player, race_time, mode),
            ServerEvent::ScoresSnapshot { section, players } => {
                debug!("Scores snapshot ({}) with {} players", section, players.len());
                let update = self.live.on_scores(&players);
                self.render_after(update);
            }
            ServerEvent::MapBegin { map } => {
                info!("Map begin: {}", map.name);
                self.current_map = Some(map);
                let update = self.live.map_begin();
                self.render_after(update);
            }
            ServerEvent::MapEnd { map } => {
                info!("Map end: {}, recomputing server ranks", map.name);
                self.spawn_recompute();
            }
            ServerEvent::PlayerConnect { player } => {
                self.services.renderer.render(&self.live.snapshot(), Some(&player));
                self.connected.insert(player.login.clone(), player);
            }
            ServerEvent::PlayerDisconnect { player } => {
                self.connected.shift_remove(&player.login);
            }
            ServerEvent::ModeChanged { mode } => {
                let update = self.live.set_mode(mode);
                self.render_after(update);
            }
        }
    }

    /// Serves a chat command for `player`
    pub async fn execute(&self, command: Command, player: &Player) -> CommandResponse {
        let queries = &self.services.queries;

        match command {
            Command::Rank => CommandResponse::Rank(queries.get_player_rank(player.id)),
            Command::NextRank => CommandResponse::NextRank(queries.get_next_better_player(player.id)),
            Command::TopRanks => CommandResponse::TopRanks(queries.get_top_ranks(TOP_RANKS_LIMIT)),
            Command::TopSums => match queries.get_top_sums(TOP_SUMS_LIMIT).await {
                Ok(sums) => CommandResponse::TopSums(sums),
                Err(e) => {
                    warn!("Top sums unavailable: {}", e);
                    CommandResponse::Unavailable("Top record players are unavailable right now.".to_string())
                }
            },
            Command::ScoreProgression => {
                let Some(map) = &self.current_map else {
                    return CommandResponse::Unavailable("No map is being played.".to_string());
                };

                match self.services.score_log.score_progression(player.id, map.id).await {
                    Ok(scores) => CommandResponse::ScoreProgression(scores),
                    Err(e) => {
                        warn!("Score progression unavailable: {}", e);
                        CommandResponse::Unavailable("Your score progression is unavailable right now.".to_string())
                    }
                }
            }
        }
    }

    /// Waits for every background recomputation started so far
    pub async fn drain_background(&mut self) {
        while let Some(result) = self.background.join_next().await {
            if let Err(e) = result {
                warn!("Rank recomputation task failed: {}", e);
            }
        }
    }

    async fn on_finish(&mut self, player: Player, race_time: i32, lap_time: i32, checkpoints: Vec<i32>, mode: GameMode) {
        debug!("{} finished in {}ms (lap {}ms)", player.login, race_time, lap_time);

        match &self.current_map {
            Some(map) => {
                let record = FinishRecord {
                    player_id: player.id,
                    map_id: map.id,
                    score: race_time,
                    checkpoints,
                    created_at: Utc::now()
                };

                if let Err(e) = self.services.score_log.save_score(&record).await {
                    warn!("Failed to log finish of {}: {}", player.login, e);
                }
            }
            None => warn!("Finish of {} before any map began, not logged", player.login)
        }

        // Only best-time boards rank single finishes; other modes wait for scores snapshots
        if !mode.is_best_time() || !self.live.mode().is_best_time() {
            debug!("Finish under {:?} leaves the live rankings as they are", mode);
            return;
        }

        let update = self.live.on_finish(&player, race_time);
        self.render_after(update);
    }

    fn on_waypoint(&self, player: &Player, race_time: i32, mode: GameMode) {
        if !mode.is_multi_lap() {
            return;
        }

        debug!("{} passed a waypoint at {}ms", player.login, race_time);
        self.services.renderer.render(&self.live.snapshot(), Some(player));
    }

    fn render_after(&self, update: LiveUpdate) {
        if let LiveUpdate::UnsupportedMode(mode) = &update {
            debug!("No live ranking for mode {:?}", mode);
        }

        if update.needs_render() {
            self.services.renderer.render(&self.live.snapshot(), None);
        }
    }

    fn spawn_recompute(&mut self) {
        while let Some(result) = self.background.try_join_next() {
            if let Err(e) = result {
                warn!("Rank recomputation task failed: {}", e);
            }
        }

        let services = Arc::clone(&self.services);
        let connected: Vec<Player> = self.connected.values().cloned().collect();

        self.background.spawn(async move {
            let outcome = services.calculator.trigger().await;
            if outcome == FlightOutcome::Coalesced {
                return;
            }

            let settings = services.settings.ranking_settings().await;
            if !settings.announce_rank_on_map_end {
                return;
            }

            for player in &connected {
                let message = CommandResponse::Rank(services.queries.get_player_rank(player.id));
                services.chat.send(player, &message.to_string()).await;
            }
        });
    }
}
