use server_ranks::{
    commands::{Command, CommandResponse},
    database::db_structs::Player,
    engine::{EngineServices, RankingEngine, ServerEvent},
    model::{
        live_rankings::ScoreSnapshotPlayer,
        rank_calculator::RankCalculator,
        rank_query::{NextRankLookup, RankLookup, RankQueryService},
        rank_table::RankTable,
        structures::game_mode::GameMode
    },
    settings::{RankingSettings, StaticSettings},
    utils::test_utils::{generate_map, generate_player, MemoryRecordStore, RecordingChat, RecordingRenderer}
};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::common::init_test_env;

struct Harness {
    store: Arc<MemoryRecordStore>,
    renderer: Arc<RecordingRenderer>,
    chat: Arc<RecordingChat>,
    table: Arc<RankTable>,
    engine: RankingEngine
}

/// Players 1 to 3 hold records on all four maps, in id order. Player 9
/// exists but has no records.
fn ranked_store() -> MemoryRecordStore {
    let store = MemoryRecordStore::new();
    for map_id in 1..=4 {
        store.add_map(map_id);
    }
    for player_id in 1..=3 {
        store.add_player(player_id);
        for map_id in 1..=4 {
            store.add_record(player_id, map_id, 30_000 + player_id * 1_000);
        }
    }
    store.add_player(9);

    store
}

fn harness(store: MemoryRecordStore, mode: GameMode, announce: bool) -> Harness {
    init_test_env();

    let store = Arc::new(store);
    let renderer = Arc::new(RecordingRenderer::default());
    let chat = Arc::new(RecordingChat::default());
    let table = Arc::new(RankTable::new());
    let settings = Arc::new(StaticSettings(RankingSettings {
        min_records_required: 3,
        max_record_rank: 100,
        announce_rank_on_map_end: announce
    }));

    let calculator = RankCalculator::new(store.clone(), store.clone(), settings.clone(), table.clone())
        .with_repository(store.clone());
    let queries = RankQueryService::new(table.clone()).with_top_sums(store.clone());

    let services = EngineServices {
        calculator: Arc::new(calculator),
        queries: Arc::new(queries),
        score_log: store.clone(),
        settings,
        renderer: renderer.clone(),
        chat: chat.clone()
    };

    Harness {
        store,
        renderer,
        chat,
        table,
        engine: RankingEngine::new(services, mode)
    }
}

fn finish(player: &Player, race_time: i32, mode: GameMode) -> ServerEvent {
    ServerEvent::Finish {
        player: player.clone(),
        race_time,
        lap_time: race_time,
        checkpoints: vec![race_time / 2, race_time],
        mode
    }
}

#[tokio::test]
async fn test_finish_logs_score_and_updates_live_rankings() {
    let mut h = harness(ranked_store(), GameMode::TimeAttack, false);
    let (p1, p2) = (generate_player(1), generate_player(2));

    h.engine.handle(ServerEvent::MapBegin { map: generate_map(1) }).await;
    h.engine.handle(finish(&p1, 30_000, GameMode::TimeAttack)).await;
    h.engine.handle(finish(&p2, 28_000, GameMode::TimeAttack)).await;
    h.engine.handle(finish(&p1, 32_000, GameMode::TimeAttack)).await;

    // Every finish is logged, improving or not
    let scores = h.store.scores();
    assert_eq!(scores.len(), 3);
    assert_eq!(scores[0].map_id, 1);
    assert_eq!(scores[0].checkpoints, vec![15_000, 30_000]);

    let live: Vec<(&str, i32)> = h.engine.live().entries().map(|e| (e.login.as_str(), e.score)).collect();
    assert_eq!(live, vec![("player2", 28_000), ("player1", 30_000)]);

    // Map begin and the two improving finishes
    assert_eq!(h.renderer.count(), 3);
}

#[tokio::test]
async fn test_finish_before_map_begin_is_not_logged() {
    let mut h = harness(ranked_store(), GameMode::TimeAttack, false);

    h.engine.handle(finish(&generate_player(1), 30_000, GameMode::TimeAttack)).await;

    assert!(h.store.scores().is_empty());
    assert_eq!(h.engine.live().len(), 1);
}

#[tokio::test]
async fn test_points_mode_ranks_from_scores_snapshot() {
    let mut h = harness(ranked_store(), GameMode::Rounds, false);

    h.engine.handle(ServerEvent::MapBegin { map: generate_map(2) }).await;
    h.engine.handle(finish(&generate_player(1), 30_000, GameMode::Rounds)).await;

    assert_eq!(h.store.scores().len(), 1);
    assert!(h.engine.live().is_empty());

    let snapshot_player = |id: i32, points: i32| ScoreSnapshotPlayer {
        login: format!("player{}", id),
        nickname: format!("Player{}", id),
        best_race_time: None,
        map_points: Some(points)
    };
    h.engine
        .handle(ServerEvent::ScoresSnapshot {
            section: "EndRound".to_string(),
            players: vec![snapshot_player(1, 5), snapshot_player(2, 10), snapshot_player(3, -1)]
        })
        .await;

    let live: Vec<(&str, i32)> = h.engine.live().entries().map(|e| (e.login.as_str(), e.score)).collect();
    assert_eq!(live, vec![("player2", 10), ("player1", 5)]);
}

#[tokio::test]
async fn test_unsupported_mode_clears_live_rankings() {
    let mut h = harness(ranked_store(), GameMode::TimeAttack, false);

    h.engine.handle(finish(&generate_player(1), 30_000, GameMode::TimeAttack)).await;
    assert_eq!(h.engine.live().len(), 1);

    h.engine
        .handle(ServerEvent::ModeChanged {
            mode: GameMode::from_script("Custom/Chase.Script.txt")
        })
        .await;

    assert!(h.engine.live().is_empty());
    let (snapshot, target) = h.renderer.renders().pop().unwrap();
    assert!(snapshot.entries.is_empty());
    assert!(target.is_none());
}

#[tokio::test]
async fn test_waypoint_refreshes_only_in_multi_lap_modes() {
    let mut h = harness(ranked_store(), GameMode::TimeAttack, false);
    let p1 = generate_player(1);

    h.engine
        .handle(ServerEvent::Waypoint {
            player: p1.clone(),
            race_time: 12_000,
            mode: GameMode::TimeAttack
        })
        .await;
    assert_eq!(h.renderer.count(), 0);

    h.engine
        .handle(ServerEvent::Waypoint {
            player: p1.clone(),
            race_time: 12_000,
            mode: GameMode::Laps
        })
        .await;

    let renders = h.renderer.renders();
    assert_eq!(renders.len(), 1);
    assert_eq!(renders[0].1, Some(p1));
    assert_eq!(h.engine.live().mode(), &GameMode::TimeAttack);
}

#[tokio::test]
async fn test_events_from_other_modes_leave_live_rankings_alone() {
    let mut h = harness(ranked_store(), GameMode::TimeAttack, false);
    let (p1, p2) = (generate_player(1), generate_player(2));

    h.engine.handle(ServerEvent::MapBegin { map: generate_map(1) }).await;
    h.engine.handle(finish(&p1, 30_000, GameMode::TimeAttack)).await;
    let renders = h.renderer.count();

    h.engine.handle(finish(&p2, 25_000, GameMode::Rounds)).await;
    h.engine
        .handle(ServerEvent::Waypoint {
            player: p2.clone(),
            race_time: 12_000,
            mode: GameMode::Rounds
        })
        .await;

    let live: Vec<(&str, i32)> = h.engine.live().entries().map(|e| (e.login.as_str(), e.score)).collect();
    assert_eq!(live, vec![("player1", 30_000)]);
    assert_eq!(h.engine.live().mode(), &GameMode::TimeAttack);
    assert_eq!(h.renderer.count(), renders);

    // The finish itself is still logged
    assert_eq!(h.store.scores().len(), 2);
}

#[tokio::test]
async fn test_player_connect_renders_for_that_player() {
    let mut h = harness(ranked_store(), GameMode::TimeAttack, false);
    let (p1, p2) = (generate_player(1), generate_player(2));

    h.engine.handle(ServerEvent::PlayerConnect { player: p1.clone() }).await;
    h.engine.handle(ServerEvent::PlayerConnect { player: p2.clone() }).await;

    assert_eq!(h.renderer.renders()[0].1, Some(p1.clone()));
    assert_eq!(h.engine.connected_players().count(), 2);

    h.engine.handle(ServerEvent::PlayerDisconnect { player: p1 }).await;

    let connected: Vec<&Player> = h.engine.connected_players().collect();
    assert_eq!(connected, vec![&p2]);
}

#[tokio::test]
async fn test_map_end_recomputes_and_announces() {
    let mut h = harness(ranked_store(), GameMode::TimeAttack, true);

    for id in [1, 2, 9] {
        h.engine
            .handle(ServerEvent::PlayerConnect {
                player: generate_player(id)
            })
            .await;
    }

    h.engine.handle(ServerEvent::MapEnd { map: generate_map(4) }).await;
    h.engine.drain_background().await;

    assert_eq!(h.table.snapshot().len(), 3);
    assert_eq!(h.store.saved_ranks().len(), 3);

    assert_eq!(
        h.chat.messages(),
        vec![
            (
                "player1".to_string(),
                "Your server rank is 1/3, average: 1.00".to_string()
            ),
            (
                "player2".to_string(),
                "Your server rank is 2/3, average: 2.00".to_string()
            ),
            (
                "player9".to_string(),
                "You do not have a server rank yet.".to_string()
            ),
        ]
    );
}

#[tokio::test]
async fn test_map_end_without_announcement() {
    let mut h = harness(ranked_store(), GameMode::TimeAttack, false);

    h.engine
        .handle(ServerEvent::PlayerConnect {
            player: generate_player(1)
        })
        .await;
    h.engine.handle(ServerEvent::MapEnd { map: generate_map(1) }).await;
    h.engine.drain_background().await;

    assert_eq!(h.table.snapshot().len(), 3);
    assert!(h.chat.messages().is_empty());
}

#[tokio::test]
async fn test_failed_recomputation_keeps_previous_table() {
    let mut h = harness(ranked_store(), GameMode::TimeAttack, false);

    h.engine.handle(ServerEvent::MapEnd { map: generate_map(1) }).await;
    h.engine.drain_background().await;
    let before = h.table.snapshot();

    h.store.set_unavailable(true);
    h.engine.handle(ServerEvent::MapEnd { map: generate_map(2) }).await;
    h.engine.drain_background().await;

    assert!(Arc::ptr_eq(&before, &h.table.snapshot()));
}

#[tokio::test]
async fn test_commands() {
    let mut h = harness(ranked_store(), GameMode::TimeAttack, false);
    let p2 = generate_player(2);

    h.engine.handle(ServerEvent::MapEnd { map: generate_map(1) }).await;
    h.engine.drain_background().await;

    match h.engine.execute(Command::Rank, &p2).await {
        CommandResponse::Rank(RankLookup::Ranked(rank)) => assert_eq!(rank.position, 2),
        other => panic!("expected a rank, got {:?}", other)
    }

    // 1.0 average difference over 4 maps
    match h.engine.execute(Command::NextRank, &p2).await {
        CommandResponse::NextRank(NextRankLookup::Found(better)) => {
            assert_eq!(better.player_id, 1);
            assert_eq!(better.rank_point_gap, 4);
        }
        other => panic!("expected a better player, got {:?}", other)
    }

    match h.engine.execute(Command::TopRanks, &p2).await {
        CommandResponse::TopRanks(top) => assert_eq!(top.len(), 3),
        other => panic!("expected top ranks, got {:?}", other)
    }

    match h.engine.execute(Command::TopSums, &p2).await {
        CommandResponse::TopSums(sums) => {
            assert_eq!(sums[0].player_id, 1);
            assert_eq!(sums[0].first, 4);
        }
        other => panic!("expected top sums, got {:?}", other)
    }

    assert_eq!(
        h.engine.execute(Command::ScoreProgression, &p2).await,
        CommandResponse::Unavailable("No map is being played.".to_string())
    );

    h.engine.handle(ServerEvent::MapBegin { map: generate_map(3) }).await;
    h.engine.handle(finish(&p2, 40_000, GameMode::TimeAttack)).await;
    h.engine.handle(finish(&p2, 39_000, GameMode::TimeAttack)).await;

    match h.engine.execute(Command::ScoreProgression, &p2).await {
        CommandResponse::ScoreProgression(scores) => {
            let times: Vec<i32> = scores.iter().map(|s| s.score).collect();
            assert_eq!(times, vec![40_000, 39_000]);
        }
        other => panic!("expected a score progression, got {:?}", other)
    }
}

#[tokio::test]
async fn test_run_consumes_events_until_closed() {
    let h = harness(ranked_store(), GameMode::TimeAttack, false);
    let (tx, rx) = mpsc::channel(8);

    let engine = tokio::spawn(h.engine.run(rx));

    tx.send(ServerEvent::MapBegin { map: generate_map(1) }).await.unwrap();
    tx.send(finish(&generate_player(3), 29_000, GameMode::TimeAttack))
        .await
        .unwrap();
    tx.send(ServerEvent::MapEnd { map: generate_map(1) }).await.unwrap();
    drop(tx);

    engine.await.unwrap();

    assert_eq!(h.store.scores().len(), 1);
    assert_eq!(h.store.saved_ranks().len(), 3);
    assert_eq!(h.table.snapshot().len(), 3);
}
