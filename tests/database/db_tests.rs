use chrono::{TimeZone, Utc};
use server_ranks::{
    database::{db::DbClient, db_structs::*},
    model::store::{MapRoster, RecordStore, ScoreLog, TopSumsProvider}
};
use serial_test::serial;

use super::test_helpers::TestDatabase;
use crate::common::init_test_env;

async fn seeded() -> (TestDatabase, DbClient) {
    init_test_env();
    let test_db = TestDatabase::new().await.expect("Failed to create test database");
    test_db.seed_test_data().await.expect("Failed to seed test data");

    let db_client = DbClient::connect(&test_db.connection_string)
        .await
        .expect("Failed to connect");

    (test_db, db_client)
}

#[tokio::test]
#[serial]
async fn test_get_maps() {
    let (_test_db, db_client) = seeded().await;

    let maps = db_client.maps().await.expect("Failed to fetch maps");

    assert_eq!(maps.len(), 4);
    assert_eq!(maps[0].uid, "uid-1");
    assert_eq!(maps[3].name, "Map 4");
}

#[tokio::test]
#[serial]
async fn test_record_count_by_player() {
    let (_test_db, db_client) = seeded().await;

    let counts = db_client
        .record_count_by_player(&[1, 2, 3, 4])
        .await
        .expect("Failed to count records");

    assert_eq!(counts.get(&1), Some(&4));
    assert_eq!(counts.get(&2), Some(&4));
    assert_eq!(counts.get(&3), Some(&2));
    assert_eq!(counts.get(&4), Some(&2));

    // Only maps on the server count
    let counts = db_client
        .record_count_by_player(&[3])
        .await
        .expect("Failed to count records");

    assert_eq!(counts.len(), 3);
    assert_eq!(counts.get(&3), None);
}

#[tokio::test]
#[serial]
async fn test_leaderboard_is_ordered_and_limited() {
    let (_test_db, db_client) = seeded().await;

    let leaderboard = db_client.leaderboard(2, 100).await.expect("Failed to fetch leaderboard");
    let order: Vec<PlayerId> = leaderboard.iter().map(|r| r.player_id).collect();
    assert_eq!(order, vec![1, 3, 2]);

    let leaderboard = db_client.leaderboard(1, 2).await.expect("Failed to fetch leaderboard");
    assert_eq!(leaderboard.len(), 2);
    assert_eq!(leaderboard[1].score, 11000);
}

#[tokio::test]
#[serial]
async fn test_get_players() {
    let (_test_db, db_client) = seeded().await;

    let players = db_client.players(&[3, 1]).await.expect("Failed to fetch players");

    assert_eq!(players.len(), 2);
    assert_eq!(players[0].login, "player1");
    assert_eq!(players[1].nickname, "Player3");
}

#[tokio::test]
#[serial]
async fn test_top_sums() {
    let (_test_db, db_client) = seeded().await;

    let sums = db_client.top_sums(100).await.expect("Failed to fetch top sums");
    let podiums: Vec<(PlayerId, i64, i64, i64)> =
        sums.iter().map(|s| (s.player_id, s.first, s.second, s.third)).collect();

    assert_eq!(podiums, vec![(1, 3, 1, 0), (2, 1, 2, 1), (3, 0, 1, 1), (4, 0, 0, 1)]);
    assert_eq!(sums[0].total(), 4);

    let sums = db_client.top_sums(2).await.expect("Failed to fetch top sums");
    assert_eq!(sums.len(), 2);
}

#[tokio::test]
#[serial]
async fn test_score_log() {
    let (_test_db, db_client) = seeded().await;

    for (score, hour) in [(45_000, 10), (43_500, 11)] {
        let record = FinishRecord {
            player_id: 2,
            map_id: 1,
            score,
            checkpoints: vec![10_000, 25_000, score],
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
        };
        db_client.save_score(&record).await.expect("Failed to save score");
    }

    let progression = db_client.score_progression(2, 1).await.expect("Failed to fetch progression");

    assert_eq!(progression.len(), 2);
    assert_eq!(progression[0].score, 45_000);
    assert_eq!(progression[1].score, 43_500);
    assert_eq!(progression[1].checkpoints, vec![10_000, 25_000, 43_500]);

    assert!(db_client.score_progression(1, 1).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn test_empty_database() {
    init_test_env();
    let test_db = TestDatabase::new().await.expect("Failed to create test database");

    let db_client = DbClient::connect(&test_db.connection_string)
        .await
        .expect("Failed to connect");

    assert!(db_client.maps().await.unwrap().is_empty());
    assert!(db_client.record_count_by_player(&[]).await.unwrap().is_empty());
    assert!(db_client.top_sums(100).await.unwrap().is_empty());
}
