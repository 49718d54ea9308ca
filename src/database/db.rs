use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use itertools::Itertools;
use postgres_types::ToSql;
use tokio_postgres::{Client, Error, NoTls, Row};
use tracing::{debug, error, info};

use super::db_structs::{
    FinishRecord, LocalRecord, Map, MapId, PersistedRanks, Player, PlayerId, PlayerRankEntry, TopSum
};
use crate::{
    error::StoreError,
    model::store::{MapRoster, RankRepository, RecordStore, ScoreLog, TopSumsProvider}
};

#[derive(Clone)]
pub struct DbClient {
    client: Arc<Client>
}

impl DbClient {
    // Connect to the database and return a DbClient instance
    pub async fn connect(connection_str: &str) -> Result<Self, Error> {
        let (client, connection) = tokio_postgres::connect(connection_str, NoTls).await?;

        // Spawn the connection object to run in the background
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("connection error: {}", e);
            }
        });

        Ok(DbClient {
            client: Arc::new(client)
        })
    }

    fn player_from_row(row: &Row) -> Result<Player, Error> {
        Ok(Player {
            id: row.try_get("player_id")?,
            login: row.try_get("login")?,
            nickname: row.try_get("nickname")?
        })
    }

    fn map_from_row(row: &Row) -> Result<Map, Error> {
        Ok(Map {
            id: row.try_get("id")?,
            uid: row.try_get("uid")?,
            name: row.try_get("name")?
        })
    }

    fn record_from_row(row: &Row) -> Result<LocalRecord, Error> {
        Ok(LocalRecord {
            player_id: row.try_get("player_id")?,
            map_id: row.try_get("map_id")?,
            score: row.try_get("score")?
        })
    }

    fn score_from_row(row: &Row) -> Result<FinishRecord, Error> {
        Ok(FinishRecord {
            player_id: row.try_get("player_id")?,
            map_id: row.try_get("map_id")?,
            score: row.try_get("score")?,
            checkpoints: FinishRecord::parse_checkpoints(row.try_get("checkpoints")?),
            created_at: row.try_get("created_at")?
        })
    }

    /// Builds the statement that swaps the rank table contents and the map
    /// count they belong to. Values are integers only, so they are embedded directly.
    fn replace_ranks_sql(entries: &[PlayerRankEntry], server_map_count: usize) -> String {
        let mut sql = String::from("BEGIN;\nDELETE FROM ranks;\nDELETE FROM rank_meta;\n");
        sql += &format!("INSERT INTO rank_meta (id, server_maps) VALUES (1, {});\n", server_map_count);

        if !entries.is_empty() {
            let values = entries
                .iter()
                .map(|e| format!("({}, {})", e.player_id, e.average))
                .join(", ");
            sql += &format!("INSERT INTO ranks (player_id, average) VALUES {};\n", values);
        }

        sql += "COMMIT;";
        sql
    }

    // Access the underlying Client
    pub fn client(&self) -> Arc<Client> {
        Arc::clone(&self.client)
    }
}

#[async_trait]
impl RecordStore for DbClient {
    async fn record_count_by_player(&self, maps: &[MapId]) -> Result<HashMap<PlayerId, i64>, StoreError> {
        let rows = self
            .client
            .query(
                "SELECT player_id, COUNT(id) AS record_count FROM local_records \
                WHERE map_id = ANY($1) GROUP BY player_id",
                &[&maps]
            )
            .await?;

        let mut counts = HashMap::with_capacity(rows.len());
        for row in rows {
            counts.insert(row.try_get("player_id")?, row.try_get("record_count")?);
        }

        debug!("Fetched record counts for {} players", counts.len());
        Ok(counts)
    }

    async fn leaderboard(&self, map: MapId, limit: u32) -> Result<Vec<LocalRecord>, StoreError> {
        let limit = limit as i64;
        let rows = self
            .client
            .query(
                "SELECT player_id, map_id, score FROM local_records \
                WHERE map_id = $1 ORDER BY score ASC, id ASC LIMIT $2",
                &[&map, &limit]
            )
            .await?;

        rows.iter()
            .map(|row| Self::record_from_row(row).map_err(StoreError::from))
            .collect()
    }

    async fn players(&self, ids: &[PlayerId]) -> Result<Vec<Player>, StoreError> {
        let rows = self
            .client
            .query(
                "SELECT id AS player_id, login, nickname FROM players WHERE id = ANY($1) ORDER BY id",
                &[&ids]
            )
            .await?;

        rows.iter()
            .map(|row| Self::player_from_row(row).map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl MapRoster for DbClient {
    async fn maps(&self) -> Result<Vec<Map>, StoreError> {
        let rows = self.client.query("SELECT id, uid, name FROM maps ORDER BY id", &[]).await?;

        rows.iter()
            .map(|row| Self::map_from_row(row).map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl RankRepository for DbClient {
    async fn save_ranks(&self, entries: &[PlayerRankEntry], server_map_count: usize) -> Result<(), StoreError> {
        let sql = Self::replace_ranks_sql(entries, server_map_count);

        if let Err(e) = self.client.batch_execute(sql.as_str()).await {
            error!("Failed to replace the ranks table, rolling back: {}", e);
            if let Err(rollback) = self.client.batch_execute("ROLLBACK;").await {
                error!("Rollback failed: {}", rollback);
            }
            return Err(e.into());
        }

        info!("Replaced the ranks table with {} entries", entries.len());
        Ok(())
    }

    async fn load_ranks(&self) -> Result<PersistedRanks, StoreError> {
        let server_map_count = self
            .client
            .query_opt("SELECT server_maps FROM rank_meta WHERE id = 1", &[])
            .await?
            .map(|row| row.try_get::<_, i32>("server_maps"))
            .transpose()?
            .map(|count| count.max(0) as usize);

        let rows = self
            .client
            .query(
                "SELECT r.player_id, r.average, p.login, p.nickname FROM ranks r \
                JOIN players p ON p.id = r.player_id ORDER BY r.average ASC, r.id ASC",
                &[]
            )
            .await?;

        let mut ranks = Vec::with_capacity(rows.len());
        for row in rows {
            let entry = PlayerRankEntry {
                player_id: row.try_get("player_id")?,
                average: row.try_get("average")?
            };
            ranks.push((entry, Self::player_from_row(&row)?));
        }

        Ok(PersistedRanks { server_map_count, ranks })
    }
}

#[async_trait]
impl ScoreLog for DbClient {
    async fn save_score(&self, record: &FinishRecord) -> Result<(), StoreError> {
        let checkpoints = record.checkpoints_column();
        let values: &[&(dyn ToSql + Sync)] = &[
            &record.player_id,
            &record.map_id,
            &record.score,
            &checkpoints,
            &record.created_at
        ];

        self.client
            .execute(
                "INSERT INTO scores (player_id, map_id, score, checkpoints, created_at) \
                VALUES ($1, $2, $3, $4, $5)",
                values
            )
            .await?;

        Ok(())
    }

    async fn score_progression(&self, player: PlayerId, map: MapId) -> Result<Vec<FinishRecord>, StoreError> {
        let rows = self
            .client
            .query(
                "SELECT player_id, map_id, score, checkpoints, created_at FROM scores \
                WHERE player_id = $1 AND map_id = $2 ORDER BY created_at ASC, id ASC",
                &[&player, &map]
            )
            .await?;

        rows.iter()
            .map(|row| Self::score_from_row(row).map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl TopSumsProvider for DbClient {
    async fn top_sums(&self, limit: usize) -> Result<Vec<TopSum>, StoreError> {
        let limit = limit as i64;
        let rows = self
            .client
            .query(
                "WITH placed AS ( \
                    SELECT player_id, ROW_NUMBER() OVER (PARTITION BY map_id ORDER BY score ASC, id ASC) AS position \
                    FROM local_records \
                ) \
                SELECT p.id AS player_id, p.nickname, \
                    COUNT(*) FILTER (WHERE pl.position = 1) AS first_places, \
                    COUNT(*) FILTER (WHERE pl.position = 2) AS second_places, \
                    COUNT(*) FILTER (WHERE pl.position = 3) AS third_places \
                FROM placed pl JOIN players p ON p.id = pl.player_id \
                WHERE pl.position <= 3 \
                GROUP BY p.id, p.nickname \
                ORDER BY first_places DESC, second_places DESC, third_places DESC, p.id ASC \
                LIMIT $1",
                &[&limit]
            )
            .await?;

        let mut sums = Vec::with_capacity(rows.len());
        for row in rows {
            sums.push(TopSum {
                player_id: row.try_get("player_id")?,
                nickname: row.try_get("nickname")?,
                first: row.try_get("first_places")?,
                second: row.try_get("second_places")?,
                third: row.try_get("third_places")?
            });
        }

        Ok(sums)
    }
}
