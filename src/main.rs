use std::{process, sync::Arc};

use clap::Parser;
use server_ranks::{
    commands::CommandResponse,
    database::db::DbClient,
    engine::{EngineServices, RankingEngine, ServerEvent},
    model::{
        rank_calculator::RankCalculator, rank_query::RankQueryService, rank_table::RankTable,
        structures::game_mode::GameMode
    },
    render::{TracingChat, TracingRenderer},
    settings::{RankingSettings, StaticSettings}
};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::args::Args;

mod args;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let args = Args::parse();

    init_tracing(&args.log_level);

    let Some(connection_string) = args.connection_string.as_deref() else {
        error!("CONNECTION_STRING environment variable must be set");
        process::exit(1);
    };

    let client = match DbClient::connect(connection_string).await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            error!("Application cannot start without a valid database connection");
            process::exit(1);
        }
    };

    let mut settings = RankingSettings::from_env();
    if let Some(min_records) = args.min_records_required {
        settings.min_records_required = min_records;
    }
    if let Some(max_rank) = args.max_record_rank {
        settings.max_record_rank = max_rank;
    }
    let settings = Arc::new(StaticSettings(settings));

    let table = Arc::new(RankTable::new());
    let calculator = Arc::new(
        RankCalculator::new(client.clone(), client.clone(), settings.clone(), table.clone())
            .with_repository(client.clone())
            .with_progress(true)
    );

    if let Err(e) = calculator.restore().await {
        warn!("Could not restore persisted ranks: {}", e);
    }

    match calculator.recompute().await {
        Ok(summary) => info!(
            "Ranked {} players across {} maps",
            summary.ranked_players, summary.server_maps
        ),
        Err(e) => {
            error!("Rank recomputation failed: {}", e);
            process::exit(1);
        }
    }

    let queries = Arc::new(RankQueryService::new(table).with_top_sums(client.clone()));

    println!("{}", CommandResponse::TopRanks(queries.get_top_ranks(args.top)));

    if let Some(player_id) = args.player {
        println!("{}", CommandResponse::Rank(queries.get_player_rank(player_id)));
        println!("{}", CommandResponse::NextRank(queries.get_next_better_player(player_id)));
    }

    if let Some(path) = &args.events {
        let services = EngineServices {
            calculator,
            queries,
            score_log: client.clone(),
            settings,
            renderer: Arc::new(TracingRenderer),
            chat: Arc::new(TracingChat)
        };

        if let Err(e) = replay_events(services, path).await {
            error!("Failed to replay events from {}: {}", path.display(), e);
            process::exit(1);
        }
    }
}

fn init_tracing(log_level: &str) {
    let indicatif_layer = IndicatifLayer::new();
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .init();
}

/// Feeds a JSON lines file of [`ServerEvent`]s through a ranking engine
async fn replay_events(services: EngineServices, path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    let contents = tokio::fs::read_to_string(path).await?;

    let (tx, rx) = mpsc::channel(64);
    let engine = tokio::spawn(RankingEngine::new(services, GameMode::default()).run(rx));

    for (line_number, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<ServerEvent>(line) {
            Ok(event) => tx.send(event).await?,
            Err(e) => warn!("Skipping line {}: {}", line_number + 1, e)
        }
    }

    drop(tx);
    engine.await?;

    Ok(())
}
