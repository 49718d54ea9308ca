//! Hooks towards the presentation layer. Drawing widgets and delivering chat
//! happens elsewhere; these traits are what the ranking core calls.

use async_trait::async_trait;
use itertools::Itertools;
use tracing::info;

use crate::{
    database::db_structs::Player,
    model::live_rankings::{LiveRankEntry, LiveSnapshot},
    utils::times::format_race_time
};

/// Called after every live leaderboard mutation and when a player connects.
/// `target` is set when only one player's display needs refreshing.
pub trait LiveRankingsRenderer: Send + Sync {
    fn render(&self, snapshot: &LiveSnapshot, target: Option<&Player>);
}

#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn send(&self, player: &Player, message: &str);
}

/// `"1. Nick 0:42.123"` style line for a live entry
pub fn live_entry_line(position: usize, entry: &LiveRankEntry, format_times: bool) -> String {
    let score = if format_times {
        format_race_time(entry.score)
    } else {
        entry.score.to_string()
    };

    format!("{}. {} {}", position, entry.nickname, score)
}

/// Writes live rankings to the log, for running without a game server UI
pub struct TracingRenderer;

impl LiveRankingsRenderer for TracingRenderer {
    fn render(&self, snapshot: &LiveSnapshot, target: Option<&Player>) {
        let lines = snapshot
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| live_entry_line(i + 1, entry, snapshot.format_times()))
            .join(" | ");

        match target {
            Some(player) => info!("[LIVE] ({}) {:?}: {}", player.login, snapshot.mode, lines),
            None => info!("[LIVE] {:?}: {}", snapshot.mode, lines)
        }
    }
}

pub struct TracingChat;

#[async_trait]
impl ChatSink for TracingChat {
    async fn send(&self, player: &Player, message: &str) {
        info!("[CHAT] -> {}: {}", player.login, message);
    }
}
