use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    constants::NO_SCORE,
    database::db_structs::Player,
    model::structures::game_mode::{GameMode, ScoringRule, SortDirection}
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveRankEntry {
    pub login: String,
    pub nickname: String,
    pub score: i32
}

/// A player's line of an authoritative scores snapshot pushed by the game server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSnapshotPlayer {
    pub login: String,
    pub nickname: String,
    pub best_race_time: Option<i32>,
    pub map_points: Option<i32>
}

/// What the render path receives after each mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSnapshot {
    pub mode: GameMode,
    pub rule: Option<ScoringRule>,
    pub entries: Vec<LiveRankEntry>
}

impl LiveSnapshot {
    pub fn format_times(&self) -> bool {
        self.rule.is_some_and(|r| r.is_time())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveUpdate {
    /// Entries changed and are sorted again
    Changed,
    /// The event did not affect the ranking
    Unchanged,
    /// The active mode has no scoring rule; the leaderboard was emptied
    UnsupportedMode(GameMode)
}

impl LiveUpdate {
    pub fn needs_render(&self) -> bool {
        !matches!(self, LiveUpdate::Unchanged)
    }
}

/// Session-scoped ranking of the players on the current map.
///
/// Keyed by login, sorted under the active mode's [`ScoringRule`] after every
/// mutation. Sorting is stable, so equal scores keep their insertion order.
#[derive(Debug, Default)]
pub struct LiveLeaderboard {
    mode: GameMode,
    entries: IndexMap<String, LiveRankEntry>
}

impl LiveLeaderboard {
    pub fn new(mode: GameMode) -> Self {
        LiveLeaderboard {
            mode,
            entries: IndexMap::new()
        }
    }

    pub fn mode(&self) -> &GameMode {
        &self.mode
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, login: &str) -> Option<&LiveRankEntry> {
        self.entries.get(login)
    }

    pub fn entries(&self) -> impl Iterator<Item = &LiveRankEntry> {
        self.entries.values()
    }

    pub fn snapshot(&self) -> LiveSnapshot {
        LiveSnapshot {
            mode: self.mode.clone(),
            rule: self.mode.scoring_rule(),
            entries: self.entries.values().cloned().collect()
        }
    }

    /// Switches the active mode. Scores kept under a different rule are not
    /// comparable, so a rule change empties the leaderboard.
    pub fn set_mode(&mut self, mode: GameMode) -> LiveUpdate {
        if mode == self.mode {
            return LiveUpdate::Unchanged;
        }

        let rule_changed = mode.scoring_rule() != self.mode.scoring_rule();
        debug!("Live rankings mode {:?} -> {:?}", self.mode, mode);
        self.mode = mode;

        match self.mode.scoring_rule() {
            None => self.unsupported(),
            Some(_) if rule_changed && !self.entries.is_empty() => {
                self.entries.clear();
                LiveUpdate::Changed
            }
            Some(_) => LiveUpdate::Unchanged
        }
    }

    /// A new map starts with an empty leaderboard
    pub fn map_begin(&mut self) -> LiveUpdate {
        self.entries.clear();
        LiveUpdate::Changed
    }

    /// Applies a finish. Only best-time modes rank individual finishes; a
    /// player's entry is created on their first valid time and replaced only
    /// by a strictly better one.
    pub fn on_finish(&mut self, player: &Player, race_time: i32) -> LiveUpdate {
        match self.mode.scoring_rule() {
            None => self.unsupported(),
            Some(ScoringRule::MapPoints) => LiveUpdate::Unchanged,
            Some(ScoringRule::BestTime) => {
                if race_time <= 0 {
                    return LiveUpdate::Unchanged;
                }

                match self.entries.get_mut(&player.login) {
                    Some(entry) if race_time < entry.score => {
                        entry.score = race_time;
                        entry.nickname = player.nickname.clone();
                    }
                    Some(_) => return LiveUpdate::Unchanged,
                    None => {
                        self.entries.insert(
                            player.login.clone(),
                            LiveRankEntry {
                                login: player.login.clone(),
                                nickname: player.nickname.clone(),
                                score: race_time
                            }
                        );
                    }
                }

                self.sort(ScoringRule::BestTime);
                LiveUpdate::Changed
            }
        }
    }

    /// Replaces every entry from an authoritative scores snapshot, reading
    /// the field the active rule ranks by. Players without a score are left out.
    pub fn on_scores(&mut self, players: &[ScoreSnapshotPlayer]) -> LiveUpdate {
        let Some(rule) = self.mode.scoring_rule() else {
            return self.unsupported();
        };

        self.entries = players
            .iter()
            .filter_map(|p| {
                let score = match rule {
                    ScoringRule::BestTime => p.best_race_time,
                    ScoringRule::MapPoints => p.map_points
                }
                .filter(|score| *score != NO_SCORE)?;

                Some((
                    p.login.clone(),
                    LiveRankEntry {
                        login: p.login.clone(),
                        nickname: p.nickname.clone(),
                        score
                    }
                ))
            })
            .collect();

        self.sort(rule);
        LiveUpdate::Changed
    }

    fn unsupported(&mut self) -> LiveUpdate {
        self.entries.clear();
        LiveUpdate::UnsupportedMode(self.mode.clone())
    }

    fn sort(&mut self, rule: ScoringRule) {
        match rule.direction() {
            SortDirection::Ascending => self.entries.sort_by(|_, a, _, b| a.score.cmp(&b.score)),
            SortDirection::Descending => self.entries.sort_by(|_, a, _, b| b.score.cmp(&a.score))
        }
    }
}
