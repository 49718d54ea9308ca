use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

/// Game mode the server is running, derived from the mode script name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize, EnumIter)]
pub enum GameMode {
    TimeAttack,
    Rounds,
    Team,
    Laps,
    Other(String),
    #[default]
    Unknown
}

/// How live scores are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
pub enum ScoringRule {
    /// Best race time this map, lower is better
    BestTime,
    /// Cumulative map points, higher is better
    MapPoints
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending
}

impl GameMode {
    /// Maps a script name such as `Trackmania/TM_TimeAttack_Online.Script.txt`
    /// to a mode. Unrecognised scripts keep their name in [`GameMode::Other`].
    pub fn from_script(script: &str) -> GameMode {
        if script.contains("TimeAttack") {
            GameMode::TimeAttack
        } else if script.contains("Rounds") {
            GameMode::Rounds
        } else if script.contains("Team") {
            GameMode::Team
        } else if script.contains("Laps") {
            GameMode::Laps
        } else if script.trim().is_empty() {
            GameMode::Unknown
        } else {
            GameMode::Other(script.to_string())
        }
    }

    /// The rule live scores are ranked by, or `None` when the mode has no
    /// live ranking
    pub fn scoring_rule(&self) -> Option<ScoringRule> {
        match self {
            GameMode::TimeAttack => Some(ScoringRule::BestTime),
            GameMode::Rounds | GameMode::Team => Some(ScoringRule::MapPoints),
            GameMode::Laps | GameMode::Other(_) | GameMode::Unknown => None
        }
    }

    /// Whether single finishes rank on the live leaderboard
    pub fn is_best_time(&self) -> bool {
        self.scoring_rule() == Some(ScoringRule::BestTime)
    }

    /// Whether waypoints can complete a lap, which warrants a display refresh
    pub fn is_multi_lap(&self) -> bool {
        matches!(self, GameMode::Laps)
    }
}

impl ScoringRule {
    pub fn direction(&self) -> SortDirection {
        match self {
            ScoringRule::BestTime => SortDirection::Ascending,
            ScoringRule::MapPoints => SortDirection::Descending
        }
    }

    /// Whether scores are race times and should be displayed as such
    pub fn is_time(&self) -> bool {
        matches!(self, ScoringRule::BestTime)
    }
}
