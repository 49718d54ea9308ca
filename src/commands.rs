use std::fmt;

use strum_macros::{Display, EnumIter, EnumString};

use crate::{
    database::db_structs::{FinishRecord, TopSum},
    model::rank_query::{average_display, NextRankLookup, RankLookup, TopRank},
    utils::times::format_race_time
};

/// Chat commands served by the ranking core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Command {
    Rank,
    NextRank,
    TopRanks,
    TopSums,
    #[strum(to_string = "scoreprogression", serialize = "progression")]
    ScoreProgression
}

impl Command {
    /// Parses the command word of a chat line such as `/nextrank` or `TopRanks`.
    /// Arguments after the first word are ignored.
    pub fn parse(text: &str) -> Option<Command> {
        let word = text.trim().trim_start_matches('/').split_whitespace().next()?;
        word.parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResponse {
    Rank(RankLookup),
    NextRank(NextRankLookup),
    TopRanks(Vec<TopRank>),
    TopSums(Vec<TopSum>),
    ScoreProgression(Vec<FinishRecord>),
    /// The command could not be served right now
    Unavailable(String)
}

impl fmt::Display for CommandResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandResponse::Rank(RankLookup::Ranked(rank)) => write!(
                f,
                "Your server rank is {}/{}, average: {:.2}",
                rank.position,
                rank.total_ranked,
                average_display(rank.average)
            ),
            CommandResponse::Rank(RankLookup::Unranked) => write!(f, "You do not have a server rank yet."),
            CommandResponse::NextRank(NextRankLookup::Found(better)) => write!(
                f,
                "The next better ranked player is {}: {}, average: {:.2} [-{} RP]",
                better.nickname,
                better.position,
                average_display(better.average),
                better.rank_point_gap
            ),
            CommandResponse::NextRank(NextRankLookup::NoBetterPlayer) => {
                write!(f, "No better ranked player, you are the best on this server.")
            }
            CommandResponse::NextRank(NextRankLookup::Unranked) => {
                write!(f, "You need a server rank before looking for the next one.")
            }
            CommandResponse::TopRanks(top) if top.is_empty() => write!(f, "Nobody is ranked on this server yet."),
            CommandResponse::TopRanks(top) => {
                let lines: Vec<String> = top
                    .iter()
                    .map(|r| format!("{}. {} {:.2}", r.position, r.nickname, average_display(r.average)))
                    .collect();
                write!(f, "{}", lines.join("\n"))
            }
            CommandResponse::TopSums(sums) if sums.is_empty() => write!(f, "No local records on this server yet."),
            CommandResponse::TopSums(sums) => {
                let lines: Vec<String> = sums
                    .iter()
                    .enumerate()
                    .map(|(i, s)| {
                        format!(
                            "{}. {} {}/{}/{} ({})",
                            i + 1,
                            s.nickname,
                            s.first,
                            s.second,
                            s.third,
                            s.total()
                        )
                    })
                    .collect();
                write!(f, "{}", lines.join("\n"))
            }
            CommandResponse::ScoreProgression(scores) if scores.is_empty() => {
                write!(f, "No scores on this map yet.")
            }
            CommandResponse::ScoreProgression(scores) => {
                let lines: Vec<String> = scores
                    .iter()
                    .enumerate()
                    .map(|(i, s)| format!("#{} {}", i + 1, format_race_time(s.score)))
                    .collect();
                write!(f, "{}", lines.join("\n"))
            }
            CommandResponse::Unavailable(reason) => write!(f, "{}", reason)
        }
    }
}
