// Ranking constants
pub const AVERAGE_SCALE: i64 = 10_000;
pub const DEFAULT_MIN_RECORDS_REQUIRED: u32 = 5;
pub const MIN_RECORDS_FLOOR: u32 = 3;
pub const DEFAULT_MAX_RECORD_RANK: u32 = 100;
pub const MAX_RECORD_RANK_FLOOR: u32 = 1;
// Command surface
pub const TOP_RANKS_LIMIT: usize = 100;
pub const TOP_SUMS_LIMIT: usize = 100;
// Score values the game server reports for "no score yet"
pub const NO_SCORE: i32 = -1;
