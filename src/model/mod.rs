pub mod live_rankings;
pub mod rank_calculator;
pub mod rank_query;
pub mod rank_table;
pub mod single_flight;
pub mod store;
pub mod structures;
