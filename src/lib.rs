pub mod commands;
pub mod constants;
pub mod database;
pub mod engine;
pub mod error;
pub mod model;
pub mod render;
pub mod settings;
pub mod utils;
