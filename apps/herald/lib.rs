pub mod config;
pub mod discord_api;
pub mod models;
pub mod rate_limiter;
pub mod store;
pub mod sync;
pub mod tally_api;
