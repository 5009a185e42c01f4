pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod game_mode;
pub mod issuer;
pub mod lifecycle;
pub mod metrics;
pub mod rate_limit;
pub mod reaper;
pub mod redemption;
pub mod retry;
pub mod validator;
