//! Configuration management for the lobby service

pub mod app;
pub mod game;

pub use app::{validate_config, AppConfig};
pub use game::GameRules;
