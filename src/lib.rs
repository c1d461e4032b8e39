//! Arena Lobby - Match orchestration engine for an online auto-battler
//!
//! This crate provides the server-side lobby and match lifecycle: a rating-
//! bucketed matchmaking queue with bot backfill, room state machines, hero
//! selection with deadlines, and the round-phase scheduler that drives games
//! from preparation through combat to a winner.

pub mod bot;
pub mod catalog;
pub mod config;
pub mod error;
pub mod game;
pub mod metrics;
pub mod notify;
pub mod queue;
pub mod room;
pub mod selection;
pub mod service;
pub mod storage;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{LobbyError, Result};
pub use types::*;

// Re-export key components
pub use notify::NotificationGateway;
pub use queue::QueueManager;
pub use room::RoomManager;
pub use service::AppState;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
