//! Matchmaking queue

pub mod manager;

pub use manager::{QueueManager, QueueManagerStats};
