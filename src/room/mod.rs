//! Room aggregates and lifecycle management

pub mod instance;
pub mod manager;

pub use instance::{Room, Seat};
pub use manager::RoomManager;
