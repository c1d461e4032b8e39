//! Hero selection sub-phase

pub mod coordinator;

pub use coordinator::HeroSelectionCoordinator;
