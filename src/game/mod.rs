//! Round loop: phases, shops, and combat resolution

pub mod combat;
pub mod scheduler;

pub use combat::{pair_seats, BattleSimulator, StrengthSimulator};
pub use scheduler::PhaseScheduler;
