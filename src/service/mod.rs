//! Service layer: application wiring, lifecycle, and health endpoints

pub mod app;
pub mod health;

pub use app::{AppState, ServiceError};
pub use health::{
    ComponentCheck, HealthCheck, HealthServerState, HealthStatus, ServiceStats,
};
