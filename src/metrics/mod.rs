//! Prometheus metrics

pub mod collector;

pub use collector::MetricsCollector;
