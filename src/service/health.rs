//! Health check endpoints and service status reporting
//!
//! Serves liveness, readiness, Prometheus metrics, and a stats snapshot over
//! HTTP for orchestrators and dashboards.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::Result;
use crate::metrics::MetricsCollector;
use crate::queue::QueueManager;
use crate::room::RoomManager;
use crate::types::RoomStatus;

/// Health status of the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check result for one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Point-in-time service counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    pub players_waiting: usize,
    pub active_rooms: usize,
    pub rooms_formed: u64,
    pub rooms_backfilled: u64,
    pub bots_provisioned: u64,
    pub uptime_seconds: i64,
}

/// Overall health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub checks: Vec<ComponentCheck>,
    pub stats: ServiceStats,
}

/// Shared state for the health server
#[derive(Clone)]
pub struct HealthServerState {
    pub service_name: String,
    pub is_running: Arc<RwLock<bool>>,
    pub metrics: Arc<MetricsCollector>,
    pub queue: Arc<QueueManager>,
    pub rooms: Arc<RoomManager>,
    pub started_at: DateTime<Utc>,
}

impl HealthServerState {
    async fn stats(&self) -> ServiceStats {
        let queue_stats = self.queue.stats();
        let players_waiting = self.queue.waiting_count().await.unwrap_or(0);
        let active_rooms = self
            .rooms
            .list_rooms()
            .await
            .map(|rooms| {
                rooms
                    .iter()
                    .filter(|r| r.status != RoomStatus::Finished)
                    .count()
            })
            .unwrap_or(0);

        ServiceStats {
            players_waiting,
            active_rooms,
            rooms_formed: queue_stats.rooms_formed,
            rooms_backfilled: queue_stats.rooms_backfilled,
            bots_provisioned: queue_stats.bots_provisioned,
            uptime_seconds: (Utc::now() - self.started_at).num_seconds(),
        }
    }

    pub async fn check(&self) -> HealthCheck {
        let mut checks = Vec::new();

        let running = *self.is_running.read().await;
        checks.push(ComponentCheck {
            name: "service_running".to_string(),
            status: if running {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            message: (!running).then(|| "service is not running".to_string()),
        });

        checks.push(match self.queue.waiting_count().await {
            Ok(_) => ComponentCheck {
                name: "queue_store".to_string(),
                status: HealthStatus::Healthy,
                message: None,
            },
            Err(e) => ComponentCheck {
                name: "queue_store".to_string(),
                status: HealthStatus::Unhealthy,
                message: Some(e.to_string()),
            },
        });

        checks.push(match self.rooms.list_rooms().await {
            Ok(_) => ComponentCheck {
                name: "room_store".to_string(),
                status: HealthStatus::Healthy,
                message: None,
            },
            Err(e) => ComponentCheck {
                name: "room_store".to_string(),
                status: HealthStatus::Unhealthy,
                message: Some(e.to_string()),
            },
        });

        let status = if checks.iter().all(|c| c.status == HealthStatus::Healthy) {
            HealthStatus::Healthy
        } else if checks.iter().any(|c| c.status == HealthStatus::Unhealthy) {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Degraded
        };

        HealthCheck {
            status,
            service: self.service_name.clone(),
            version: crate::VERSION.to_string(),
            timestamp: Utc::now(),
            checks,
            stats: self.stats().await,
        }
    }
}

/// Build the health/metrics router
pub fn health_router(state: HealthServerState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/alive", get(alive_handler))
        .route("/metrics", get(metrics_handler))
        .route("/stats", get(stats_handler))
        .with_state(state)
}

/// Serve health endpoints until the task is aborted
pub async fn run_health_server(state: HealthServerState, port: u16) -> Result<()> {
    let app = health_router(state);
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Health server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Spawn the health server as a background task
pub fn spawn_health_server(state: HealthServerState, port: u16) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = run_health_server(state, port).await {
            error!("Health server failed: {}", e);
        }
    })
}

async fn root_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    Json(json!({
        "service": state.service_name,
        "version": crate::VERSION,
        "endpoints": ["/health", "/ready", "/alive", "/metrics", "/stats"],
    }))
}

async fn health_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    let check = state.check().await;
    let code = match check.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(check))
}

async fn ready_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    if *state.is_running.read().await {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn alive_handler() -> impl IntoResponse {
    (StatusCode::OK, "alive")
}

async fn metrics_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    let families = state.metrics.registry().gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    match encoder.encode(&families, &mut buffer) {
        Ok(()) => match String::from_utf8(buffer) {
            Ok(body) => (StatusCode::OK, body),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("metrics encoding produced invalid utf-8: {}", e),
            ),
        },
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {}", e),
        ),
    }
}

async fn stats_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    Json(state.stats().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::BotProvisioner;
    use crate::catalog::{StaticHeroCatalog, StaticMinionCatalog};
    use crate::config::{AppConfig, GameRules};
    use crate::game::{PhaseScheduler, StrengthSimulator};
    use crate::notify::NullGateway;
    use crate::selection::HeroSelectionCoordinator;
    use crate::storage::{InMemoryBotStore, InMemoryQueueStore, InMemoryRoomStore};
    use std::time::Duration;

    fn server_state(running: bool) -> HealthServerState {
        let config = AppConfig::default();
        let rules = GameRules::default();
        let gateway = Arc::new(NullGateway);

        let rooms = Arc::new(RoomManager::new(
            Arc::new(InMemoryRoomStore::new()),
            gateway.clone(),
            rules.clone(),
        ));
        let bots = Arc::new(BotProvisioner::new(
            Arc::new(InMemoryBotStore::new()),
            &rules,
            Duration::from_secs(3600),
        ));
        let scheduler = Arc::new(PhaseScheduler::new(
            rooms.clone(),
            Arc::new(StaticMinionCatalog::new()),
            Arc::new(StrengthSimulator::new()),
            gateway.clone(),
            rules.clone(),
        ));
        let selection = Arc::new(HeroSelectionCoordinator::new(
            rooms.clone(),
            Arc::new(StaticHeroCatalog::new()),
            scheduler,
            gateway.clone(),
            rules.clone(),
        ));
        let queue = Arc::new(QueueManager::new(
            Arc::new(InMemoryQueueStore::new()),
            rooms.clone(),
            bots,
            selection,
            gateway,
            config.matchmaking.clone(),
            rules,
        ));

        HealthServerState {
            service_name: "arena-lobby".to_string(),
            is_running: Arc::new(RwLock::new(running)),
            metrics: Arc::new(MetricsCollector::new().unwrap()),
            queue,
            rooms,
            started_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_healthy_when_running() {
        let state = server_state(true);
        let check = state.check().await;
        assert_eq!(check.status, HealthStatus::Healthy);
        assert_eq!(check.checks.len(), 3);
        assert!(check.checks.iter().all(|c| c.status == HealthStatus::Healthy));
    }

    #[tokio::test]
    async fn test_unhealthy_when_stopped() {
        let state = server_state(false);
        let check = state.check().await;
        assert_eq!(check.status, HealthStatus::Unhealthy);
        let running = check
            .checks
            .iter()
            .find(|c| c.name == "service_running")
            .unwrap();
        assert_eq!(running.status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_stats_snapshot() {
        let state = server_state(true);
        state
            .queue
            .enqueue("alice".to_string(), "Alice".to_string(), 1500.0)
            .await
            .unwrap();

        let stats = state.stats().await;
        assert_eq!(stats.players_waiting, 1);
        assert_eq!(stats.active_rooms, 0);
        assert!(stats.uptime_seconds >= 0);
    }

    #[test]
    fn test_health_status_serializes_lowercase() {
        let json = serde_json::to_string(&HealthStatus::Degraded).unwrap();
        assert_eq!(json, "\"degraded\"");
    }
}
