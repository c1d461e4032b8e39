//! Main application state and service coordination
//!
//! `AppState` wires the stores, managers, and gateway together, owns the
//! background tasks, and is the facade callers (transport adapters, the
//! simulator binary, tests) go through.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bot::BotProvisioner;
use crate::catalog::{HeroCatalog, MinionCatalog, StaticHeroCatalog, StaticMinionCatalog};
use crate::config::AppConfig;
use anyhow::Result;
use crate::game::{PhaseScheduler, StrengthSimulator};
use crate::metrics::MetricsCollector;
use crate::notify::{AmqpConnection, AmqpGateway, NotificationGateway, NullGateway};
use crate::queue::{QueueManager, QueueManagerStats};
use crate::room::{Room, RoomManager};
use crate::selection::HeroSelectionCoordinator;
use crate::storage::{InMemoryBotStore, InMemoryQueueStore, InMemoryRoomStore};
use crate::types::{PlayerId, QueueEntry, RoomId, RoomStatus};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("AMQP connection error: {message}")]
    AmqpConnection { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,
    rooms: Arc<RoomManager>,
    queue: Arc<QueueManager>,
    selection: Arc<HeroSelectionCoordinator>,
    scheduler: Arc<PhaseScheduler>,
    metrics: Arc<MetricsCollector>,
    background_tasks: Vec<JoinHandle<()>>,
    is_running: Arc<RwLock<bool>>,
}

impl AppState {
    /// Initialize against the AMQP broker from configuration
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing arena-lobby service");
        info!(
            "Configuration: service={}, amqp_url={}",
            config.service.name, config.amqp.url
        );

        let connection = AmqpConnection::connect(&config.amqp).await.map_err(|e| {
            ServiceError::AmqpConnection {
                message: format!("Failed to connect to AMQP: {}", e),
            }
        })?;
        let channel = connection
            .open_channel()
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to open AMQP channel: {}", e),
            })?;
        let gateway: Arc<dyn NotificationGateway> = Arc::new(
            AmqpGateway::new(channel, config.amqp.exchange_name.clone())
                .await
                .map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to initialize event gateway: {}", e),
                })?,
        );

        Self::with_gateway(config, gateway)
    }

    /// Initialize without a broker; events are dropped. Used by the
    /// simulator binary and tests.
    pub fn standalone(config: AppConfig) -> Result<Self, ServiceError> {
        Self::with_gateway(config, Arc::new(NullGateway))
    }

    /// Wire all components over the given gateway
    pub fn with_gateway(
        config: AppConfig,
        gateway: Arc<dyn NotificationGateway>,
    ) -> Result<Self, ServiceError> {
        let metrics =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let hero_catalog: Arc<dyn HeroCatalog> = Arc::new(StaticHeroCatalog::new());
        let minion_catalog: Arc<dyn MinionCatalog> = Arc::new(StaticMinionCatalog::new());

        let rooms = Arc::new(RoomManager::new(
            Arc::new(InMemoryRoomStore::new()),
            gateway.clone(),
            config.rules.clone(),
        ));
        let bots = Arc::new(BotProvisioner::new(
            Arc::new(InMemoryBotStore::new()),
            &config.rules,
            std::time::Duration::from_secs(config.matchmaking.bot_ttl_seconds),
        ));
        let scheduler = Arc::new(PhaseScheduler::new(
            rooms.clone(),
            minion_catalog,
            Arc::new(StrengthSimulator::new()),
            gateway.clone(),
            config.rules.clone(),
        ));
        let selection = Arc::new(HeroSelectionCoordinator::new(
            rooms.clone(),
            hero_catalog,
            scheduler.clone(),
            gateway.clone(),
            config.rules.clone(),
        ));
        let queue = Arc::new(QueueManager::new(
            Arc::new(InMemoryQueueStore::new()),
            rooms.clone(),
            bots,
            selection.clone(),
            gateway,
            config.matchmaking.clone(),
            config.rules.clone(),
        ));

        Ok(Self {
            config,
            rooms,
            queue,
            selection,
            scheduler,
            metrics,
            background_tasks: Vec::new(),
            is_running: Arc::new(RwLock::new(false)),
        })
    }

    /// Snapshot of the shared handles the health server needs
    pub fn health_state(&self) -> super::health::HealthServerState {
        super::health::HealthServerState {
            service_name: self.config.service.name.clone(),
            is_running: self.is_running.clone(),
            metrics: self.metrics.clone(),
            queue: self.queue.clone(),
            rooms: self.rooms.clone(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Start background tasks: matchmaking tick, queue/bot cleanup, the
    /// stale-room sweep, and the health server.
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting arena-lobby service");
        *self.is_running.write().await = true;

        self.background_tasks.push(super::health::spawn_health_server(
            self.health_state(),
            self.config.service.health_port,
        ));
        self.background_tasks
            .push(self.queue.start_tick_task(self.config.tick_interval()));
        self.background_tasks
            .push(self.queue.start_cleanup_task(self.config.cleanup_interval()));
        self.background_tasks.push(self.rooms.start_cleanup_task(
            std::time::Duration::from_secs(self.config.matchmaking.room_ttl_seconds),
            self.config.cleanup_interval(),
        ));
        self.background_tasks.push(self.start_metrics_refresh_task());

        info!(
            "Service started: tick every {:?}, cleanup every {:?}",
            self.config.tick_interval(),
            self.config.cleanup_interval()
        );
        Ok(())
    }

    /// Spawn the periodic gauge refresh from queue and room snapshots
    fn start_metrics_refresh_task(&self) -> JoinHandle<()> {
        let metrics = self.metrics.clone();
        let queue = self.queue.clone();
        let rooms = self.rooms.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(10));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let stats = queue.stats();
                let waiting = queue.waiting_count().await.unwrap_or(0);
                metrics.update_from_queue_stats(&stats, waiting);

                if let Ok(all) = rooms.list_rooms().await {
                    for status in [
                        RoomStatus::Waiting,
                        RoomStatus::Selecting,
                        RoomStatus::Playing,
                        RoomStatus::Finished,
                    ] {
                        let count = all.iter().filter(|r| r.status == status).count();
                        metrics
                            .room()
                            .active_rooms
                            .with_label_values(&[&status.to_string()])
                            .set(count as i64);
                    }
                }
            }
        })
    }

    /// Graceful shutdown: stop background tasks and report final stats
    pub async fn shutdown(&mut self) {
        info!("Starting graceful shutdown");
        *self.is_running.write().await = false;

        let task_count = self.background_tasks.len();
        for task in self.background_tasks.drain(..) {
            task.abort();
        }
        if task_count > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }

        let stats = self.queue.stats();
        info!(
            "Final statistics: {} queued, {} rooms formed ({} backfilled), {} bots",
            stats.players_queued, stats.rooms_formed, stats.rooms_backfilled,
            stats.bots_provisioned
        );
        info!("Shutdown complete");
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    pub fn queue_stats(&self) -> QueueManagerStats {
        self.queue.stats()
    }

    // Queue operations

    pub async fn enqueue(
        &self,
        player_id: PlayerId,
        display_name: String,
        rating: f64,
    ) -> Result<QueueEntry> {
        self.queue.enqueue(player_id, display_name, rating).await
    }

    pub async fn cancel_queue(&self, player_id: &str) -> Result<()> {
        self.queue.cancel(player_id).await
    }

    pub async fn waiting_count(&self) -> Result<usize> {
        self.queue.waiting_count().await
    }

    /// Run one matchmaking pass by hand (the tick task does this on a timer)
    pub async fn tick(&self) -> Result<Option<RoomId>> {
        let timer = self.metrics.start_timer();
        let result = self.queue.tick().await;
        if let Ok(formed) = &result {
            self.metrics.record_tick(formed.is_some(), timer.elapsed());
        }
        result
    }

    // Room operations

    pub async fn create_room(
        &self,
        name: String,
        host: PlayerId,
        display_name: String,
    ) -> Result<Room> {
        let room = self.rooms.create_room(name, host, display_name).await?;
        self.metrics.record_room_created();
        Ok(room)
    }

    pub async fn join_room(
        &self,
        room_id: &RoomId,
        player_id: PlayerId,
        display_name: String,
    ) -> Result<Room> {
        self.rooms.join_room(room_id, player_id, display_name).await
    }

    pub async fn leave_room(&self, room_id: &RoomId, player_id: &str) -> Result<()> {
        self.rooms.leave_room(room_id, player_id).await
    }

    pub async fn toggle_ready(&self, room_id: &RoomId, player_id: &str) -> Result<bool> {
        self.rooms.toggle_ready(room_id, player_id).await
    }

    /// Host starts a hosted room; moves it into hero selection
    pub async fn start_game(&self, room_id: &RoomId, requested_by: &str) -> Result<()> {
        self.rooms.start_game(room_id, requested_by).await?;
        self.selection.begin_selection(room_id).await
    }

    pub async fn get_room(&self, room_id: &RoomId) -> Result<Room> {
        self.rooms.get_room(room_id).await
    }

    pub async fn list_rooms(&self) -> Result<Vec<Room>> {
        self.rooms.list_rooms().await
    }

    pub async fn handle_disconnect(&self, player_id: &str) -> Result<()> {
        self.rooms.handle_disconnect(player_id).await
    }

    // In-game operations

    pub async fn confirm_hero(
        &self,
        room_id: &RoomId,
        seat_id: &str,
        hero_id: &str,
    ) -> Result<()> {
        self.selection.confirm_hero(room_id, seat_id, hero_id).await
    }

    pub async fn refresh_shop(&self, room_id: &RoomId, seat_id: &str) -> Result<Room> {
        self.scheduler.refresh_shop(room_id, seat_id).await
    }

    pub async fn buy_minion(
        &self,
        room_id: &RoomId,
        seat_id: &str,
        minion_id: &str,
    ) -> Result<Room> {
        self.scheduler.buy_minion(room_id, seat_id, minion_id).await
    }

    pub async fn play_minion(
        &self,
        room_id: &RoomId,
        seat_id: &str,
        minion_id: &str,
    ) -> Result<Room> {
        self.scheduler.play_minion(room_id, seat_id, minion_id).await
    }

    pub async fn sell_minion(
        &self,
        room_id: &RoomId,
        seat_id: &str,
        minion_id: &str,
    ) -> Result<Room> {
        self.scheduler.sell_minion(room_id, seat_id, minion_id).await
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        for task in &self.background_tasks {
            task.abort();
        }
        if !self.background_tasks.is_empty() {
            warn!("AppState dropped with live background tasks; aborted them");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AppState {
        let mut config = AppConfig::default();
        config.matchmaking.backfill_delay_seconds = 0;
        AppState::standalone(config).unwrap()
    }

    #[tokio::test]
    async fn test_standalone_wiring_end_to_end() {
        let app = state();

        app.enqueue("alice".to_string(), "Alice".to_string(), 1500.0)
            .await
            .unwrap();

        let room_id = app.tick().await.unwrap().expect("backfill should form");
        let room = app.get_room(&room_id).await.unwrap();
        assert_eq!(room.status, RoomStatus::Selecting);
        assert_eq!(room.seats.len(), 8);
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let mut app = state();
        app.start().await.unwrap();
        assert!(app.is_running().await);

        app.shutdown().await;
        assert!(!app.is_running().await);
    }
}
