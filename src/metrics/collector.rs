//! Metrics collection using Prometheus
//!
//! Prometheus metrics for the lobby service: queue depth and wait times,
//! room population by status, bot provisioning, and operation latencies.

use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::queue::QueueManagerStats;

/// Main metrics collector for the lobby service
#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,
    queue_metrics: QueueMetrics,
    room_metrics: RoomMetrics,
    bot_metrics: BotMetrics,
    performance_metrics: PerformanceMetrics,
}

/// Matchmaking queue metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Total players that entered the queue
    pub players_queued_total: IntCounter,

    /// Total queue cancellations
    pub players_cancelled_total: IntCounter,

    /// Players currently waiting
    pub players_waiting: IntGauge,

    /// Time spent waiting before a match
    pub queue_wait_time_seconds: Histogram,
}

/// Room metrics
#[derive(Clone)]
pub struct RoomMetrics {
    /// Rooms currently alive, by status
    pub active_rooms: IntGaugeVec,

    /// Total rooms created, by origin (hosted/matchmade)
    pub rooms_created_total: IntCounterVec,

    /// Total rooms that reached `finished`
    pub games_finished_total: IntCounter,

    /// Rounds played per finished game
    pub rounds_per_game: Histogram,
}

/// Bot provisioning metrics
#[derive(Clone)]
pub struct BotMetrics {
    /// Live bot identities
    pub bots_active: IntGauge,

    /// Total bots provisioned
    pub bots_provisioned_total: IntCounter,

    /// Backfill formations, by outcome
    pub backfill_operations_total: IntCounterVec,
}

/// Operation latency metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Matchmaking tick duration
    pub tick_duration: Histogram,

    /// Combat resolution duration per room
    pub combat_duration: Histogram,

    /// Room operation durations, by operation
    pub room_operation_duration: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let queue_metrics = QueueMetrics::new(&registry)?;
        let room_metrics = RoomMetrics::new(&registry)?;
        let bot_metrics = BotMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            queue_metrics,
            room_metrics,
            bot_metrics,
            performance_metrics,
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    pub fn room(&self) -> &RoomMetrics {
        &self.room_metrics
    }

    pub fn bot(&self) -> &BotMetrics {
        &self.bot_metrics
    }

    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Refresh gauges from a queue stats snapshot
    pub fn update_from_queue_stats(&self, stats: &QueueManagerStats, waiting_now: usize) {
        self.queue_metrics
            .players_waiting
            .set(waiting_now as i64);
        self.bot_metrics
            .bots_provisioned_total
            .inc_by(stats.bots_provisioned.saturating_sub(
                self.bot_metrics.bots_provisioned_total.get(),
            ));
    }

    /// Record one matchmaking tick
    pub fn record_tick(&self, formed_room: bool, duration: Duration) {
        self.performance_metrics
            .tick_duration
            .observe(duration.as_secs_f64());
        if formed_room {
            self.room_metrics
                .rooms_created_total
                .with_label_values(&["matchmade"])
                .inc();
        }
    }

    /// Record a hosted room creation
    pub fn record_room_created(&self) {
        self.room_metrics
            .rooms_created_total
            .with_label_values(&["hosted"])
            .inc();
    }

    /// Record a finished game
    pub fn record_game_finished(&self, rounds: u32) {
        self.room_metrics.games_finished_total.inc();
        self.room_metrics.rounds_per_game.observe(rounds as f64);
    }

    /// Record a backfill formation attempt
    pub fn record_backfill(&self, success: bool) {
        let status = if success { "success" } else { "failed" };
        self.bot_metrics
            .backfill_operations_total
            .with_label_values(&[status])
            .inc();
    }

    /// Record a room operation duration
    pub fn record_room_operation(&self, operation: &str, duration: Duration) {
        self.performance_metrics
            .room_operation_duration
            .with_label_values(&[operation])
            .observe(duration.as_secs_f64());
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let players_queued_total = IntCounter::with_opts(Opts::new(
            "lobby_players_queued_total",
            "Total players that entered the matchmaking queue",
        ))?;
        registry.register(Box::new(players_queued_total.clone()))?;

        let players_cancelled_total = IntCounter::with_opts(Opts::new(
            "lobby_players_cancelled_total",
            "Total matchmaking queue cancellations",
        ))?;
        registry.register(Box::new(players_cancelled_total.clone()))?;

        let players_waiting = IntGauge::with_opts(Opts::new(
            "lobby_players_waiting",
            "Players currently waiting in the matchmaking queue",
        ))?;
        registry.register(Box::new(players_waiting.clone()))?;

        let queue_wait_time_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "lobby_queue_wait_time_seconds",
                "Time spent in queue before a match",
            )
            .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 300.0]),
        )?;
        registry.register(Box::new(queue_wait_time_seconds.clone()))?;

        Ok(Self {
            players_queued_total,
            players_cancelled_total,
            players_waiting,
            queue_wait_time_seconds,
        })
    }
}

impl RoomMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_rooms = IntGaugeVec::new(
            Opts::new("lobby_active_rooms", "Rooms currently alive by status"),
            &["status"],
        )?;
        registry.register(Box::new(active_rooms.clone()))?;

        let rooms_created_total = IntCounterVec::new(
            Opts::new("lobby_rooms_created_total", "Total rooms created by origin"),
            &["origin"],
        )?;
        registry.register(Box::new(rooms_created_total.clone()))?;

        let games_finished_total = IntCounter::with_opts(Opts::new(
            "lobby_games_finished_total",
            "Total games that reached a winner",
        ))?;
        registry.register(Box::new(games_finished_total.clone()))?;

        let rounds_per_game = Histogram::with_opts(
            HistogramOpts::new("lobby_rounds_per_game", "Rounds played per finished game")
                .buckets(vec![1.0, 3.0, 5.0, 8.0, 12.0, 16.0, 24.0]),
        )?;
        registry.register(Box::new(rounds_per_game.clone()))?;

        Ok(Self {
            active_rooms,
            rooms_created_total,
            games_finished_total,
            rounds_per_game,
        })
    }
}

impl BotMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let bots_active = IntGauge::with_opts(Opts::new(
            "lobby_bots_active",
            "Live provisioned bot identities",
        ))?;
        registry.register(Box::new(bots_active.clone()))?;

        let bots_provisioned_total = IntCounter::with_opts(Opts::new(
            "lobby_bots_provisioned_total",
            "Total bot identities provisioned",
        ))?;
        registry.register(Box::new(bots_provisioned_total.clone()))?;

        let backfill_operations_total = IntCounterVec::new(
            Opts::new(
                "lobby_backfill_operations_total",
                "Backfill room formations by outcome",
            ),
            &["status"],
        )?;
        registry.register(Box::new(backfill_operations_total.clone()))?;

        Ok(Self {
            bots_active,
            bots_provisioned_total,
            backfill_operations_total,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let tick_duration = Histogram::with_opts(
            HistogramOpts::new("lobby_tick_duration_seconds", "Matchmaking tick duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        registry.register(Box::new(tick_duration.clone()))?;

        let combat_duration = Histogram::with_opts(
            HistogramOpts::new(
                "lobby_combat_duration_seconds",
                "Combat resolution duration per room",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        registry.register(Box::new(combat_duration.clone()))?;

        let room_operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "lobby_room_operation_duration_seconds",
                "Room operation durations",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
            &["operation"],
        )?;
        registry.register(Box::new(room_operation_duration.clone()))?;

        Ok(Self {
            tick_duration,
            combat_duration,
            room_operation_duration,
        })
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for MetricsTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_registers_cleanly() {
        let collector = MetricsCollector::new().unwrap();
        collector.queue().players_queued_total.inc();
        collector.record_room_created();
        collector.record_backfill(true);
        collector.record_game_finished(8);

        let families = collector.registry().gather();
        assert!(!families.is_empty());

        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();
        assert!(names.contains(&"lobby_players_queued_total"));
        assert!(names.contains(&"lobby_rooms_created_total"));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = Arc::new(Registry::new());
        assert!(MetricsCollector::with_registry(registry.clone()).is_ok());
        assert!(MetricsCollector::with_registry(registry).is_err());
    }

    #[test]
    fn test_timer_measures() {
        let collector = MetricsCollector::new().unwrap();
        let timer = collector.start_timer();
        std::thread::sleep(Duration::from_millis(5));
        assert!(timer.elapsed() >= Duration::from_millis(5));
    }
}
