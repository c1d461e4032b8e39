//! Matchmaking queue management
//!
//! Players wait in rating buckets; a full bucket becomes a room in one tick.
//! A lone player who has waited past the backfill threshold gets a room of
//! bots instead. Room formation is the only multi-entity write in the engine,
//! so it runs claim-first with compensating cleanup: claim the queue entries,
//! provision bots, insert the room, and unwind everything on any failure.

use chrono::Duration as ChronoDuration;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bot::BotProvisioner;
use crate::config::app::MatchmakingSettings;
use crate::config::GameRules;
use crate::error::{LobbyError, Result};
use crate::notify::NotificationGateway;
use crate::room::{Room, RoomManager, Seat};
use crate::selection::HeroSelectionCoordinator;
use crate::storage::QueueStore;
use crate::types::{
    topics, BotIdentity, LobbyEvent, PlayerId, QueueEntry, QueueStatus, RoomId,
};
use crate::utils::{current_timestamp, rating_bucket};

/// Running counters for the queue
#[derive(Debug, Clone, Default)]
pub struct QueueManagerStats {
    pub players_queued: u64,
    pub players_cancelled: u64,
    pub rooms_formed: u64,
    pub rooms_backfilled: u64,
    pub bots_provisioned: u64,
}

/// Matchmaking queue orchestrator
pub struct QueueManager {
    queue: Arc<dyn QueueStore>,
    rooms: Arc<RoomManager>,
    bots: Arc<BotProvisioner>,
    selection: Arc<HeroSelectionCoordinator>,
    gateway: Arc<dyn NotificationGateway>,
    settings: MatchmakingSettings,
    rules: GameRules,
    stats: Arc<RwLock<QueueManagerStats>>,
}

impl QueueManager {
    pub fn new(
        queue: Arc<dyn QueueStore>,
        rooms: Arc<RoomManager>,
        bots: Arc<BotProvisioner>,
        selection: Arc<HeroSelectionCoordinator>,
        gateway: Arc<dyn NotificationGateway>,
        settings: MatchmakingSettings,
        rules: GameRules,
    ) -> Self {
        Self {
            queue,
            rooms,
            bots,
            selection,
            gateway,
            settings,
            rules,
            stats: Arc::new(RwLock::new(QueueManagerStats::default())),
        }
    }

    /// Enter the matchmaking queue with a rating snapshot
    pub async fn enqueue(
        &self,
        player_id: PlayerId,
        display_name: String,
        rating: f64,
    ) -> Result<QueueEntry> {
        if player_id.is_empty() {
            return Err(LobbyError::Validation {
                reason: "player id cannot be empty".to_string(),
            }
            .into());
        }
        if !rating.is_finite() || rating < 0.0 {
            return Err(LobbyError::Validation {
                reason: format!("rating {} is not a valid snapshot", rating),
            }
            .into());
        }
        if let Some(room) = self.rooms.find_room_of(&player_id).await? {
            return Err(LobbyError::Validation {
                reason: format!("player {} is already in room {}", player_id, room.id),
            }
            .into());
        }

        let entry = QueueEntry {
            player_id: player_id.clone(),
            display_name,
            rating,
            status: QueueStatus::Waiting,
            enqueued_at: current_timestamp(),
        };
        self.queue.insert(entry.clone()).await?;

        {
            let mut stats = self.stats.write().map_err(|_| LobbyError::InternalError {
                message: "Failed to acquire stats lock".to_string(),
            })?;
            stats.players_queued += 1;
        }

        info!(
            "Player '{}' entered the queue at rating {:.0}",
            player_id, rating
        );
        Ok(entry)
    }

    /// Leave the queue. Only a waiting entry can be cancelled; a matched
    /// player is already bound to a room.
    pub async fn cancel(&self, player_id: &str) -> Result<()> {
        self.queue.cancel(player_id).await?;

        {
            let mut stats = self.stats.write().map_err(|_| LobbyError::InternalError {
                message: "Failed to acquire stats lock".to_string(),
            })?;
            stats.players_cancelled += 1;
        }

        info!("Player '{}' left the queue", player_id);
        Ok(())
    }

    pub async fn entry(&self, player_id: &str) -> Result<Option<QueueEntry>> {
        self.queue.get(player_id).await
    }

    pub async fn waiting_count(&self) -> Result<usize> {
        self.queue.count_waiting().await
    }

    pub fn stats(&self) -> QueueManagerStats {
        self.stats
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// One matchmaking pass. Forms at most one room: a full rating bucket
    /// wins over backfill, and an empty queue is a no-op. Returns the formed
    /// room's id, if any.
    pub async fn tick(&self) -> Result<Option<RoomId>> {
        // Entries past their TTL never match; the cleanup task purges them
        let ttl = ChronoDuration::seconds(self.settings.queue_entry_ttl_seconds as i64);
        let now = current_timestamp();
        let waiting: Vec<QueueEntry> = self
            .queue
            .waiting()
            .await?
            .into_iter()
            .filter(|e| now - e.enqueued_at < ttl)
            .collect();
        if waiting.is_empty() {
            return Ok(None);
        }

        // A player past the backfill threshold takes priority over batch
        // matching; the oldest entry is checked first
        if self.settings.enable_bot_backfill {
            let oldest = &waiting[0];
            let waited = current_timestamp() - oldest.enqueued_at;
            let threshold = ChronoDuration::seconds(self.settings.backfill_delay_seconds as i64);
            if waited >= threshold {
                debug!(
                    "Backfilling for '{}' after {}s in queue",
                    oldest.player_id,
                    waited.num_seconds()
                );
                let room_id = self.backfill(oldest.clone()).await?;
                return Ok(Some(room_id));
            }
        }

        // Bucket by rating, oldest-first order preserved within each bucket
        let mut buckets: BTreeMap<i64, Vec<&QueueEntry>> = BTreeMap::new();
        for entry in &waiting {
            buckets
                .entry(rating_bucket(entry.rating, self.settings.rating_bucket_width))
                .or_default()
                .push(entry);
        }

        if let Some(full) = buckets
            .values()
            .filter(|b| b.len() >= self.rules.room_size)
            .min_by_key(|b| b[0].enqueued_at)
        {
            let picked: Vec<QueueEntry> = full[..self.rules.room_size]
                .iter()
                .map(|e| (*e).clone())
                .collect();
            let room_id = self.form_room(picked, Vec::new()).await?;
            return Ok(Some(room_id));
        }

        Ok(None)
    }

    /// Form a room of one human and `room_size - 1` bots
    async fn backfill(&self, entry: QueueEntry) -> Result<RoomId> {
        let rating = entry.rating;
        let bots = self.bots.provision(self.rules.room_size - 1, rating).await?;
        match self.form_room(vec![entry], bots.clone()).await {
            Ok(room_id) => {
                if let Ok(mut stats) = self.stats.write() {
                    stats.rooms_backfilled += 1;
                    stats.bots_provisioned += bots.len() as u64;
                }
                Ok(room_id)
            }
            Err(e) => {
                // form_room released the claim; the bots are ours to unwind
                self.bots.discard(&bots).await;
                Err(e)
            }
        }
    }

    /// Claim the entries, build the room, insert it, and kick off hero
    /// selection. Releases the claim on any failure past the claim point.
    async fn form_room(&self, entries: Vec<QueueEntry>, bots: Vec<BotIdentity>) -> Result<RoomId> {
        let player_ids: Vec<PlayerId> = entries.iter().map(|e| e.player_id.clone()).collect();
        self.queue.claim(&player_ids).await?;

        let mut seats: Vec<Seat> = Vec::with_capacity(entries.len() + bots.len());
        for entry in &entries {
            seats.push(Seat::human(
                entry.player_id.clone(),
                entry.display_name.clone(),
                &self.rules,
            ));
        }
        for bot in &bots {
            seats.push(Seat::bot(
                bot.bot_id.clone(),
                bot.display_name.clone(),
                &self.rules,
            ));
        }

        let room = Room::matchmade("Ranked Arena".to_string(), seats, &self.rules);
        let room_id = room.id;

        if let Err(e) = self.rooms.insert_room(room).await {
            warn!("Room formation failed, releasing {} entries: {}", player_ids.len(), e);
            self.queue.release(&player_ids).await?;
            return Err(e);
        }

        // Matchmade rooms are born selecting; deal candidates immediately.
        // If that fails the formation unwinds: the room is removed and the
        // entries go back to waiting for a later tick.
        if let Err(e) = self.selection.begin_selection(&room_id).await {
            warn!(
                "Room {} formed but selection failed to start, unwinding: {}",
                room_id, e
            );
            if let Err(re) = self.rooms.store().remove(&room_id).await {
                warn!("Failed to remove room {} during unwind: {}", room_id, re);
            }
            self.queue.release(&player_ids).await?;
            return Err(e);
        }

        if let Ok(mut stats) = self.stats.write() {
            stats.rooms_formed += 1;
        }

        info!(
            "Formed matchmade room {} ({} humans, {} bots)",
            room_id,
            entries.len(),
            bots.len()
        );
        self.gateway.publish(
            topics::MATCHMAKING,
            LobbyEvent::MatchFound {
                room_id,
                players: player_ids,
            },
        );
        Ok(room_id)
    }

    /// Spawn the periodic matchmaking tick
    pub fn start_tick_task(self: &Arc<Self>, interval: std::time::Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match manager.tick().await {
                    Ok(Some(room_id)) => debug!("Tick formed room {}", room_id),
                    Ok(None) => {}
                    Err(e) => error!("Matchmaking tick failed: {}", e),
                }
            }
        })
    }

    /// Spawn the periodic stale-entry and expired-bot sweep
    pub fn start_cleanup_task(self: &Arc<Self>, interval: std::time::Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let entry_ttl = std::time::Duration::from_secs(manager.settings.queue_entry_ttl_seconds);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match manager.queue.purge_stale(entry_ttl).await {
                    Ok(0) => {}
                    Ok(removed) => info!("Purged {} stale queue entries", removed),
                    Err(e) => warn!("Queue cleanup failed: {}", e),
                }
                if let Err(e) = manager.bots.purge_expired().await {
                    warn!("Bot cleanup failed: {}", e);
                }
            }
        })
    }
}
