//! In-memory store implementations
//!
//! `Arc<RwLock<HashMap>>` state with lock-poison mapping to internal errors.
//! Suitable for a single-process deployment and for tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{LobbyError, Result};
use crate::room::Room;
use crate::storage::{BotStore, QueueStore, RoomMutation, RoomPredicate, RoomStore};
use crate::types::{BotIdentity, PlayerId, QueueEntry, QueueStatus, RoomId, RoomStatus};
use crate::utils::current_timestamp;

fn lock_error(what: &str) -> LobbyError {
    LobbyError::InternalError {
        message: format!("Failed to acquire {} lock", what),
    }
}

/// In-memory room store
#[derive(Clone, Default)]
pub struct InMemoryRoomStore {
    rooms: Arc<RwLock<HashMap<RoomId, Room>>>,
}

impl InMemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomStore for InMemoryRoomStore {
    async fn insert(&self, room: Room) -> Result<()> {
        let mut rooms = self.rooms.write().map_err(|_| lock_error("rooms"))?;
        if rooms.contains_key(&room.id) {
            return Err(LobbyError::StateConflict {
                entity: "room".to_string(),
                reason: format!("room {} already exists", room.id),
            }
            .into());
        }
        rooms.insert(room.id, room);
        Ok(())
    }

    async fn get(&self, id: &RoomId) -> Result<Option<Room>> {
        let rooms = self.rooms.read().map_err(|_| lock_error("rooms"))?;
        Ok(rooms.get(id).cloned())
    }

    async fn remove(&self, id: &RoomId) -> Result<()> {
        let mut rooms = self.rooms.write().map_err(|_| lock_error("rooms"))?;
        rooms
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| LobbyError::room_not_found(id).into())
    }

    async fn list(&self) -> Result<Vec<Room>> {
        let rooms = self.rooms.read().map_err(|_| lock_error("rooms"))?;
        Ok(rooms.values().cloned().collect())
    }

    async fn find_by_occupant(&self, occupant_id: &str) -> Result<Option<Room>> {
        let rooms = self.rooms.read().map_err(|_| lock_error("rooms"))?;
        Ok(rooms
            .values()
            .find(|r| r.status != RoomStatus::Finished && r.has_occupant(occupant_id))
            .cloned())
    }

    async fn update_if(
        &self,
        id: &RoomId,
        predicate: RoomPredicate<'_>,
        mutate: RoomMutation<'_>,
    ) -> Result<Room> {
        let mut rooms = self.rooms.write().map_err(|_| lock_error("rooms"))?;
        let room = rooms
            .get_mut(id)
            .ok_or_else(|| LobbyError::room_not_found(id))?;

        if !predicate(room) {
            return Err(LobbyError::StateConflict {
                entity: "room".to_string(),
                reason: format!("room {} rejected the transition guard", id),
            }
            .into());
        }

        // Mutate a copy so a failed mutation cannot leave the room half-written
        let mut updated = room.clone();
        mutate(&mut updated)?;
        updated.touch();
        *room = updated.clone();
        Ok(updated)
    }

    async fn purge_stale(&self, ttl: Duration) -> Result<usize> {
        let cutoff = current_timestamp()
            - chrono::Duration::from_std(ttl).map_err(|e| LobbyError::InternalError {
                message: format!("Invalid TTL: {}", e),
            })?;
        let mut rooms = self.rooms.write().map_err(|_| lock_error("rooms"))?;
        let before = rooms.len();
        rooms.retain(|_, room| room.updated_at > cutoff);
        Ok(before - rooms.len())
    }

    async fn count(&self) -> Result<usize> {
        let rooms = self.rooms.read().map_err(|_| lock_error("rooms"))?;
        Ok(rooms.len())
    }
}

/// In-memory queue store
#[derive(Clone, Default)]
pub struct InMemoryQueueStore {
    entries: Arc<RwLock<HashMap<PlayerId, QueueEntry>>>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn insert(&self, entry: QueueEntry) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| lock_error("queue"))?;
        match entries.get(&entry.player_id) {
            Some(existing) if existing.status != QueueStatus::Cancelled => {
                return Err(LobbyError::Validation {
                    reason: format!("player {} is already queued", entry.player_id),
                }
                .into());
            }
            _ => {}
        }
        entries.insert(entry.player_id.clone(), entry);
        Ok(())
    }

    async fn get(&self, player_id: &str) -> Result<Option<QueueEntry>> {
        let entries = self.entries.read().map_err(|_| lock_error("queue"))?;
        Ok(entries.get(player_id).cloned())
    }

    async fn cancel(&self, player_id: &str) -> Result<QueueEntry> {
        let mut entries = self.entries.write().map_err(|_| lock_error("queue"))?;
        let entry = entries
            .get_mut(player_id)
            .ok_or_else(|| LobbyError::entry_not_found(player_id))?;

        if entry.status != QueueStatus::Waiting {
            return Err(LobbyError::StateConflict {
                entity: "queue entry".to_string(),
                reason: format!("entry for {} is not waiting", player_id),
            }
            .into());
        }

        entry.status = QueueStatus::Cancelled;
        Ok(entry.clone())
    }

    async fn waiting(&self) -> Result<Vec<QueueEntry>> {
        let entries = self.entries.read().map_err(|_| lock_error("queue"))?;
        let mut waiting: Vec<QueueEntry> = entries
            .values()
            .filter(|e| e.status == QueueStatus::Waiting)
            .cloned()
            .collect();
        waiting.sort_by_key(|e| e.enqueued_at);
        Ok(waiting)
    }

    async fn claim(&self, player_ids: &[PlayerId]) -> Result<Vec<QueueEntry>> {
        let mut entries = self.entries.write().map_err(|_| lock_error("queue"))?;

        // All-or-nothing: verify every entry is claimable before touching any
        for id in player_ids {
            match entries.get(id) {
                Some(e) if e.status == QueueStatus::Waiting => {}
                _ => {
                    return Err(LobbyError::StateConflict {
                        entity: "queue entry".to_string(),
                        reason: format!("entry for {} is not claimable", id),
                    }
                    .into());
                }
            }
        }

        let mut claimed = Vec::with_capacity(player_ids.len());
        for id in player_ids {
            if let Some(e) = entries.get_mut(id) {
                e.status = QueueStatus::Matched;
                claimed.push(e.clone());
            }
        }
        Ok(claimed)
    }

    async fn release(&self, player_ids: &[PlayerId]) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| lock_error("queue"))?;
        for id in player_ids {
            if let Some(e) = entries.get_mut(id) {
                if e.status == QueueStatus::Matched {
                    e.status = QueueStatus::Waiting;
                }
            }
        }
        Ok(())
    }

    async fn purge_stale(&self, ttl: Duration) -> Result<usize> {
        let cutoff = current_timestamp()
            - chrono::Duration::from_std(ttl).map_err(|e| LobbyError::InternalError {
                message: format!("Invalid TTL: {}", e),
            })?;
        let mut entries = self.entries.write().map_err(|_| lock_error("queue"))?;
        let before = entries.len();
        entries.retain(|_, e| match e.status {
            QueueStatus::Waiting => e.enqueued_at > cutoff,
            QueueStatus::Matched => true,
            QueueStatus::Cancelled => false,
        });
        Ok(before - entries.len())
    }

    async fn count_waiting(&self) -> Result<usize> {
        let entries = self.entries.read().map_err(|_| lock_error("queue"))?;
        Ok(entries
            .values()
            .filter(|e| e.status == QueueStatus::Waiting)
            .count())
    }
}

/// In-memory bot store
#[derive(Clone, Default)]
pub struct InMemoryBotStore {
    bots: Arc<RwLock<HashMap<String, BotIdentity>>>,
}

impl InMemoryBotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BotStore for InMemoryBotStore {
    async fn insert(&self, bot: BotIdentity) -> Result<()> {
        let mut bots = self.bots.write().map_err(|_| lock_error("bots"))?;
        if bots.contains_key(&bot.bot_id) {
            return Err(LobbyError::StateConflict {
                entity: "bot".to_string(),
                reason: format!("bot {} already exists", bot.bot_id),
            }
            .into());
        }
        bots.insert(bot.bot_id.clone(), bot);
        Ok(())
    }

    async fn get(&self, bot_id: &str) -> Result<Option<BotIdentity>> {
        let bots = self.bots.read().map_err(|_| lock_error("bots"))?;
        Ok(bots.get(bot_id).cloned())
    }

    async fn remove(&self, bot_id: &str) -> Result<()> {
        let mut bots = self.bots.write().map_err(|_| lock_error("bots"))?;
        bots.remove(bot_id);
        Ok(())
    }

    async fn live_names(&self) -> Result<Vec<String>> {
        let bots = self.bots.read().map_err(|_| lock_error("bots"))?;
        Ok(bots.values().map(|b| b.display_name.clone()).collect())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = current_timestamp();
        let mut bots = self.bots.write().map_err(|_| lock_error("bots"))?;
        let before = bots.len();
        bots.retain(|_, b| b.expires_at > now);
        Ok(before - bots.len())
    }

    async fn count(&self) -> Result<usize> {
        let bots = self.bots.read().map_err(|_| lock_error("bots"))?;
        Ok(bots.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameRules;
    use crate::error::is_state_conflict;
    use crate::types::RoomStatus;

    fn waiting_entry(player_id: &str, rating: f64) -> QueueEntry {
        QueueEntry {
            player_id: player_id.to_string(),
            display_name: player_id.to_string(),
            rating,
            status: QueueStatus::Waiting,
            enqueued_at: current_timestamp(),
        }
    }

    fn test_room() -> Room {
        Room::hosted(
            "Test".to_string(),
            "alice".to_string(),
            "Alice".to_string(),
            &GameRules::default(),
        )
    }

    #[tokio::test]
    async fn test_room_insert_get_remove() {
        let store = InMemoryRoomStore::new();
        let room = test_room();
        let id = room.id;

        store.insert(room).await.unwrap();
        assert!(store.get(&id).await.unwrap().is_some());
        assert_eq!(store.count().await.unwrap(), 1);

        store.remove(&id).await.unwrap();
        assert!(store.get(&id).await.unwrap().is_none());
        assert!(store.remove(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_find_by_occupant_skips_finished() {
        let store = InMemoryRoomStore::new();
        let mut finished = test_room();
        finished.finish(Some("alice".to_string())).unwrap();
        store.insert(finished).await.unwrap();

        assert!(store.find_by_occupant("alice").await.unwrap().is_none());

        let live = test_room();
        store.insert(live.clone()).await.unwrap();
        let found = store.find_by_occupant("alice").await.unwrap().unwrap();
        assert_eq!(found.id, live.id);
    }

    #[tokio::test]
    async fn test_update_if_predicate_rejection() {
        let store = InMemoryRoomStore::new();
        let room = test_room();
        let id = room.id;
        store.insert(room).await.unwrap();

        let err = store
            .update_if(
                &id,
                &|r| r.status == RoomStatus::Playing,
                &|r| {
                    r.round += 1;
                    Ok(())
                },
            )
            .await
            .unwrap_err();
        assert!(is_state_conflict(&err));

        // Untouched
        let room = store.get(&id).await.unwrap().unwrap();
        assert_eq!(room.round, 1);
    }

    #[tokio::test]
    async fn test_update_if_failed_mutation_leaves_room_unchanged() {
        let store = InMemoryRoomStore::new();
        let room = test_room();
        let id = room.id;
        store.insert(room).await.unwrap();

        let result = store
            .update_if(
                &id,
                &|_| true,
                &|r| {
                    r.round = 99;
                    Err(LobbyError::Validation {
                        reason: "nope".to_string(),
                    }
                    .into())
                },
            )
            .await;
        assert!(result.is_err());

        let room = store.get(&id).await.unwrap().unwrap();
        assert_eq!(room.round, 1);
    }

    #[tokio::test]
    async fn test_queue_insert_duplicate_rejected() {
        let store = InMemoryQueueStore::new();
        store.insert(waiting_entry("alice", 1500.0)).await.unwrap();
        assert!(store.insert(waiting_entry("alice", 1500.0)).await.is_err());

        // Re-queue allowed after cancel
        store.cancel("alice").await.unwrap();
        store.insert(waiting_entry("alice", 1500.0)).await.unwrap();
    }

    #[tokio::test]
    async fn test_queue_waiting_is_fifo() {
        let store = InMemoryQueueStore::new();
        for name in ["first", "second", "third"] {
            store.insert(waiting_entry(name, 1500.0)).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let waiting = store.waiting().await.unwrap();
        let order: Vec<&str> = waiting.iter().map(|e| e.player_id.as_str()).collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_claim_is_all_or_nothing() {
        let store = InMemoryQueueStore::new();
        store.insert(waiting_entry("alice", 1500.0)).await.unwrap();
        store.insert(waiting_entry("bob", 1500.0)).await.unwrap();

        // One unknown id poisons the whole claim
        let err = store
            .claim(&["alice".to_string(), "ghostly".to_string()])
            .await
            .unwrap_err();
        assert!(is_state_conflict(&err));
        assert_eq!(store.count_waiting().await.unwrap(), 2);

        let claimed = store
            .claim(&["alice".to_string(), "bob".to_string()])
            .await
            .unwrap();
        assert_eq!(claimed.len(), 2);
        assert_eq!(store.count_waiting().await.unwrap(), 0);

        // Claimed entries cannot be cancelled
        assert!(store.cancel("alice").await.is_err());
    }

    #[tokio::test]
    async fn test_release_restores_waiting() {
        let store = InMemoryQueueStore::new();
        store.insert(waiting_entry("alice", 1500.0)).await.unwrap();
        store.claim(&["alice".to_string()]).await.unwrap();

        store.release(&["alice".to_string()]).await.unwrap();
        assert_eq!(store.count_waiting().await.unwrap(), 1);
        let entry = store.get("alice").await.unwrap().unwrap();
        assert_eq!(entry.status, QueueStatus::Waiting);
    }

    #[tokio::test]
    async fn test_bot_store_lifecycle() {
        let store = InMemoryBotStore::new();
        let now = current_timestamp();
        let bot = BotIdentity {
            bot_id: "bot_1".to_string(),
            display_name: "Grim Tactician".to_string(),
            rating: 1480.0,
            created_at: now,
            expires_at: now + chrono::Duration::hours(1),
        };

        store.insert(bot.clone()).await.unwrap();
        assert!(store.insert(bot).await.is_err());
        assert_eq!(
            store.live_names().await.unwrap(),
            vec!["Grim Tactician".to_string()]
        );

        store.remove("bot_1").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bot_purge_expired() {
        let store = InMemoryBotStore::new();
        let now = current_timestamp();
        store
            .insert(BotIdentity {
                bot_id: "bot_old".to_string(),
                display_name: "Old".to_string(),
                rating: 1500.0,
                created_at: now - chrono::Duration::hours(2),
                expires_at: now - chrono::Duration::hours(1),
            })
            .await
            .unwrap();
        store
            .insert(BotIdentity {
                bot_id: "bot_new".to_string(),
                display_name: "New".to_string(),
                rating: 1500.0,
                created_at: now,
                expires_at: now + chrono::Duration::hours(1),
            })
            .await
            .unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.get("bot_new").await.unwrap().is_some());
        assert!(store.get("bot_old").await.unwrap().is_none());
    }
}
