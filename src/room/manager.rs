//! Room lifecycle management
//!
//! Thin orchestration over the room store: every mutation goes through the
//! store's guarded update so two callers racing the same transition resolve
//! to exactly one winner. The manager also owns disconnect handling and the
//! stale-room sweep.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::GameRules;
use crate::error::{LobbyError, Result};
use crate::notify::NotificationGateway;
use crate::room::{Room, Seat};
use crate::storage::RoomStore;
use crate::types::{topics, LobbyEvent, PlayerId, RoomId, RoomStatus};

/// Manages room aggregates over a store
pub struct RoomManager {
    store: Arc<dyn RoomStore>,
    gateway: Arc<dyn NotificationGateway>,
    rules: GameRules,
}

impl RoomManager {
    pub fn new(
        store: Arc<dyn RoomStore>,
        gateway: Arc<dyn NotificationGateway>,
        rules: GameRules,
    ) -> Self {
        Self {
            store,
            gateway,
            rules,
        }
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    pub fn store(&self) -> Arc<dyn RoomStore> {
        self.store.clone()
    }

    /// Create a hosted room with the creator seated as host
    pub async fn create_room(
        &self,
        name: String,
        host: PlayerId,
        display_name: String,
    ) -> Result<Room> {
        if name.trim().is_empty() {
            return Err(LobbyError::Validation {
                reason: "room name cannot be empty".to_string(),
            }
            .into());
        }
        self.ensure_unseated(&host).await?;

        let room = Room::hosted(name, host.clone(), display_name, &self.rules);
        self.store.insert(room.clone()).await?;

        info!("Player '{}' created room {} ('{}')", host, room.id, room.name);
        Ok(room)
    }

    /// Insert an externally assembled room (matchmade formation)
    pub async fn insert_room(&self, room: Room) -> Result<()> {
        self.store.insert(room).await
    }

    pub async fn get_room(&self, room_id: &RoomId) -> Result<Room> {
        self.store
            .get(room_id)
            .await?
            .ok_or_else(|| LobbyError::room_not_found(room_id).into())
    }

    pub async fn list_rooms(&self) -> Result<Vec<Room>> {
        self.store.list().await
    }

    pub async fn find_room_of(&self, occupant_id: &str) -> Result<Option<Room>> {
        self.store.find_by_occupant(occupant_id).await
    }

    /// Join a waiting room
    pub async fn join_room(
        &self,
        room_id: &RoomId,
        player_id: PlayerId,
        display_name: String,
    ) -> Result<Room> {
        self.ensure_unseated(&player_id).await?;

        let joining = player_id.clone();
        let rules = self.rules.clone();
        let room = self
            .store
            .update_if(room_id, &|_| true, &move |room| {
                room.add_player(joining.clone(), display_name.clone(), &rules)
            })
            .await?;

        info!("Player '{}' joined room {}", player_id, room_id);
        self.gateway.publish(
            topics::LOBBY,
            LobbyEvent::PlayerJoinedRoom {
                room_id: *room_id,
                player_id,
            },
        );
        Ok(room)
    }

    /// Leave a waiting room. An emptied room is removed outright.
    pub async fn leave_room(&self, room_id: &RoomId, player_id: &str) -> Result<()> {
        let leaving = player_id.to_string();
        let room = self
            .store
            .update_if(room_id, &|_| true, &move |room| {
                room.remove_player(&leaving).map(|_| ())
            })
            .await?;

        info!("Player '{}' left room {}", player_id, room_id);
        self.gateway.publish(
            topics::LOBBY,
            LobbyEvent::PlayerLeftRoom {
                room_id: *room_id,
                player_id: player_id.to_string(),
            },
        );

        if room.seats.is_empty() {
            debug!("Room {} emptied, removing", room_id);
            self.store.remove(room_id).await?;
        }
        Ok(())
    }

    /// Flip a seat's ready flag
    pub async fn toggle_ready(&self, room_id: &RoomId, player_id: &str) -> Result<bool> {
        let toggling = player_id.to_string();
        let room = self
            .store
            .update_if(room_id, &|_| true, &move |room| {
                room.toggle_ready(&toggling).map(|_| ())
            })
            .await?;

        let ready = room
            .seat(player_id)
            .map(|s| s.ready)
            .ok_or_else(|| LobbyError::seat_not_found(player_id))?;

        self.gateway.publish(
            topics::LOBBY,
            LobbyEvent::ReadyChanged {
                room_id: *room_id,
                player_id: player_id.to_string(),
                ready,
            },
        );
        Ok(ready)
    }

    /// Host-initiated start: `Waiting` -> `Selecting`. The caller is expected
    /// to hand the room to the hero selection coordinator next.
    pub async fn start_game(&self, room_id: &RoomId, requested_by: &str) -> Result<Room> {
        let requester = requested_by.to_string();
        let room = self
            .store
            .update_if(room_id, &|_| true, &move |room| {
                room.begin_selecting(&requester)
            })
            .await?;

        info!("Room {} started by '{}'", room_id, requested_by);
        Ok(room)
    }

    /// Guarded transition: apply `mutate` only while the room is in
    /// `expected`. Racing callers get a `StateConflict`.
    pub async fn try_advance(
        &self,
        room_id: &RoomId,
        expected: RoomStatus,
        mutate: &(dyn Fn(&mut Room) -> Result<()> + Send + Sync),
    ) -> Result<Room> {
        self.store
            .update_if(room_id, &move |room| room.status == expected, mutate)
            .await
    }

    /// Patch a single seat under the store lock. Finished rooms reject every
    /// seat write; their state is terminal.
    pub async fn update_seat(
        &self,
        room_id: &RoomId,
        seat_id: &str,
        patch: &(dyn Fn(&mut Seat) -> Result<()> + Send + Sync),
    ) -> Result<Room> {
        self.update_seat_when(
            room_id,
            seat_id,
            &|room| room.status != RoomStatus::Finished,
            patch,
        )
        .await
    }

    /// Patch a single seat only while the room satisfies `accept`. The check
    /// and the write commit under the same store lock, so a phase flip racing
    /// the caller lands as a state conflict instead of a stray mutation.
    pub async fn update_seat_when(
        &self,
        room_id: &RoomId,
        seat_id: &str,
        accept: &(dyn Fn(&Room) -> bool + Send + Sync),
        patch: &(dyn Fn(&mut Seat) -> Result<()> + Send + Sync),
    ) -> Result<Room> {
        let target = seat_id.to_string();
        self.store
            .update_if(room_id, accept, &move |room| {
                let seat = room
                    .seat_mut(&target)
                    .ok_or_else(|| LobbyError::seat_not_found(&target))?;
                patch(seat)
            })
            .await
    }

    /// Handle a dropped realtime connection.
    ///
    /// Waiting rooms lose the seat (with host transfer); selecting rooms lose
    /// the seat and finish immediately if only one remains; playing rooms
    /// carry the seat so the game can conclude normally.
    pub async fn handle_disconnect(&self, player_id: &str) -> Result<()> {
        let Some(room) = self.store.find_by_occupant(player_id).await? else {
            debug!("Disconnect for '{}' matched no live room", player_id);
            return Ok(());
        };

        match room.status {
            RoomStatus::Waiting => self.leave_room(&room.id, player_id).await,
            RoomStatus::Selecting => self.drop_from_selection(&room.id, player_id).await,
            RoomStatus::Playing | RoomStatus::Finished => {
                debug!(
                    "Ignoring disconnect of '{}' in {} room {}",
                    player_id, room.status, room.id
                );
                Ok(())
            }
        }
    }

    async fn drop_from_selection(&self, room_id: &RoomId, player_id: &str) -> Result<()> {
        let dropping = player_id.to_string();
        let room = self
            .try_advance(room_id, RoomStatus::Selecting, &move |room| {
                let idx = room
                    .seats
                    .iter()
                    .position(|s| s.id() == dropping)
                    .ok_or_else(|| LobbyError::seat_not_found(&dropping))?;
                room.seats.remove(idx);
                if room.seats.len() == 1 {
                    let winner = room.seats[0].id().to_string();
                    room.finish(Some(winner))?;
                }
                Ok(())
            })
            .await?;

        warn!(
            "Player '{}' disconnected during hero selection in room {}",
            player_id, room_id
        );
        self.gateway.publish(
            topics::LOBBY,
            LobbyEvent::PlayerLeftRoom {
                room_id: *room_id,
                player_id: player_id.to_string(),
            },
        );
        if room.status == RoomStatus::Finished {
            info!(
                "Room {} finished by forfeit, winner: {:?}",
                room_id, room.winner
            );
            self.gateway.publish(
                topics::GAME,
                LobbyEvent::GameEnded {
                    room_id: *room_id,
                    winner: room.winner.clone(),
                },
            );
        }
        Ok(())
    }

    async fn ensure_unseated(&self, player_id: &str) -> Result<()> {
        if let Some(room) = self.store.find_by_occupant(player_id).await? {
            return Err(LobbyError::Validation {
                reason: format!("player {} is already in room {}", player_id, room.id),
            }
            .into());
        }
        Ok(())
    }

    /// Spawn the periodic stale-room sweep
    pub fn start_cleanup_task(self: &Arc<Self>, ttl: Duration, interval: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match manager.store.purge_stale(ttl).await {
                    Ok(0) => {}
                    Ok(removed) => info!("Cleaned up {} stale rooms", removed),
                    Err(e) => warn!("Room cleanup failed: {}", e),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_state_conflict;
    use crate::notify::RecordingGateway;
    use crate::storage::InMemoryRoomStore;
    use crate::types::GamePhase;

    fn manager() -> (Arc<RoomManager>, Arc<RecordingGateway>) {
        let gateway = Arc::new(RecordingGateway::new());
        let manager = Arc::new(RoomManager::new(
            Arc::new(InMemoryRoomStore::new()),
            gateway.clone(),
            GameRules::default(),
        ));
        (manager, gateway)
    }

    async fn room_with_two(manager: &RoomManager) -> Room {
        let room = manager
            .create_room("Arena".to_string(), "alice".to_string(), "Alice".to_string())
            .await
            .unwrap();
        manager
            .join_room(&room.id, "bob".to_string(), "Bob".to_string())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_join_publishes_events() {
        let (manager, gateway) = manager();
        let room = room_with_two(&manager).await;
        assert_eq!(room.seats.len(), 2);

        let events = gateway.events_for(topics::LOBBY);
        assert!(matches!(events[0], LobbyEvent::PlayerJoinedRoom { .. }));
    }

    #[tokio::test]
    async fn test_cannot_join_two_rooms() {
        let (manager, _) = manager();
        let room = room_with_two(&manager).await;

        let err = manager
            .create_room("Second".to_string(), "bob".to_string(), "Bob".to_string())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already in room"));

        let other = manager
            .create_room("Third".to_string(), "carol".to_string(), "Carol".to_string())
            .await
            .unwrap();
        let err = manager
            .join_room(&other.id, "bob".to_string(), "Bob".to_string())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already in room"));
        assert_eq!(manager.get_room(&room.id).await.unwrap().seats.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_room_is_removed() {
        let (manager, _) = manager();
        let room = manager
            .create_room("Arena".to_string(), "alice".to_string(), "Alice".to_string())
            .await
            .unwrap();

        manager.leave_room(&room.id, "alice").await.unwrap();
        assert!(manager.get_room(&room.id).await.is_err());
    }

    #[tokio::test]
    async fn test_start_requires_host_and_readiness() {
        let (manager, _) = manager();
        let room = room_with_two(&manager).await;

        assert!(manager.start_game(&room.id, "alice").await.is_err());

        manager.toggle_ready(&room.id, "alice").await.unwrap();
        manager.toggle_ready(&room.id, "bob").await.unwrap();

        assert!(manager.start_game(&room.id, "bob").await.is_err());

        let started = manager.start_game(&room.id, "alice").await.unwrap();
        assert_eq!(started.status, RoomStatus::Selecting);
    }

    #[tokio::test]
    async fn test_try_advance_rejects_wrong_status() {
        let (manager, _) = manager();
        let room = room_with_two(&manager).await;

        let err = manager
            .try_advance(&room.id, RoomStatus::Playing, &|room| {
                room.phase = Some(GamePhase::Combat);
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(is_state_conflict(&err));
    }

    #[tokio::test]
    async fn test_disconnect_while_waiting_removes_seat() {
        let (manager, _) = manager();
        let room = room_with_two(&manager).await;

        manager.handle_disconnect("bob").await.unwrap();
        let room = manager.get_room(&room.id).await.unwrap();
        assert_eq!(room.seats.len(), 1);
        assert!(!room.has_occupant("bob"));
    }

    #[tokio::test]
    async fn test_disconnect_during_selection_can_forfeit() {
        let (manager, gateway) = manager();
        let room = room_with_two(&manager).await;
        manager.toggle_ready(&room.id, "alice").await.unwrap();
        manager.toggle_ready(&room.id, "bob").await.unwrap();
        manager.start_game(&room.id, "alice").await.unwrap();

        manager.handle_disconnect("bob").await.unwrap();

        let room = manager.get_room(&room.id).await.unwrap();
        assert_eq!(room.status, RoomStatus::Finished);
        assert_eq!(room.winner.as_deref(), Some("alice"));

        let game_events = gateway.events_for(topics::GAME);
        assert!(game_events
            .iter()
            .any(|e| matches!(e, LobbyEvent::GameEnded { .. })));
    }

    #[tokio::test]
    async fn test_disconnect_while_playing_is_ignored() {
        let (manager, _) = manager();
        let room = room_with_two(&manager).await;
        manager.toggle_ready(&room.id, "alice").await.unwrap();
        manager.toggle_ready(&room.id, "bob").await.unwrap();
        manager.start_game(&room.id, "alice").await.unwrap();
        manager
            .try_advance(&room.id, RoomStatus::Selecting, &|room| room.begin_playing())
            .await
            .unwrap();

        manager.handle_disconnect("bob").await.unwrap();
        let room = manager.get_room(&room.id).await.unwrap();
        assert_eq!(room.status, RoomStatus::Playing);
        assert!(room.has_occupant("bob"));
    }

    #[tokio::test]
    async fn test_update_seat_patches_one_seat() {
        let (manager, _) = manager();
        let room = room_with_two(&manager).await;

        let updated = manager
            .update_seat(&room.id, "bob", &|seat| {
                seat.coins = 5;
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(updated.seat("bob").unwrap().coins, 5);
        assert_eq!(updated.seat("alice").unwrap().coins, 0);
    }

    #[tokio::test]
    async fn test_update_seat_rejects_finished_room() {
        let (manager, _) = manager();
        let room = room_with_two(&manager).await;
        manager.toggle_ready(&room.id, "alice").await.unwrap();
        manager.toggle_ready(&room.id, "bob").await.unwrap();
        manager.start_game(&room.id, "alice").await.unwrap();
        manager.handle_disconnect("bob").await.unwrap();

        let finished = manager.get_room(&room.id).await.unwrap();
        assert_eq!(finished.status, RoomStatus::Finished);

        let err = manager
            .update_seat(&room.id, "alice", &|seat| {
                seat.coins = 99;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(is_state_conflict(&err));

        let after = manager.get_room(&room.id).await.unwrap();
        assert_eq!(after.seat("alice").unwrap().coins, 0);
    }

    #[tokio::test]
    async fn test_update_seat_when_checks_under_the_lock() {
        let (manager, _) = manager();
        let room = room_with_two(&manager).await;

        // Waiting room fails a playing-only predicate
        let err = manager
            .update_seat_when(
                &room.id,
                "alice",
                &|room| room.status == RoomStatus::Playing,
                &|seat| {
                    seat.coins = 99;
                    Ok(())
                },
            )
            .await
            .unwrap_err();
        assert!(is_state_conflict(&err));
        let after = manager.get_room(&room.id).await.unwrap();
        assert_eq!(after.seat("alice").unwrap().coins, 0);
    }
}
