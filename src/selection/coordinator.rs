//! Hero selection coordination
//!
//! Deals each seat its hero candidates when a room enters `Selecting`,
//! accepts confirmations, and force-picks for anyone still undecided when the
//! deadline lands. Completion and the deadline race through the same guarded
//! transition, so exactly one of them moves the room into `Playing`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::catalog::HeroCatalog;
use crate::config::GameRules;
use crate::error::{is_state_conflict, LobbyError, Result};
use crate::game::PhaseScheduler;
use crate::notify::NotificationGateway;
use crate::room::RoomManager;
use crate::types::{topics, HeroId, LobbyEvent, RoomId, RoomStatus, SeatId};

/// Coordinates the hero selection sub-phase
pub struct HeroSelectionCoordinator {
    rooms: Arc<RoomManager>,
    heroes: Arc<dyn HeroCatalog>,
    scheduler: Arc<PhaseScheduler>,
    gateway: Arc<dyn NotificationGateway>,
    rules: GameRules,
    timers: Mutex<HashMap<RoomId, JoinHandle<()>>>,
}

impl HeroSelectionCoordinator {
    pub fn new(
        rooms: Arc<RoomManager>,
        heroes: Arc<dyn HeroCatalog>,
        scheduler: Arc<PhaseScheduler>,
        gateway: Arc<dyn NotificationGateway>,
        rules: GameRules,
    ) -> Self {
        Self {
            rooms,
            heroes,
            scheduler,
            gateway,
            rules,
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Deal candidates to every seat of a room that just entered `Selecting`
    /// and arm the deadline timer.
    pub async fn begin_selection(self: &Arc<Self>, room_id: &RoomId) -> Result<()> {
        // Sample before the guarded write; catalog I/O stays off the lock
        let room = self.rooms.get_room(room_id).await?;
        let mut candidates: HashMap<SeatId, Vec<HeroId>> = HashMap::new();
        for seat in &room.seats {
            let heroes = self.heroes.sample(self.rules.hero_candidates).await?;
            candidates.insert(seat.id().to_string(), heroes.into_iter().map(|h| h.id).collect());
        }

        self.rooms
            .try_advance(room_id, RoomStatus::Selecting, &move |room| {
                if room.seats.iter().any(|s| !s.hero_candidates.is_empty()) {
                    return Err(LobbyError::StateConflict {
                        entity: "room".to_string(),
                        reason: "hero candidates were already dealt".to_string(),
                    }
                    .into());
                }
                for seat in &mut room.seats {
                    if let Some(dealt) = candidates.get(seat.id()) {
                        seat.hero_candidates = dealt.clone();
                    }
                }
                Ok(())
            })
            .await?;

        info!(
            "Dealt hero candidates in room {} ({} per seat, {} s deadline)",
            room_id, self.rules.hero_candidates, self.rules.selection_deadline_seconds
        );
        self.gateway.publish(
            topics::LOBBY,
            LobbyEvent::SelectionStarted {
                room_id: *room_id,
                deadline_seconds: self.rules.selection_deadline_seconds,
            },
        );

        self.arm_deadline(*room_id);
        Ok(())
    }

    fn arm_deadline(self: &Arc<Self>, room_id: RoomId) {
        let coordinator = Arc::clone(self);
        let deadline = self.rules.selection_deadline();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            if let Err(e) = coordinator.force_complete(&room_id).await {
                if is_state_conflict(&e) {
                    debug!("Selection deadline for room {} lost the race", room_id);
                } else {
                    warn!("Selection deadline handling failed for room {}: {}", room_id, e);
                }
            }
            if let Ok(mut timers) = coordinator.timers.lock() {
                timers.remove(&room_id);
            }
        });

        if let Ok(mut timers) = self.timers.lock() {
            if let Some(stale) = timers.insert(room_id, handle) {
                stale.abort();
            }
        }
    }

    /// Confirm a seat's hero pick. Rejects heroes outside the seat's dealt
    /// candidates without touching any state; completing the last pick moves
    /// the room into play.
    pub async fn confirm_hero(
        self: &Arc<Self>,
        room_id: &RoomId,
        seat_id: &str,
        hero_id: &str,
    ) -> Result<()> {
        let confirming = seat_id.to_string();
        let picking = hero_id.to_string();
        let room = self.rooms
            .try_advance(room_id, RoomStatus::Selecting, &move |room| {
                let seat = room
                    .seat_mut(&confirming)
                    .ok_or_else(|| LobbyError::seat_not_found(&confirming))?;
                if seat.selected_hero.is_some() {
                    return Err(LobbyError::Validation {
                        reason: format!("seat {} already confirmed a hero", confirming),
                    }
                    .into());
                }
                if !seat.hero_candidates.iter().any(|c| c == &picking) {
                    return Err(LobbyError::Validation {
                        reason: format!(
                            "hero {} was not offered to seat {}",
                            picking, confirming
                        ),
                    }
                    .into());
                }
                seat.selected_hero = Some(picking.clone());
                seat.ready = true;
                Ok(())
            })
            .await?;

        let all_selected = room.all_selected();
        info!(
            "Seat '{}' confirmed hero '{}' in room {} (all selected: {})",
            seat_id, hero_id, room_id, all_selected
        );
        self.gateway.publish(
            topics::LOBBY,
            LobbyEvent::HeroSelected {
                room_id: *room_id,
                seat_id: seat_id.to_string(),
                hero_id: hero_id.to_string(),
                all_selected,
            },
        );

        if all_selected {
            self.complete(room_id).await?;
        }
        Ok(())
    }

    /// Early completion once every seat has confirmed
    async fn complete(self: &Arc<Self>, room_id: &RoomId) -> Result<()> {
        match self
            .rooms
            .try_advance(room_id, RoomStatus::Selecting, &|room| room.begin_playing())
            .await
        {
            Ok(_) => {}
            // Deadline fired in the same instant and won; nothing left to do
            Err(e) if is_state_conflict(&e) => return Ok(()),
            Err(e) => return Err(e),
        }

        self.disarm(room_id);
        self.scheduler.start_game(room_id).await
    }

    /// Deadline path: every undecided seat takes its first candidate, then
    /// the room advances into play.
    async fn force_complete(self: &Arc<Self>, room_id: &RoomId) -> Result<()> {
        let before = self.rooms.get_room(room_id).await?;
        let undecided: Vec<SeatId> = before
            .seats
            .iter()
            .filter(|s| s.selected_hero.is_none())
            .map(|s| s.id().to_string())
            .collect();

        // A seat can reach the deadline with no candidates (e.g. it was dealt
        // into a room the catalog failed for); sample a fallback off the lock
        let needs_fallback = before
            .seats
            .iter()
            .any(|s| s.selected_hero.is_none() && s.hero_candidates.is_empty());
        let fallback: Vec<HeroId> = if needs_fallback {
            self.heroes
                .sample(self.rules.hero_candidates)
                .await?
                .into_iter()
                .map(|h| h.id)
                .collect()
        } else {
            Vec::new()
        };

        let room = self.rooms
            .try_advance(room_id, RoomStatus::Selecting, &move |room| {
                for seat in &mut room.seats {
                    if seat.selected_hero.is_none() {
                        seat.selected_hero = seat
                            .hero_candidates
                            .first()
                            .or_else(|| fallback.first())
                            .cloned();
                        seat.ready = true;
                    }
                }
                room.begin_playing()
            })
            .await?;

        if !undecided.is_empty() {
            info!(
                "Selection deadline hit in room {}, auto-picked for {} seats",
                room_id,
                undecided.len()
            );
            for seat_id in undecided {
                if let Some(hero_id) = room.seat(&seat_id).and_then(|s| s.selected_hero.clone()) {
                    self.gateway.publish(
                        topics::LOBBY,
                        LobbyEvent::HeroSelected {
                            room_id: *room_id,
                            seat_id,
                            hero_id,
                            all_selected: true,
                        },
                    );
                }
            }
        }

        self.disarm(room_id);
        self.scheduler.start_game(room_id).await
    }

    fn disarm(&self, room_id: &RoomId) {
        if let Ok(mut timers) = self.timers.lock() {
            if let Some(handle) = timers.remove(room_id) {
                handle.abort();
            }
        }
    }

    /// Number of rooms with an armed selection deadline
    pub fn armed_deadlines(&self) -> usize {
        self.timers.lock().map(|t| t.len()).unwrap_or(0)
    }
}

impl Drop for HeroSelectionCoordinator {
    fn drop(&mut self) {
        if let Ok(timers) = self.timers.lock() {
            for handle in timers.values() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{StaticHeroCatalog, StaticMinionCatalog};
    use crate::game::StrengthSimulator;
    use crate::notify::RecordingGateway;
    use crate::room::Room;
    use crate::storage::InMemoryRoomStore;
    use crate::types::GamePhase;

    struct Fixture {
        rooms: Arc<RoomManager>,
        coordinator: Arc<HeroSelectionCoordinator>,
        gateway: Arc<RecordingGateway>,
    }

    fn fixture() -> Fixture {
        let rules = GameRules::default();
        let gateway = Arc::new(RecordingGateway::new());
        let rooms = Arc::new(RoomManager::new(
            Arc::new(InMemoryRoomStore::new()),
            gateway.clone(),
            rules.clone(),
        ));
        let scheduler = Arc::new(PhaseScheduler::new(
            rooms.clone(),
            Arc::new(StaticMinionCatalog::new()),
            Arc::new(StrengthSimulator::new()),
            gateway.clone(),
            rules.clone(),
        ));
        let coordinator = Arc::new(HeroSelectionCoordinator::new(
            rooms.clone(),
            Arc::new(StaticHeroCatalog::new()),
            scheduler,
            gateway.clone(),
            rules,
        ));
        Fixture {
            rooms,
            coordinator,
            gateway,
        }
    }

    async fn selecting_room(rooms: &RoomManager, n: usize) -> Room {
        let room = rooms
            .create_room("Arena".to_string(), "p0".to_string(), "P0".to_string())
            .await
            .unwrap();
        for i in 1..n {
            rooms
                .join_room(&room.id, format!("p{}", i), format!("P{}", i))
                .await
                .unwrap();
        }
        for i in 0..n {
            rooms.toggle_ready(&room.id, &format!("p{}", i)).await.unwrap();
        }
        rooms.start_game(&room.id, "p0").await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_begin_selection_deals_candidates() {
        let f = fixture();
        let room = selecting_room(&f.rooms, 2).await;

        f.coordinator.begin_selection(&room.id).await.unwrap();

        let room = f.rooms.get_room(&room.id).await.unwrap();
        for seat in &room.seats {
            assert_eq!(seat.hero_candidates.len(), 4);
            let mut ids = seat.hero_candidates.clone();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), 4);
            assert!(seat.selected_hero.is_none());
        }

        // Re-dealing is rejected
        let err = f.coordinator.begin_selection(&room.id).await.unwrap_err();
        assert!(is_state_conflict(&err));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_hero_never_mutates() {
        let f = fixture();
        let room = selecting_room(&f.rooms, 2).await;
        f.coordinator.begin_selection(&room.id).await.unwrap();

        let err = f.coordinator
            .confirm_hero(&room.id, "p0", "hero_not_dealt")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not offered"));

        let room = f.rooms.get_room(&room.id).await.unwrap();
        assert!(room.seat("p0").unwrap().selected_hero.is_none());
        assert_eq!(room.status, RoomStatus::Selecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_confirmed_starts_play_early() {
        let f = fixture();
        let room = selecting_room(&f.rooms, 2).await;
        f.coordinator.begin_selection(&room.id).await.unwrap();

        let dealt = f.rooms.get_room(&room.id).await.unwrap();
        for seat_id in ["p0", "p1"] {
            let hero = dealt.seat(seat_id).unwrap().hero_candidates[0].clone();
            f.coordinator
                .confirm_hero(&room.id, seat_id, &hero)
                .await
                .unwrap();
        }

        let room = f.rooms.get_room(&room.id).await.unwrap();
        assert_eq!(room.status, RoomStatus::Playing);
        assert_eq!(room.phase, Some(GamePhase::Preparation));
        assert_eq!(room.round, 1);
        assert_eq!(f.coordinator.armed_deadlines(), 0);

        // The last confirm response already reflects round-1 economy: a
        // player can spend as soon as they see the room playing
        for seat in &room.seats {
            assert_eq!(seat.coins, 3);
            assert!(!seat.shop.is_empty());
        }

        let events = f.gateway.events_for(topics::GAME);
        assert!(events
            .iter()
            .any(|e| matches!(e, LobbyEvent::GameStarted { round: 1, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_confirm_rejected() {
        let f = fixture();
        let room = selecting_room(&f.rooms, 2).await;
        f.coordinator.begin_selection(&room.id).await.unwrap();

        let dealt = f.rooms.get_room(&room.id).await.unwrap();
        let first = dealt.seat("p0").unwrap().hero_candidates[0].clone();
        let second = dealt.seat("p0").unwrap().hero_candidates[1].clone();

        f.coordinator.confirm_hero(&room.id, "p0", &first).await.unwrap();
        let err = f.coordinator
            .confirm_hero(&room.id, "p0", &second)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already confirmed"));

        let room = f.rooms.get_room(&room.id).await.unwrap();
        assert_eq!(room.seat("p0").unwrap().selected_hero.as_ref(), Some(&first));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_auto_picks_and_advances() {
        let f = fixture();
        let room = selecting_room(&f.rooms, 3).await;
        f.coordinator.begin_selection(&room.id).await.unwrap();

        // Only one of three confirms; the deadline covers the rest
        let dealt = f.rooms.get_room(&room.id).await.unwrap();
        let hero = dealt.seat("p0").unwrap().hero_candidates[0].clone();
        f.coordinator.confirm_hero(&room.id, "p0", &hero).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_secs(11)).await;

        let room = f.rooms.get_room(&room.id).await.unwrap();
        assert_eq!(room.status, RoomStatus::Playing);
        for seat in &room.seats {
            let picked = seat.selected_hero.as_ref().expect("every seat has a hero");
            assert!(seat.hero_candidates.contains(picked));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_and_final_confirm_race_to_one_transition() {
        let f = fixture();
        let room = selecting_room(&f.rooms, 2).await;
        f.coordinator.begin_selection(&room.id).await.unwrap();

        let dealt = f.rooms.get_room(&room.id).await.unwrap();
        let h0 = dealt.seat("p0").unwrap().hero_candidates[0].clone();
        let h1 = dealt.seat("p1").unwrap().hero_candidates[0].clone();
        f.coordinator.confirm_hero(&room.id, "p0", &h0).await.unwrap();

        // Land the last confirmation on the deadline instant; both paths
        // funnel through the same guard, so the room starts exactly once
        let sleeper = tokio::time::sleep(std::time::Duration::from_secs(10));
        let confirm = f.coordinator.confirm_hero(&room.id, "p1", &h1);
        let (_, confirm_result) = futures::join!(sleeper, confirm);

        // The confirm either won outright or lost the seat race to the
        // auto-pick; in both cases the room is playing at round 1
        if let Err(e) = confirm_result {
            assert!(is_state_conflict(&e) || e.to_string().contains("already confirmed"));
        }

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let room = f.rooms.get_room(&room.id).await.unwrap();
        assert_eq!(room.status, RoomStatus::Playing);
        assert_eq!(room.round, 1);

        let started = f
            .gateway
            .events_for(topics::GAME)
            .into_iter()
            .filter(|e| matches!(e, LobbyEvent::GameStarted { .. }))
            .count();
        assert_eq!(started, 1);
    }
}
