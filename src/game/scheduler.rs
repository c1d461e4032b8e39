//! Phase scheduling and round loop
//!
//! Drives a playing room through preparation and combat. The driver task
//! sleeps through the preparation window and then resolves combat; every
//! phase flip goes through a guarded store update keyed on (status, phase,
//! round), so a late timer firing against a room that already moved on lands
//! as a swallowed state conflict rather than a double transition.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::catalog::{Minion, MinionCatalog};
use crate::config::GameRules;
use crate::error::{is_state_conflict, LobbyError, Result};
use crate::game::combat::{pair_seats, BattleSimulator};
use crate::notify::NotificationGateway;
use crate::room::{Room, RoomManager, Seat};
use crate::types::{topics, BattleOutcome, GamePhase, LobbyEvent, RoomId, RoomStatus, SeatId};

/// Drives playing rooms through the preparation/combat loop
pub struct PhaseScheduler {
    rooms: Arc<RoomManager>,
    minions: Arc<dyn MinionCatalog>,
    simulator: Arc<dyn BattleSimulator>,
    gateway: Arc<dyn NotificationGateway>,
    rules: GameRules,
    drivers: Mutex<HashMap<RoomId, JoinHandle<()>>>,
}

impl PhaseScheduler {
    pub fn new(
        rooms: Arc<RoomManager>,
        minions: Arc<dyn MinionCatalog>,
        simulator: Arc<dyn BattleSimulator>,
        gateway: Arc<dyn NotificationGateway>,
        rules: GameRules,
    ) -> Self {
        Self {
            rooms,
            minions,
            simulator,
            gateway,
            rules,
            drivers: Mutex::new(HashMap::new()),
        }
    }

    /// Take over a room that just entered `Playing` at round 1 and spawn its
    /// round driver.
    pub async fn start_game(self: &Arc<Self>, room_id: &RoomId) -> Result<()> {
        let room = self.rooms.get_room(room_id).await?;
        if room.status != RoomStatus::Playing || room.round != 1 {
            return Err(LobbyError::StateConflict {
                entity: "room".to_string(),
                reason: format!(
                    "room {} is not at the start of play (status {}, round {})",
                    room_id, room.status, room.round
                ),
            }
            .into());
        }

        info!("Starting round loop for room {}", room_id);
        self.gateway.publish(
            topics::GAME,
            LobbyEvent::GameStarted {
                room_id: *room_id,
                round: 1,
            },
        );

        // Round-1 coins and shops are granted before the caller sees the
        // room as playing; a player acting on the start response can spend
        // immediately
        self.enter_preparation(room_id, 1).await?;
        self.spawn_driver(*room_id);
        Ok(())
    }

    fn spawn_driver(self: &Arc<Self>, room_id: RoomId) {
        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            // Round 1 is already in preparation when the driver takes over
            let mut round = 1u32;
            loop {
                tokio::time::sleep(scheduler.rules.preparation_duration()).await;

                match scheduler.resolve_combat(&room_id, round).await {
                    Ok(true) => break,
                    Ok(false) => round += 1,
                    Err(e) if is_state_conflict(&e) => {
                        debug!("Combat for room {} round {} already handled", room_id, round);
                        break;
                    }
                    Err(e) => {
                        error!("Combat resolution failed for room {}: {}", room_id, e);
                        break;
                    }
                }

                match scheduler.enter_preparation(&room_id, round).await {
                    Ok(()) => {}
                    Err(e) if is_state_conflict(&e) => {
                        debug!("Room {} left the round loop at round {}", room_id, round);
                        break;
                    }
                    Err(e) => {
                        error!("Preparation entry failed for room {}: {}", room_id, e);
                        break;
                    }
                }
            }

            if let Ok(mut drivers) = scheduler.drivers.lock() {
                drivers.remove(&room_id);
            }
        });

        if let Ok(mut drivers) = self.drivers.lock() {
            drivers.insert(room_id, handle);
        }
    }

    /// Apply the preparation entry actions for `round`: grant coins and roll
    /// a fresh shop for every active seat.
    pub async fn enter_preparation(&self, room_id: &RoomId, round: u32) -> Result<()> {
        // Catalog rolls happen before the guarded write so no I/O runs under
        // the store lock
        let room = self.rooms.get_room(room_id).await?;
        let mut shops: HashMap<SeatId, Vec<Minion>> = HashMap::new();
        for seat in room.active_seats() {
            let shop = self
                .minions
                .roll(seat.tavern_tier, self.rules.shop_size)
                .await?;
            shops.insert(seat.id().to_string(), shop);
        }

        let coins = self.rules.coins_for_round(round);
        self.rooms
            .try_advance(room_id, RoomStatus::Playing, &move |room| {
                if room.phase != Some(GamePhase::Preparation) || room.round != round {
                    return Err(LobbyError::StateConflict {
                        entity: "room".to_string(),
                        reason: format!(
                            "expected preparation round {}, found {:?} round {}",
                            round, room.phase, room.round
                        ),
                    }
                    .into());
                }
                for seat in room.seats.iter_mut().filter(|s| s.is_active()) {
                    seat.coins = coins;
                    seat.hero_power_used = false;
                    if let Some(shop) = shops.get(seat.id()) {
                        seat.shop = shop.clone();
                    }
                }
                Ok(())
            })
            .await?;

        info!(
            "Room {} entered preparation for round {} ({} coins)",
            room_id, round, coins
        );
        self.gateway.publish(
            topics::GAME,
            LobbyEvent::PreparationStarted {
                room_id: *room_id,
                round,
            },
        );
        Ok(())
    }

    /// Snapshot the room, rejecting anything outside a preparation window
    async fn preparation_room(&self, room_id: &RoomId, action: &str) -> Result<Room> {
        let room = self.rooms.get_room(room_id).await?;
        if !Self::in_preparation(&room) {
            return Err(LobbyError::StateConflict {
                entity: "room".to_string(),
                reason: format!("{} is only available during preparation", action),
            }
            .into());
        }
        Ok(room)
    }

    fn in_preparation(room: &Room) -> bool {
        room.status == RoomStatus::Playing && room.phase == Some(GamePhase::Preparation)
    }

    /// Commit a seat patch only while the room is still in preparation; the
    /// phase check and the write happen under one store lock
    async fn commit_in_preparation(
        &self,
        room_id: &RoomId,
        seat_id: &str,
        patch: &(dyn Fn(&mut Seat) -> Result<()> + Send + Sync),
    ) -> Result<Room> {
        self.rooms
            .update_seat_when(room_id, seat_id, &Self::in_preparation, patch)
            .await
    }

    /// Reroll one seat's shop for the refresh cost. The coin check and the
    /// shop swap commit together; an underfunded seat keeps its current shop.
    pub async fn refresh_shop(&self, room_id: &RoomId, seat_id: &str) -> Result<Room> {
        let room = self.preparation_room(room_id, "shop refresh").await?;
        let seat = room
            .seat(seat_id)
            .ok_or_else(|| LobbyError::seat_not_found(seat_id))?;
        let new_shop = self
            .minions
            .roll(seat.tavern_tier, self.rules.shop_size)
            .await?;

        let cost = self.rules.refresh_cost;
        let updated = self
            .commit_in_preparation(room_id, seat_id, &move |seat| {
                if seat.coins < cost {
                    return Err(LobbyError::ResourceExhausted {
                        reason: format!("seat {} cannot afford a refresh", seat.id()),
                    }
                    .into());
                }
                seat.coins -= cost;
                seat.shop = new_shop.clone();
                Ok(())
            })
            .await?;

        debug!("Seat '{}' refreshed its shop in room {}", seat_id, room_id);
        Ok(updated)
    }

    /// Buy a minion out of the seat's shop into its hand
    pub async fn buy_minion(
        &self,
        room_id: &RoomId,
        seat_id: &str,
        minion_id: &str,
    ) -> Result<Room> {
        self.preparation_room(room_id, "buying").await?;

        let cost = self.rules.minion_cost;
        let wanted = minion_id.to_string();
        let updated = self
            .commit_in_preparation(room_id, seat_id, &move |seat| {
                let idx = seat
                    .shop
                    .iter()
                    .position(|m| m.id == wanted)
                    .ok_or_else(|| LobbyError::Validation {
                        reason: format!("minion {} is not in the shop", wanted),
                    })?;
                if seat.coins < cost {
                    return Err(LobbyError::ResourceExhausted {
                        reason: format!("seat {} cannot afford a minion", seat.id()),
                    }
                    .into());
                }
                seat.coins -= cost;
                let minion = seat.shop.remove(idx);
                seat.hand.push(minion);
                Ok(())
            })
            .await?;

        debug!("Seat '{}' bought {} in room {}", seat_id, minion_id, room_id);
        Ok(updated)
    }

    /// Move a minion from the seat's hand onto its board
    pub async fn play_minion(
        &self,
        room_id: &RoomId,
        seat_id: &str,
        minion_id: &str,
    ) -> Result<Room> {
        self.preparation_room(room_id, "playing a minion").await?;

        let wanted = minion_id.to_string();
        let updated = self
            .commit_in_preparation(room_id, seat_id, &move |seat| {
                let idx = seat
                    .hand
                    .iter()
                    .position(|m| m.id == wanted)
                    .ok_or_else(|| LobbyError::Validation {
                        reason: format!("minion {} is not in hand", wanted),
                    })?;
                let minion = seat.hand.remove(idx);
                seat.board.push(minion);
                Ok(())
            })
            .await?;

        debug!("Seat '{}' played {} in room {}", seat_id, minion_id, room_id);
        Ok(updated)
    }

    /// Sell a minion off the board or out of hand for the refund
    pub async fn sell_minion(
        &self,
        room_id: &RoomId,
        seat_id: &str,
        minion_id: &str,
    ) -> Result<Room> {
        self.preparation_room(room_id, "selling").await?;

        let refund = self.rules.minion_sell_refund;
        let wanted = minion_id.to_string();
        let updated = self
            .commit_in_preparation(room_id, seat_id, &move |seat| {
                if let Some(idx) = seat.board.iter().position(|m| m.id == wanted) {
                    seat.board.remove(idx);
                } else if let Some(idx) = seat.hand.iter().position(|m| m.id == wanted) {
                    seat.hand.remove(idx);
                } else {
                    return Err(LobbyError::Validation {
                        reason: format!("minion {} is not owned by this seat", wanted),
                    }
                    .into());
                }
                seat.coins += refund;
                Ok(())
            })
            .await?;

        debug!("Seat '{}' sold {} in room {}", seat_id, minion_id, room_id);
        Ok(updated)
    }

    /// Flip `round` from preparation into combat, resolve every matchup, and
    /// either finish the room or advance it into the next preparation.
    /// Returns true when the game ended.
    pub async fn resolve_combat(&self, room_id: &RoomId, round: u32) -> Result<bool> {
        // Guarded flip; a stale timer loses here and nowhere else
        let room = self.rooms
            .try_advance(room_id, RoomStatus::Playing, &move |room| {
                if room.phase != Some(GamePhase::Preparation) || room.round != round {
                    return Err(LobbyError::StateConflict {
                        entity: "room".to_string(),
                        reason: format!(
                            "combat for round {} raced another transition",
                            round
                        ),
                    }
                    .into());
                }
                room.phase = Some(GamePhase::Combat);
                Ok(())
            })
            .await?;

        info!("Room {} entered combat for round {}", room_id, round);
        self.gateway.publish(
            topics::GAME,
            LobbyEvent::CombatStarted {
                room_id: *room_id,
                round,
            },
        );

        let active_ids: Vec<SeatId> = room
            .active_seats()
            .iter()
            .map(|s| s.id().to_string())
            .collect();
        let outcomes = self.simulate_matchups(&room, &active_ids);

        // Apply all damage and the round advance in one guarded write
        let applying = outcomes.clone();
        let updated = self.rooms
            .try_advance(room_id, RoomStatus::Playing, &move |room| {
                if room.phase != Some(GamePhase::Combat) || room.round != round {
                    return Err(LobbyError::StateConflict {
                        entity: "room".to_string(),
                        reason: format!("combat application for round {} raced", round),
                    }
                    .into());
                }

                for outcome in &applying {
                    if let Some(loser) = &outcome.loser {
                        if let Some(seat) = room.seat_mut(loser) {
                            seat.health -= outcome.damage as i32;
                        }
                    }
                }
                let eliminated = room.sweep_eliminations();
                if !eliminated.is_empty() {
                    debug!("Eliminated this round: {:?}", eliminated);
                }

                if room.is_decided() {
                    let winner = room.survivor();
                    room.finish(winner)?;
                } else {
                    room.round = round + 1;
                    room.phase = Some(GamePhase::Preparation);
                }
                Ok(())
            })
            .await?;

        for outcome in outcomes {
            self.gateway.publish(
                topics::GAME,
                LobbyEvent::BattleResolved {
                    room_id: *room_id,
                    round,
                    outcome,
                },
            );
        }

        if updated.status == RoomStatus::Finished {
            info!(
                "Room {} finished after round {}, winner: {:?}",
                room_id, round, updated.winner
            );
            self.gateway.publish(
                topics::GAME,
                LobbyEvent::GameEnded {
                    room_id: *room_id,
                    winner: updated.winner.clone(),
                },
            );
            return Ok(true);
        }
        Ok(false)
    }

    fn simulate_matchups(&self, room: &Room, active_ids: &[SeatId]) -> Vec<BattleOutcome> {
        pair_seats(active_ids)
            .into_iter()
            .filter_map(|(first, second)| {
                let attacker = room.seat(&first)?;
                let defender = second.as_deref().and_then(|id| room.seat(id));
                Some(self.simulator.simulate(attacker, defender))
            })
            .collect()
    }

    /// Abort a room's driver, e.g. on shutdown
    pub fn stop_driver(&self, room_id: &RoomId) {
        if let Ok(mut drivers) = self.drivers.lock() {
            if let Some(handle) = drivers.remove(room_id) {
                handle.abort();
            }
        }
    }

    /// Number of rooms currently being driven
    pub fn active_drivers(&self) -> usize {
        self.drivers.lock().map(|d| d.len()).unwrap_or(0)
    }
}

impl Drop for PhaseScheduler {
    fn drop(&mut self) {
        if let Ok(drivers) = self.drivers.lock() {
            for handle in drivers.values() {
                handle.abort();
            }
        }
    }
}
