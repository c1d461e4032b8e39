//! Room aggregate and seat state
//!
//! This module contains the core room state machine: seats, status
//! transitions, and the invariants every transition preserves. All methods
//! here are pure state manipulation; persistence and timers live in the
//! manager layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::Minion;
use crate::config::GameRules;
use crate::error::{LobbyError, Result};
use crate::types::{GamePhase, HeroId, PlayerId, RoomId, RoomStatus, SeatId, SeatOccupant};
use crate::utils::{current_timestamp, generate_room_id};

/// A single seat in a room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seat {
    pub occupant: SeatOccupant,
    pub display_name: String,
    pub ready: bool,
    pub coins: u32,
    pub health: i32,
    pub tavern_tier: u8,
    pub board: Vec<Minion>,
    pub hand: Vec<Minion>,
    pub shop: Vec<Minion>,
    pub hero_candidates: Vec<HeroId>,
    pub selected_hero: Option<HeroId>,
    /// Set when the hero power fires; cleared at every preparation entry
    pub hero_power_used: bool,
    pub eliminated: bool,
}

impl Seat {
    fn new(occupant: SeatOccupant, display_name: String, rules: &GameRules) -> Self {
        Self {
            occupant,
            display_name,
            ready: false,
            coins: 0,
            health: rules.initial_health,
            tavern_tier: rules.min_tavern_tier,
            board: Vec::new(),
            hand: Vec::new(),
            shop: Vec::new(),
            hero_candidates: Vec::new(),
            selected_hero: None,
            hero_power_used: false,
            eliminated: false,
        }
    }

    /// Seat for a human player
    pub fn human(player_id: PlayerId, display_name: String, rules: &GameRules) -> Self {
        Self::new(SeatOccupant::Human { player_id }, display_name, rules)
    }

    /// Seat for a provisioned bot
    pub fn bot(bot_id: String, display_name: String, rules: &GameRules) -> Self {
        Self::new(SeatOccupant::Bot { bot_id }, display_name, rules)
    }

    /// Identity of the occupant, used to address the seat
    pub fn id(&self) -> &str {
        self.occupant.id()
    }

    /// A seat is active while it has not been eliminated
    pub fn is_active(&self) -> bool {
        !self.eliminated
    }
}

/// The room aggregate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub status: RoomStatus,
    /// Defined iff status is `Playing`
    pub phase: Option<GamePhase>,
    /// 1-based round counter
    pub round: u32,
    pub seats: Vec<Seat>,
    pub max_seats: usize,
    pub winner: Option<SeatId>,
    /// True for queue-formed rooms, false for hosted ones
    pub is_matchmade: bool,
    /// Host of a hosted room; None for matchmade rooms
    pub host: Option<PlayerId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    /// Create a hosted room in `Waiting` with the host already seated
    pub fn hosted(name: String, host: PlayerId, display_name: String, rules: &GameRules) -> Self {
        let now = current_timestamp();
        Self {
            id: generate_room_id(),
            name,
            status: RoomStatus::Waiting,
            phase: None,
            round: 1,
            seats: vec![Seat::human(host.clone(), display_name, rules)],
            max_seats: rules.room_size,
            winner: None,
            is_matchmade: false,
            host: Some(host),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a fully-seated matchmade room, born in `Selecting` with every
    /// seat already ready
    pub fn matchmade(name: String, mut seats: Vec<Seat>, rules: &GameRules) -> Self {
        for seat in &mut seats {
            seat.ready = true;
        }
        let now = current_timestamp();
        Self {
            id: generate_room_id(),
            name,
            status: RoomStatus::Selecting,
            phase: None,
            round: 1,
            seats,
            max_seats: rules.room_size,
            winner: None,
            is_matchmade: true,
            host: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn seat(&self, seat_id: &str) -> Option<&Seat> {
        self.seats.iter().find(|s| s.id() == seat_id)
    }

    pub fn seat_mut(&mut self, seat_id: &str) -> Option<&mut Seat> {
        self.seats.iter_mut().find(|s| s.id() == seat_id)
    }

    pub fn has_occupant(&self, seat_id: &str) -> bool {
        self.seat(seat_id).is_some()
    }

    pub fn is_full(&self) -> bool {
        self.seats.len() >= self.max_seats
    }

    /// Seats still in the game
    pub fn active_seats(&self) -> Vec<&Seat> {
        self.seats.iter().filter(|s| s.is_active()).collect()
    }

    pub fn human_count(&self) -> usize {
        self.seats.iter().filter(|s| s.occupant.is_human()).count()
    }

    pub fn all_ready(&self) -> bool {
        !self.seats.is_empty() && self.seats.iter().all(|s| s.ready)
    }

    /// True once every seat has confirmed a hero
    pub fn all_selected(&self) -> bool {
        !self.seats.is_empty() && self.seats.iter().all(|s| s.selected_hero.is_some())
    }

    pub fn touch(&mut self) {
        self.updated_at = current_timestamp();
    }

    /// Add a player to a waiting room
    pub fn add_player(
        &mut self,
        player_id: PlayerId,
        display_name: String,
        rules: &GameRules,
    ) -> Result<()> {
        if self.status != RoomStatus::Waiting {
            return Err(LobbyError::StateConflict {
                entity: "room".to_string(),
                reason: format!("cannot join a room in status {}", self.status),
            }
            .into());
        }
        if self.is_full() {
            return Err(LobbyError::ResourceExhausted {
                reason: format!("room {} is full", self.id),
            }
            .into());
        }
        if self.has_occupant(&player_id) {
            return Err(LobbyError::Validation {
                reason: format!("player {} is already seated", player_id),
            }
            .into());
        }

        self.seats.push(Seat::human(player_id, display_name, rules));
        self.touch();
        Ok(())
    }

    /// Remove a seat from a waiting room. Transfers the host role to the
    /// longest-seated remaining human when the host leaves. Returns the
    /// removed seat.
    pub fn remove_player(&mut self, player_id: &str) -> Result<Seat> {
        if self.status != RoomStatus::Waiting {
            return Err(LobbyError::StateConflict {
                entity: "room".to_string(),
                reason: format!("cannot leave a room in status {}", self.status),
            }
            .into());
        }

        let idx = self
            .seats
            .iter()
            .position(|s| s.id() == player_id)
            .ok_or_else(|| LobbyError::seat_not_found(player_id))?;
        let seat = self.seats.remove(idx);

        if self.host.as_deref() == Some(player_id) {
            self.host = self
                .seats
                .iter()
                .find(|s| s.occupant.is_human())
                .map(|s| s.id().to_string());
        }

        self.touch();
        Ok(seat)
    }

    /// Flip a seat's ready flag; only meaningful while waiting
    pub fn toggle_ready(&mut self, player_id: &str) -> Result<bool> {
        if self.status != RoomStatus::Waiting {
            return Err(LobbyError::StateConflict {
                entity: "room".to_string(),
                reason: format!("cannot change readiness in status {}", self.status),
            }
            .into());
        }

        let seat = self
            .seat_mut(player_id)
            .ok_or_else(|| LobbyError::seat_not_found(player_id))?;
        seat.ready = !seat.ready;
        let ready = seat.ready;
        self.touch();
        Ok(ready)
    }

    /// Move a hosted room from `Waiting` into `Selecting`. Requires the
    /// caller to be the host, at least two seats, and every seat ready.
    pub fn begin_selecting(&mut self, requested_by: &str) -> Result<()> {
        if self.status != RoomStatus::Waiting {
            return Err(LobbyError::StateConflict {
                entity: "room".to_string(),
                reason: format!("cannot start from status {}", self.status),
            }
            .into());
        }
        if self.host.as_deref() != Some(requested_by) {
            return Err(LobbyError::Permission {
                reason: format!("player {} is not the host", requested_by),
            }
            .into());
        }
        if self.seats.len() < 2 {
            return Err(LobbyError::Validation {
                reason: "at least two seats are required to start".to_string(),
            }
            .into());
        }
        if !self.all_ready() {
            return Err(LobbyError::Validation {
                reason: "all seats must be ready to start".to_string(),
            }
            .into());
        }

        self.status = RoomStatus::Selecting;
        self.touch();
        Ok(())
    }

    /// Move from `Selecting` into `Playing` at round 1, preparation phase
    pub fn begin_playing(&mut self) -> Result<()> {
        if self.status != RoomStatus::Selecting {
            return Err(LobbyError::StateConflict {
                entity: "room".to_string(),
                reason: format!("cannot begin play from status {}", self.status),
            }
            .into());
        }

        self.status = RoomStatus::Playing;
        self.phase = Some(GamePhase::Preparation);
        self.round = 1;
        self.touch();
        Ok(())
    }

    /// Terminal transition; records the winner and clears the phase
    pub fn finish(&mut self, winner: Option<SeatId>) -> Result<()> {
        if self.status == RoomStatus::Finished {
            return Err(LobbyError::StateConflict {
                entity: "room".to_string(),
                reason: "room is already finished".to_string(),
            }
            .into());
        }

        self.status = RoomStatus::Finished;
        self.phase = None;
        self.winner = winner;
        self.touch();
        Ok(())
    }

    /// Mark seats at or below zero health as eliminated. Returns the seat ids
    /// eliminated by this sweep.
    pub fn sweep_eliminations(&mut self) -> Vec<SeatId> {
        let mut eliminated = Vec::new();
        for seat in &mut self.seats {
            if !seat.eliminated && seat.health <= 0 {
                seat.eliminated = true;
                eliminated.push(seat.id().to_string());
            }
        }
        if !eliminated.is_empty() {
            self.touch();
        }
        eliminated
    }

    /// The room is decided when at most one active seat remains
    pub fn is_decided(&self) -> bool {
        self.active_seats().len() <= 1
    }

    /// Sole surviving seat id, if the room is decided
    pub fn survivor(&self) -> Option<SeatId> {
        let active = self.active_seats();
        if active.len() == 1 {
            Some(active[0].id().to_string())
        } else {
            None
        }
    }
}
