//! Common types used throughout the lobby service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for human players (issued by the identity service)
pub type PlayerId = String;

/// Unique identifier for bots (always carries the `bot_` prefix)
pub type BotId = String;

/// Unique identifier for rooms
pub type RoomId = Uuid;

/// Unique identifier for heroes in the content catalog
pub type HeroId = String;

/// A seat is addressed by its occupant's id
pub type SeatId = String;

/// Who (or what) occupies a seat
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SeatOccupant {
    Human { player_id: PlayerId },
    Bot { bot_id: BotId },
    /// Placeholder opponent for an odd seat-out during combat; never seated
    Ghost,
}

impl SeatOccupant {
    /// Identity of the occupant, used as the seat id
    pub fn id(&self) -> &str {
        match self {
            SeatOccupant::Human { player_id } => player_id,
            SeatOccupant::Bot { bot_id } => bot_id,
            SeatOccupant::Ghost => "ghost",
        }
    }

    pub fn is_bot(&self) -> bool {
        matches!(self, SeatOccupant::Bot { .. })
    }

    pub fn is_human(&self) -> bool {
        matches!(self, SeatOccupant::Human { .. })
    }
}

/// Lifecycle status of a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Host lobby collecting players
    Waiting,
    /// Hero selection sub-phase
    Selecting,
    /// Round loop running; `phase` is defined
    Playing,
    /// Terminal; `winner` is set
    Finished,
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomStatus::Waiting => write!(f, "waiting"),
            RoomStatus::Selecting => write!(f, "selecting"),
            RoomStatus::Playing => write!(f, "playing"),
            RoomStatus::Finished => write!(f, "finished"),
        }
    }
}

/// Round sub-phase, defined iff status is `Playing`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Preparation,
    Combat,
}

impl std::fmt::Display for GamePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GamePhase::Preparation => write!(f, "preparation"),
            GamePhase::Combat => write!(f, "combat"),
        }
    }
}

/// Status of a matchmaking queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Waiting,
    Matched,
    Cancelled,
}

/// A player waiting in the matchmaking queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub player_id: PlayerId,
    pub display_name: String,
    /// Rating snapshot taken at enqueue time; opaque to the core
    pub rating: f64,
    pub status: QueueStatus,
    pub enqueued_at: DateTime<Utc>,
}

/// An ephemeral synthetic opponent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotIdentity {
    pub bot_id: BotId,
    pub display_name: String,
    pub rating: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of a single simulated battle between two seats
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleOutcome {
    pub winner: SeatId,
    /// None when the loser was a ghost
    pub loser: Option<SeatId>,
    /// Health removed from the loser; 0 when there is no loser
    pub damage: u32,
}

/// Events published through the notification gateway.
///
/// Fire-and-forget: the realtime transport consumes these, the core never
/// waits on delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LobbyEvent {
    MatchFound {
        room_id: RoomId,
        players: Vec<PlayerId>,
    },
    PlayerJoinedRoom {
        room_id: RoomId,
        player_id: PlayerId,
    },
    PlayerLeftRoom {
        room_id: RoomId,
        player_id: PlayerId,
    },
    ReadyChanged {
        room_id: RoomId,
        player_id: PlayerId,
        ready: bool,
    },
    SelectionStarted {
        room_id: RoomId,
        deadline_seconds: u64,
    },
    HeroSelected {
        room_id: RoomId,
        seat_id: SeatId,
        hero_id: HeroId,
        all_selected: bool,
    },
    GameStarted {
        room_id: RoomId,
        round: u32,
    },
    PreparationStarted {
        room_id: RoomId,
        round: u32,
    },
    CombatStarted {
        room_id: RoomId,
        round: u32,
    },
    BattleResolved {
        room_id: RoomId,
        round: u32,
        outcome: BattleOutcome,
    },
    GameEnded {
        room_id: RoomId,
        winner: Option<SeatId>,
    },
}

/// Topic names for the notification gateway
pub mod topics {
    pub const LOBBY: &str = "lobby";
    pub const MATCHMAKING: &str = "matchmaking";
    pub const GAME: &str = "game";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occupant_ids() {
        let human = SeatOccupant::Human {
            player_id: "alice".to_string(),
        };
        let bot = SeatOccupant::Bot {
            bot_id: "bot_1".to_string(),
        };

        assert_eq!(human.id(), "alice");
        assert!(human.is_human());
        assert!(!human.is_bot());

        assert_eq!(bot.id(), "bot_1");
        assert!(bot.is_bot());

        assert_eq!(SeatOccupant::Ghost.id(), "ghost");
    }

    #[test]
    fn test_event_serialization() {
        let event = LobbyEvent::HeroSelected {
            room_id: Uuid::new_v4(),
            seat_id: "alice".to_string(),
            hero_id: "hero_pyromancer".to_string(),
            all_selected: false,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"hero_selected\""));

        let back: LobbyEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, LobbyEvent::HeroSelected { .. }));
    }
}
