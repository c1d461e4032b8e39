//! Error types for the lobby service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific lobby and match-orchestration scenarios
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    #[error("Validation failed: {reason}")]
    Validation { reason: String },

    #[error("State conflict on {entity}: {reason}")]
    StateConflict { entity: String, reason: String },

    #[error("Not found: {entity} {id}")]
    NotFound { entity: String, id: String },

    #[error("Permission denied: {reason}")]
    Permission { reason: String },

    #[error("Resource exhausted: {reason}")]
    ResourceExhausted { reason: String },

    #[error("Bot provisioning failed: {reason}")]
    Provision { reason: String },

    #[error("AMQP connection failed: {message}")]
    AmqpConnectionFailed { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl LobbyError {
    /// Shorthand for a room that does not exist
    pub fn room_not_found(id: impl std::fmt::Display) -> Self {
        LobbyError::NotFound {
            entity: "room".to_string(),
            id: id.to_string(),
        }
    }

    /// Shorthand for a missing queue entry
    pub fn entry_not_found(player_id: impl std::fmt::Display) -> Self {
        LobbyError::NotFound {
            entity: "queue entry".to_string(),
            id: player_id.to_string(),
        }
    }

    /// Shorthand for a seat that is not part of a room
    pub fn seat_not_found(seat_id: impl std::fmt::Display) -> Self {
        LobbyError::NotFound {
            entity: "seat".to_string(),
            id: seat_id.to_string(),
        }
    }

    /// True when the error is a guarded-transition rejection, which callers
    /// racing a timer are expected to swallow
    pub fn is_conflict(&self) -> bool {
        matches!(self, LobbyError::StateConflict { .. })
    }
}

/// Test whether an anyhow error is a swallowable guarded-transition rejection
pub fn is_state_conflict(err: &anyhow::Error) -> bool {
    err.downcast_ref::<LobbyError>()
        .map(LobbyError::is_conflict)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LobbyError::room_not_found("abc");
        assert_eq!(err.to_string(), "Not found: room abc");

        let err = LobbyError::StateConflict {
            entity: "room".to_string(),
            reason: "expected status waiting, found playing".to_string(),
        };
        assert!(err.to_string().contains("State conflict"));
    }

    #[test]
    fn test_conflict_detection() {
        let conflict: anyhow::Error = LobbyError::StateConflict {
            entity: "room".to_string(),
            reason: "already advanced".to_string(),
        }
        .into();
        assert!(is_state_conflict(&conflict));

        let other: anyhow::Error = LobbyError::Validation {
            reason: "bad hero".to_string(),
        }
        .into();
        assert!(!is_state_conflict(&other));
    }
}
