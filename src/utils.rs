//! Utility functions for the lobby service

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::types::RoomId;

/// Generate a new unique room ID
pub fn generate_room_id() -> RoomId {
    Uuid::new_v4()
}

/// Generate a new bot ID with the canonical `bot_` prefix
pub fn generate_bot_id() -> String {
    format!("bot_{}", Uuid::new_v4())
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Rating bucket index for matchmaking: floor(rating / width)
pub fn rating_bucket(rating: f64, bucket_width: f64) -> i64 {
    (rating / bucket_width).floor() as i64
}

/// Calculate the absolute difference between two ratings
pub fn rating_difference(rating1: f64, rating2: f64) -> f64 {
    (rating1 - rating2).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_ids() {
        let id1 = generate_room_id();
        let id2 = generate_room_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_bot_id_prefix() {
        let id = generate_bot_id();
        assert!(id.starts_with("bot_"));
        assert_ne!(id, generate_bot_id());
    }

    #[test]
    fn test_rating_bucket() {
        assert_eq!(rating_bucket(0.0, 200.0), 0);
        assert_eq!(rating_bucket(199.9, 200.0), 0);
        assert_eq!(rating_bucket(200.0, 200.0), 1);
        assert_eq!(rating_bucket(1234.0, 200.0), 6);
        assert_eq!(rating_bucket(-1.0, 200.0), -1);
    }

    #[test]
    fn test_rating_difference() {
        assert_eq!(rating_difference(1500.0, 1400.0), 100.0);
        assert_eq!(rating_difference(1400.0, 1500.0), 100.0);
    }
}
