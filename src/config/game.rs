//! Game rule constants
//!
//! Tunable rules of the auto-battler round loop. Defaults mirror the live
//! game; deployments override individual values through TOML config.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rules governing seats, economy, and phase timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRules {
    /// Seats per room
    pub room_size: usize,
    /// Coins granted when a seat enters its first preparation phase
    pub initial_coins: u32,
    /// Base of the per-round coin grant: min(max_coins, base_coins + round)
    pub base_coins: u32,
    /// Per-round coin grant ceiling
    pub max_coins: u32,
    /// Starting seat health
    pub initial_health: i32,
    /// Lowest tavern tier
    pub min_tavern_tier: u8,
    /// Highest tavern tier
    pub max_tavern_tier: u8,
    /// Cost of a shop refresh in coins
    pub refresh_cost: u32,
    /// Cost of buying a minion from the shop
    pub minion_cost: u32,
    /// Coins returned when a minion is sold
    pub minion_sell_refund: u32,
    /// Minions offered per shop roll
    pub shop_size: usize,
    /// Hero candidates offered to each seat
    pub hero_candidates: usize,
    /// Hero selection deadline in seconds
    pub selection_deadline_seconds: u64,
    /// Preparation phase duration in seconds
    pub preparation_seconds: u64,
    /// Bot rating jitter half-width around the seeding human's rating
    pub bot_rating_jitter: f64,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            room_size: 8,
            initial_coins: 3,
            base_coins: 3,
            max_coins: 10,
            initial_health: 40,
            min_tavern_tier: 1,
            max_tavern_tier: 6,
            refresh_cost: 1,
            minion_cost: 3,
            minion_sell_refund: 1,
            shop_size: 3,
            hero_candidates: 4,
            selection_deadline_seconds: 10,
            preparation_seconds: 30,
            bot_rating_jitter: 50.0,
        }
    }
}

impl GameRules {
    /// Coins granted at the start of the given round (1-based)
    pub fn coins_for_round(&self, round: u32) -> u32 {
        if round <= 1 {
            self.initial_coins
        } else {
            (self.base_coins + round).min(self.max_coins)
        }
    }

    /// Hero selection deadline as Duration
    pub fn selection_deadline(&self) -> Duration {
        Duration::from_secs(self.selection_deadline_seconds)
    }

    /// Preparation phase duration as Duration
    pub fn preparation_duration(&self) -> Duration {
        Duration::from_secs(self.preparation_seconds)
    }

    /// Validate rule values
    pub fn validate(&self) -> Result<()> {
        if self.room_size < 2 {
            return Err(anyhow!("Room size must be at least 2"));
        }
        if self.max_coins < self.initial_coins {
            return Err(anyhow!("Max coins cannot be below initial coins"));
        }
        if self.initial_health <= 0 {
            return Err(anyhow!("Initial health must be positive"));
        }
        if self.min_tavern_tier == 0 || self.max_tavern_tier < self.min_tavern_tier {
            return Err(anyhow!(
                "Tavern tier range invalid: {}..{}",
                self.min_tavern_tier,
                self.max_tavern_tier
            ));
        }
        if self.shop_size == 0 {
            return Err(anyhow!("Shop size must be greater than 0"));
        }
        if self.minion_cost == 0 {
            return Err(anyhow!("Minion cost must be greater than 0"));
        }
        if self.hero_candidates == 0 {
            return Err(anyhow!("Hero candidate count must be greater than 0"));
        }
        if self.selection_deadline_seconds == 0 {
            return Err(anyhow!("Selection deadline must be greater than 0"));
        }
        if self.preparation_seconds == 0 {
            return Err(anyhow!("Preparation duration must be greater than 0"));
        }
        if self.bot_rating_jitter < 0.0 {
            return Err(anyhow!("Bot rating jitter cannot be negative"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(GameRules::default().validate().is_ok());
    }

    #[test]
    fn test_coins_for_round() {
        let rules = GameRules::default();
        // Round 1 uses the distinct initial grant
        assert_eq!(rules.coins_for_round(1), 3);
        assert_eq!(rules.coins_for_round(2), 5);
        assert_eq!(rules.coins_for_round(5), 8);
        assert_eq!(rules.coins_for_round(7), 10);
        // Capped thereafter
        assert_eq!(rules.coins_for_round(8), 10);
        assert_eq!(rules.coins_for_round(50), 10);
    }

    #[test]
    fn test_invalid_tier_range_rejected() {
        let rules = GameRules {
            min_tavern_tier: 3,
            max_tavern_tier: 2,
            ..GameRules::default()
        };
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_max_coins_below_initial_rejected() {
        let rules = GameRules {
            initial_coins: 5,
            max_coins: 4,
            ..GameRules::default()
        };
        assert!(rules.validate().is_err());
    }
}
