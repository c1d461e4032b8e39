//! Bot provisioning
//!
//! Synthesizes ephemeral bot identities used to backfill matchmade rooms.
//! Names are drawn from two fragment pools and kept unique across live bots;
//! ratings are jittered around the seeding player's rating so a backfilled
//! room still looks plausible.

use rand::seq::IndexedRandom;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::GameRules;
use crate::error::{LobbyError, Result};
use crate::storage::BotStore;
use crate::types::BotIdentity;
use crate::utils::{current_timestamp, generate_bot_id};

const NAME_PREFIXES: &[&str] = &[
    "Grim", "Swift", "Iron", "Silent", "Crimson", "Golden", "Shadow", "Storm", "Frost", "Ember",
    "Wild", "Noble", "Lucky", "Rogue", "Stone",
];

const NAME_SUFFIXES: &[&str] = &[
    "Tactician", "Gambler", "Baron", "Warden", "Merchant", "Knight", "Strategist", "Duelist",
    "Collector", "Vagrant", "Broker", "Champion", "Drifter", "Keeper", "Scholar",
];

/// Attempts at an unused name before provisioning fails
const NAME_ATTEMPTS: usize = 20;

/// Creates and retires bot identities
pub struct BotProvisioner {
    store: Arc<dyn BotStore>,
    rating_jitter: f64,
    ttl: Duration,
}

impl BotProvisioner {
    pub fn new(store: Arc<dyn BotStore>, rules: &GameRules, ttl: Duration) -> Self {
        Self {
            store,
            rating_jitter: rules.bot_rating_jitter,
            ttl,
        }
    }

    /// Provision `count` bots rated near `target_rating`. Every identity is
    /// persisted before it is returned; on any failure the bots created so
    /// far are discarded and the error surfaces.
    pub async fn provision(&self, count: usize, target_rating: f64) -> Result<Vec<BotIdentity>> {
        let mut taken: HashSet<String> = self.store.live_names().await?.into_iter().collect();
        let mut provisioned: Vec<BotIdentity> = Vec::with_capacity(count);

        for _ in 0..count {
            let bot = match self.synthesize(&taken, target_rating) {
                Ok(bot) => bot,
                Err(e) => {
                    warn!(
                        "Bot provisioning failed after {} of {} bots, discarding partial batch: {}",
                        provisioned.len(),
                        count,
                        e
                    );
                    self.discard(&provisioned).await;
                    return Err(e);
                }
            };
            taken.insert(bot.display_name.clone());

            if let Err(e) = self.store.insert(bot.clone()).await {
                warn!(
                    "Bot provisioning failed after {} of {} bots, discarding partial batch: {}",
                    provisioned.len(),
                    count,
                    e
                );
                self.discard(&provisioned).await;
                return Err(LobbyError::Provision {
                    reason: format!("failed to persist bot identity: {}", e),
                }
                .into());
            }
            provisioned.push(bot);
        }

        info!(
            "Provisioned {} bots around rating {:.0}",
            provisioned.len(),
            target_rating
        );
        Ok(provisioned)
    }

    /// Remove identities, e.g. when room formation rolls back. Best effort;
    /// anything missed is reclaimed by the TTL sweep.
    pub async fn discard(&self, bots: &[BotIdentity]) {
        for bot in bots {
            if let Err(e) = self.store.remove(&bot.bot_id).await {
                warn!("Failed to discard bot {}: {}", bot.bot_id, e);
            }
        }
    }

    /// Drop expired identities; run periodically
    pub async fn purge_expired(&self) -> Result<usize> {
        let removed = self.store.purge_expired().await?;
        if removed > 0 {
            debug!("Purged {} expired bot identities", removed);
        }
        Ok(removed)
    }

    fn synthesize(&self, taken: &HashSet<String>, target_rating: f64) -> Result<BotIdentity> {
        let mut rng = rand::rng();

        let mut display_name = Self::random_name(&mut rng);
        let mut attempts = 1;
        while taken.contains(&display_name) && attempts < NAME_ATTEMPTS {
            display_name = Self::random_name(&mut rng);
            attempts += 1;
        }
        if taken.contains(&display_name) {
            return Err(LobbyError::Provision {
                reason: format!(
                    "bot name pool exhausted after {} attempts",
                    NAME_ATTEMPTS
                ),
            }
            .into());
        }

        let jitter = if self.rating_jitter > 0.0 {
            rng.random_range(-self.rating_jitter..=self.rating_jitter)
        } else {
            0.0
        };

        let now = current_timestamp();
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::hours(1));

        Ok(BotIdentity {
            bot_id: generate_bot_id(),
            display_name,
            rating: (target_rating + jitter).max(0.0),
            created_at: now,
            expires_at: now + ttl,
        })
    }

    fn random_name(rng: &mut impl Rng) -> String {
        let prefix = NAME_PREFIXES.choose(rng).copied().unwrap_or("Grim");
        let suffix = NAME_SUFFIXES.choose(rng).copied().unwrap_or("Tactician");
        format!("{} {}", prefix, suffix)
    }
}
