//! Content catalog: heroes and minions
//!
//! The catalog is read-only game content. Traits keep the lobby core
//! independent of where the content lives; the static implementations ship a
//! built-in set suitable for development and tests.

use async_trait::async_trait;
use rand::seq::{IndexedRandom, SliceRandom};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::HeroId;

/// A selectable hero
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hero {
    pub id: HeroId,
    pub name: String,
    pub power: String,
}

/// A purchasable minion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Minion {
    pub id: String,
    pub name: String,
    pub tier: u8,
    pub attack: u32,
    pub health: u32,
}

/// Source of hero content
#[async_trait]
pub trait HeroCatalog: Send + Sync {
    /// Sample `count` distinct heroes uniformly at random
    async fn sample(&self, count: usize) -> Result<Vec<Hero>>;

    /// Look up a hero by id
    async fn get(&self, id: &str) -> Result<Option<Hero>>;
}

/// Source of minion content
#[async_trait]
pub trait MinionCatalog: Send + Sync {
    /// Roll `count` minions of tier `max_tier` or below, sampled with
    /// replacement across the eligible pool
    async fn roll(&self, max_tier: u8, count: usize) -> Result<Vec<Minion>>;
}

/// Built-in hero set
pub struct StaticHeroCatalog {
    heroes: Vec<Hero>,
}

impl StaticHeroCatalog {
    pub fn new() -> Self {
        let heroes = [
            ("hero_pyromancer", "Pyromancer", "Deal 2 damage to a random enemy minion"),
            ("hero_warden", "Iron Warden", "Give a friendly minion +2 health"),
            ("hero_trickster", "Trickster", "Your next refresh this turn is free"),
            ("hero_broker", "Coin Broker", "Gain 1 coin"),
            ("hero_beastcaller", "Beastcaller", "Summon a 1/1 wolf"),
            ("hero_chronomage", "Chronomage", "Freeze the shop for next turn"),
            ("hero_reaver", "Reaver", "Give a friendly minion +2 attack"),
            ("hero_alchemist", "Alchemist", "Transform a minion into one of the same tier"),
        ]
        .into_iter()
        .map(|(id, name, power)| Hero {
            id: id.to_string(),
            name: name.to_string(),
            power: power.to_string(),
        })
        .collect();

        Self { heroes }
    }

    pub fn len(&self) -> usize {
        self.heroes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heroes.is_empty()
    }
}

impl Default for StaticHeroCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HeroCatalog for StaticHeroCatalog {
    async fn sample(&self, count: usize) -> Result<Vec<Hero>> {
        let mut rng = rand::rng();
        let mut picked: Vec<Hero> = self
            .heroes
            .choose_multiple(&mut rng, count.min(self.heroes.len()))
            .cloned()
            .collect();
        picked.shuffle(&mut rng);
        Ok(picked)
    }

    async fn get(&self, id: &str) -> Result<Option<Hero>> {
        Ok(self.heroes.iter().find(|h| h.id == id).cloned())
    }
}

/// Built-in minion set covering tavern tiers 1 through 6
pub struct StaticMinionCatalog {
    minions: Vec<Minion>,
}

impl StaticMinionCatalog {
    pub fn new() -> Self {
        let minions = [
            ("minion_rat", "Alley Rat", 1, 1, 1),
            ("minion_squire", "Squire", 1, 1, 2),
            ("minion_imp", "Ember Imp", 1, 2, 1),
            ("minion_wolf", "Gray Wolf", 2, 2, 2),
            ("minion_harpy", "Harpy", 2, 3, 1),
            ("minion_golem_clay", "Clay Golem", 2, 1, 4),
            ("minion_knight", "Bannerknight", 3, 3, 3),
            ("minion_serpent", "Marsh Serpent", 3, 4, 2),
            ("minion_ogre", "Hill Ogre", 4, 4, 5),
            ("minion_wyvern", "Storm Wyvern", 4, 5, 3),
            ("minion_golem_iron", "Iron Golem", 5, 5, 7),
            ("minion_lich", "Pale Lich", 5, 7, 4),
            ("minion_dragon", "Elder Dragon", 6, 8, 8),
            ("minion_titan", "Sunken Titan", 6, 6, 10),
        ]
        .into_iter()
        .map(|(id, name, tier, attack, health)| Minion {
            id: id.to_string(),
            name: name.to_string(),
            tier,
            attack,
            health,
        })
        .collect();

        Self { minions }
    }
}

impl Default for StaticMinionCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MinionCatalog for StaticMinionCatalog {
    async fn roll(&self, max_tier: u8, count: usize) -> Result<Vec<Minion>> {
        let pool: Vec<&Minion> = self.minions.iter().filter(|m| m.tier <= max_tier).collect();
        if pool.is_empty() {
            return Ok(Vec::new());
        }

        let mut rng = rand::rng();
        let rolled = (0..count)
            .filter_map(|_| pool.choose(&mut rng).map(|m| (*m).clone()))
            .collect();
        Ok(rolled)
    }
}
