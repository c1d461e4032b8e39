//! Persistence traits for rooms, queue entries, and bots
//!
//! Every store is a trait so the core can run against the in-memory
//! implementation in tests and a real backend in production. The room store's
//! `update_if` is the concurrency primitive the whole engine leans on: a
//! predicate-guarded read-modify-write that rejects with a state conflict
//! instead of clobbering a transition that already happened.

pub mod memory;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::room::Room;
use crate::types::{BotIdentity, PlayerId, QueueEntry, RoomId};

pub use memory::{InMemoryBotStore, InMemoryQueueStore, InMemoryRoomStore};

/// Guard evaluated against the current room before a mutation is applied
pub type RoomPredicate<'a> = &'a (dyn Fn(&Room) -> bool + Send + Sync);

/// Mutation applied under the store lock; an Err leaves the room untouched
pub type RoomMutation<'a> = &'a (dyn Fn(&mut Room) -> Result<()> + Send + Sync);

/// Storage for room aggregates
#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn insert(&self, room: Room) -> Result<()>;

    async fn get(&self, id: &RoomId) -> Result<Option<Room>>;

    async fn remove(&self, id: &RoomId) -> Result<()>;

    async fn list(&self) -> Result<Vec<Room>>;

    /// Room currently seating the given occupant, if any
    async fn find_by_occupant(&self, occupant_id: &str) -> Result<Option<Room>>;

    /// Atomically mutate a room when `predicate` holds. Returns the updated
    /// room, `NotFound` if the id is unknown, or `StateConflict` when the
    /// predicate rejects. The mutation runs on a copy; an error from it
    /// leaves the stored room unchanged.
    async fn update_if(
        &self,
        id: &RoomId,
        predicate: RoomPredicate<'_>,
        mutate: RoomMutation<'_>,
    ) -> Result<Room>;

    /// Drop rooms whose last update is older than `ttl`. Returns the number
    /// removed.
    async fn purge_stale(&self, ttl: Duration) -> Result<usize>;

    async fn count(&self) -> Result<usize>;
}

/// Storage for matchmaking queue entries, keyed by player id
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert a new waiting entry. Rejects a player who already has a
    /// waiting or matched entry.
    async fn insert(&self, entry: QueueEntry) -> Result<()>;

    async fn get(&self, player_id: &str) -> Result<Option<QueueEntry>>;

    /// Cancel a waiting entry. Rejects when the entry is absent or already
    /// matched.
    async fn cancel(&self, player_id: &str) -> Result<QueueEntry>;

    /// All waiting entries, oldest first
    async fn waiting(&self) -> Result<Vec<QueueEntry>>;

    /// Atomically move the given entries from waiting to matched. If any of
    /// them is not currently waiting the whole claim fails and nothing
    /// changes.
    async fn claim(&self, player_ids: &[PlayerId]) -> Result<Vec<QueueEntry>>;

    /// Return previously claimed entries to waiting, preserving their
    /// original enqueue order. Rollback path for failed room formation.
    async fn release(&self, player_ids: &[PlayerId]) -> Result<()>;

    /// Drop waiting entries older than `ttl` and any terminal entries.
    /// Returns the number removed.
    async fn purge_stale(&self, ttl: Duration) -> Result<usize>;

    async fn count_waiting(&self) -> Result<usize>;
}

/// Storage for provisioned bot identities
#[async_trait]
pub trait BotStore: Send + Sync {
    async fn insert(&self, bot: BotIdentity) -> Result<()>;

    async fn get(&self, bot_id: &str) -> Result<Option<BotIdentity>>;

    async fn remove(&self, bot_id: &str) -> Result<()>;

    /// Display names of all live bots, for uniqueness checks
    async fn live_names(&self) -> Result<Vec<String>>;

    /// Drop bots past their expiry. Returns the number removed.
    async fn purge_expired(&self) -> Result<usize>;

    async fn count(&self) -> Result<usize>;
}
