//! Short-lived deletion markers that suppress stale replays (§3).
//!
//! `removedPositions` and `completedOrders` are both instances of this same
//! shape: an id maps to the instant it was marked gone, and the marker
//! expires 5 minutes after insertion so a late-arriving, pre-removal update
//! cannot resurrect the entity forever.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Tombstone lifetime: a tombstone expires 5 minutes after insertion.
pub const TOMBSTONE_TTL: Duration = Duration::from_secs(5 * 60);

/// A map from entity id to removal time, self-evicting on every write.
#[derive(Debug, Default, Clone)]
pub struct TombstoneMap {
    removed_at: HashMap<String, Instant>,
}

impl TombstoneMap {
    /// An empty tombstone map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or refresh) a tombstone for `id` at `now`, then evict any
    /// tombstone older than [`TOMBSTONE_TTL`] — "on every tombstone write,
    /// evict tombstones older than 5 minutes" (§4.4).
    pub fn insert(&mut self, id: impl Into<String>, now: Instant) {
        self.removed_at.insert(id.into(), now);
        self.evict(now);
    }

    /// Whether `id` currently carries a live tombstone.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.removed_at.contains_key(id)
    }

    /// Drop every tombstone older than [`TOMBSTONE_TTL`] relative to `now`.
    pub fn evict(&mut self, now: Instant) {
        self.removed_at
            .retain(|_, &mut removed_at| now.duration_since(removed_at) < TOMBSTONE_TTL);
    }

    /// Remove every tombstone unconditionally (used by
    /// `onPositionsSynchronized`/`onPendingOrdersSynchronized`, §4.4).
    pub fn clear(&mut self) {
        self.removed_at.clear();
    }

    /// Number of live tombstones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.removed_at.len()
    }

    /// Whether no tombstones are currently held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removed_at.is_empty()
    }
}
