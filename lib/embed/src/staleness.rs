//! Staleness tracking: decides when an entity needs re-embedding and
//! remembers which entities still have one pending.
//!
//! Multiple writes to the same entity in rapid succession may each schedule
//! a recompute; the tracker accepts redundant recomputation (at-least-once)
//! rather than risking a missed update that would leave an embedding
//! permanently stale.

use parking_lot::RwLock;
use std::collections::HashSet;
use std::hash::Hash;

/// Whether a write warrants re-embedding.
///
/// Always true for a brand-new entity (`old` is `None`); otherwise true iff
/// any designated semantic field differs. Field-level comparison avoids the
/// false negatives a hash-collision comparison could produce.
pub fn needs_reembed(old: Option<&[String]>, new: &[String]) -> bool {
    match old {
        None => true,
        Some(old) => old.len() != new.len() || old.iter().zip(new.iter()).any(|(a, b)| a != b),
    }
}

/// Set of entities whose stored embedding does not reflect their current
/// text. An entry is cleared only after a successful recompute-and-store;
/// a failed recompute leaves it pending so it can be retried later.
/// Pending entities are excluded from similarity ranking, never scored.
pub struct PendingSet<K: Eq + Hash + Copy> {
    pending: RwLock<HashSet<K>>,
}

impl<K: Eq + Hash + Copy> PendingSet<K> {
    pub fn new() -> Self {
        Self {
            pending: RwLock::new(HashSet::new()),
        }
    }

    pub fn mark(&self, key: K) {
        self.pending.write().insert(key);
    }

    /// Clear after a successful recompute. Returns whether the key was
    /// pending.
    pub fn clear(&self, key: K) -> bool {
        self.pending.write().remove(&key)
    }

    pub fn is_pending(&self, key: K) -> bool {
        self.pending.read().contains(&key)
    }

    pub fn len(&self) -> usize {
        self.pending.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.read().is_empty()
    }

    pub fn snapshot(&self) -> Vec<K> {
        self.pending.read().iter().copied().collect()
    }
}

impl<K: Eq + Hash + Copy> Default for PendingSet<K> {
    fn default() -> Self {
        Self::new()
    }
}
