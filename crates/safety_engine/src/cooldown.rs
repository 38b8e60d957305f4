//! Cooldown ledger: last emission frame per (subject, event type)

use std::collections::HashMap;

use contracts::{DedupKey, Subject, TrackId};

/// Cooldown that never expires on its own (cleared only by eviction)
pub const UNTIL_EVICTED: u64 = u64::MAX;

/// Time-indexed de-duplication map
#[derive(Debug, Default)]
pub struct CooldownLedger {
    last_emitted: HashMap<DedupKey, u64>,
}

impl CooldownLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an emission for `key` at `frame` unless the previous one is
    /// still within `cooldown` frames. Returns whether the caller may emit.
    pub fn try_acquire(&mut self, key: DedupKey, frame: u64, cooldown: u64) -> bool {
        if !self.is_ready(&key, frame, cooldown) {
            return false;
        }
        self.last_emitted.insert(key, frame);
        true
    }

    /// Whether `key` is free to emit at `frame`
    pub fn is_ready(&self, key: &DedupKey, frame: u64, cooldown: u64) -> bool {
        match self.last_emitted.get(key) {
            Some(&last) => frame.saturating_sub(last) >= cooldown,
            None => true,
        }
    }

    pub fn last_emitted(&self, key: &DedupKey) -> Option<u64> {
        self.last_emitted.get(key).copied()
    }

    /// Drop every entry for a deleted track
    pub fn evict_track(&mut self, track_id: TrackId) {
        self.last_emitted
            .retain(|key, _| key.subject != Subject::Track(track_id));
    }

    /// Drop every entry for an expired hazard cluster
    pub fn evict_cluster(&mut self, cluster_id: u64) {
        self.last_emitted
            .retain(|key, _| key.subject != Subject::HazardCluster(cluster_id));
    }

    pub fn len(&self) -> usize {
        self.last_emitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_emitted.is_empty()
    }
}
