//! Free-rotation stack.
//!
//! A shuffled FIFO of rotation-eligible track ids living in the cache with a
//! bounded lifetime. Draining pops the head; emptying deletes the backing
//! entry so `is_empty` stays an existence check. When the stack runs out the
//! caller refills it with a freshly shuffled pool.

use crate::cache::{CacheBackend, CacheKeys, CacheResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;

/// Deterministically shuffle a pool of track ids with the given seed.
///
/// The seed is recorded in the decision log so a rotation order can be
/// reproduced after the fact.
pub fn shuffled(track_ids: &[String], seed: u64) -> Vec<String> {
    let mut ids = track_ids.to_vec();
    let mut rng = StdRng::seed_from_u64(seed);
    ids.shuffle(&mut rng);
    ids
}

pub struct RotationStack {
    cache: Arc<dyn CacheBackend>,
    keys: CacheKeys,
    ttl: Duration,
}

impl RotationStack {
    pub fn new(cache: Arc<dyn CacheBackend>, station_id: &str, ttl: Duration) -> Self {
        Self {
            cache,
            keys: CacheKeys::new(station_id),
            ttl,
        }
    }

    /// Bulk-replace the stack contents and reset its lifetime.
    pub fn refill(&self, track_ids: &[String]) -> CacheResult<()> {
        self.cache
            .list_replace(&self.keys.rotation_stack(), track_ids, Some(self.ttl))
    }

    /// Remove and return the head. `None` means empty (or expired): the
    /// caller falls through to the next-lower-priority pool.
    pub fn pop_next(&self) -> CacheResult<Option<String>> {
        self.cache.list_pop_front(&self.keys.rotation_stack())
    }

    /// Look at the head without consuming it.
    pub fn peek_next(&self) -> CacheResult<Option<String>> {
        Ok(self
            .cache
            .list_items(&self.keys.rotation_stack())?
            .into_iter()
            .next())
    }

    /// Snapshot of everything still queued, front first.
    pub fn remaining(&self) -> CacheResult<Vec<String>> {
        self.cache.list_items(&self.keys.rotation_stack())
    }

    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.remaining()?.is_empty())
    }

    pub fn clear(&self) -> CacheResult<()> {
        self.cache.delete(&self.keys.rotation_stack())
    }
}
