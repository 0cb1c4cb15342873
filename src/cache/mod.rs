//! Cache backend port.
//!
//! The hot path for station state goes through a shared cache; the durable
//! store remains the source of truth. Everything above this module talks to
//! the [`CacheBackend`] trait so the backing implementation (in-process
//! memory today, a networked cache tomorrow) can be swapped without touching
//! playback or scheduling code.

mod keys;
mod memory;
mod outage;

pub use keys::CacheKeys;
pub use memory::MemoryCache;
pub use outage::OutageCache;

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by a cache backend.
///
/// Callers are expected to treat `Unavailable` as a degradation signal, not
/// a fatal condition: the durable store can answer every question the cache
/// can, just slower.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend cannot be reached at all.
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    /// The key exists but holds a value of the wrong shape for the
    /// requested operation (e.g. incrementing a list).
    #[error("cache key {key} does not hold a {expected}")]
    WrongKind { key: String, expected: &'static str },
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Operations the station core needs from a cache.
///
/// Values cross the boundary as strings (JSON for structured payloads).
/// `incr`/`decr_floor_zero` and `list_pop_front` must be atomic with respect
/// to concurrent callers; everything else is last-writer-wins.
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Set a value, optionally with a time-to-live. A `None` TTL means the
    /// entry never expires on its own.
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()>;

    fn delete(&self, key: &str) -> CacheResult<()>;

    /// Atomically increment a counter, creating it at 1 if absent.
    fn incr(&self, key: &str) -> CacheResult<i64>;

    /// Atomically decrement a counter, clamping at zero. A decrement of an
    /// absent counter leaves it at zero.
    fn decr_floor_zero(&self, key: &str) -> CacheResult<i64>;

    /// Replace the entire list stored at `key`.
    fn list_replace(&self, key: &str, items: &[String], ttl: Option<Duration>) -> CacheResult<()>;

    /// Atomically remove and return the head of the list. When the pop
    /// empties the list the backing entry is deleted, so existence checks
    /// stay cheap.
    fn list_pop_front(&self, key: &str) -> CacheResult<Option<String>>;

    /// Snapshot of the list contents, front first. Absent key reads as empty.
    fn list_items(&self, key: &str) -> CacheResult<Vec<String>>;
}
