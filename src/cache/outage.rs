//! Cache wrapper that can simulate a backend outage.
//!
//! Wraps any [`CacheBackend`] and, while marked down, answers every call
//! with [`CacheError::Unavailable`]. Used to exercise the durable-only
//! degradation paths without a real network cache in the loop.

use super::{CacheBackend, CacheError, CacheResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct OutageCache {
    inner: Arc<dyn CacheBackend>,
    down: AtomicBool,
}

impl OutageCache {
    pub fn new(inner: Arc<dyn CacheBackend>) -> Self {
        Self {
            inner,
            down: AtomicBool::new(false),
        }
    }

    /// Flip the simulated outage on or off.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> CacheResult<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(CacheError::Unavailable("simulated outage".to_string()))
        } else {
            Ok(())
        }
    }
}

impl CacheBackend for OutageCache {
    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.check()?;
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        self.check()?;
        self.inner.set(key, value, ttl)
    }

    fn delete(&self, key: &str) -> CacheResult<()> {
        self.check()?;
        self.inner.delete(key)
    }

    fn incr(&self, key: &str) -> CacheResult<i64> {
        self.check()?;
        self.inner.incr(key)
    }

    fn decr_floor_zero(&self, key: &str) -> CacheResult<i64> {
        self.check()?;
        self.inner.decr_floor_zero(key)
    }

    fn list_replace(&self, key: &str, items: &[String], ttl: Option<Duration>) -> CacheResult<()> {
        self.check()?;
        self.inner.list_replace(key, items, ttl)
    }

    fn list_pop_front(&self, key: &str) -> CacheResult<Option<String>> {
        self.check()?;
        self.inner.list_pop_front(key)
    }

    fn list_items(&self, key: &str) -> CacheResult<Vec<String>> {
        self.check()?;
        self.inner.list_items(key)
    }
}
