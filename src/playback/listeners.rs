//! Shared listener count.
//!
//! Connect/disconnect events from any number of server processes funnel into
//! one cache-backed counter using the backend's atomic increment and
//! floor-zero decrement. An unreachable cache reads as zero listeners, which
//! selection treats as "tiering disabled" rather than an error.

use crate::cache::{CacheBackend, CacheKeys};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

pub struct ListenerCounter {
    cache: Arc<dyn CacheBackend>,
    keys: CacheKeys,
    warned: AtomicBool,
}

impl ListenerCounter {
    pub fn new(cache: Arc<dyn CacheBackend>, station_id: &str) -> Self {
        Self {
            cache,
            keys: CacheKeys::new(station_id),
            warned: AtomicBool::new(false),
        }
    }

    fn degraded(&self, context: &str, e: impl std::fmt::Display) -> u64 {
        if !self.warned.swap(true, Ordering::SeqCst) {
            warn!("Listener counter unavailable ({context}), reporting 0: {e}");
        }
        0
    }

    pub fn increment(&self) -> u64 {
        match self.cache.incr(&self.keys.listener_count()) {
            Ok(count) => {
                self.warned.store(false, Ordering::SeqCst);
                let count = count.max(0) as u64;
                crate::server::metrics::set_listener_count(count);
                count
            }
            Err(e) => self.degraded("increment", e),
        }
    }

    pub fn decrement(&self) -> u64 {
        match self.cache.decr_floor_zero(&self.keys.listener_count()) {
            Ok(count) => {
                self.warned.store(false, Ordering::SeqCst);
                let count = count.max(0) as u64;
                crate::server::metrics::set_listener_count(count);
                count
            }
            Err(e) => self.degraded("decrement", e),
        }
    }

    pub fn current(&self) -> u64 {
        match self.cache.get(&self.keys.listener_count()) {
            Ok(value) => {
                self.warned.store(false, Ordering::SeqCst);
                value
                    .and_then(|s| s.parse::<i64>().ok())
                    .unwrap_or(0)
                    .max(0) as u64
            }
            Err(e) => self.degraded("read", e),
        }
    }
}
