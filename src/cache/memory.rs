//! In-process cache backend.
//!
//! Keeps everything in a single mutex-guarded map with per-entry expiry
//! stamps. Expired entries are dropped lazily on access. Because the whole
//! map sits behind one lock, the counter and list operations are atomic
//! with respect to concurrent callers, which is all the station core
//! requires of a backend.

use super::{CacheBackend, CacheError, CacheResult};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Mutex-guarded map cache.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_live_entry<T>(
        &self,
        key: &str,
        f: impl FnOnce(Option<&mut Entry>, &mut HashMap<String, Entry>) -> CacheResult<T>,
    ) -> CacheResult<T> {
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();
        if entries.get(key).is_some_and(|e| e.expired(now)) {
            entries.remove(key);
        }
        // Split borrow: take the entry out, run the closure, put it back.
        match entries.remove(key) {
            Some(mut entry) => {
                let result = f(Some(&mut entry), &mut entries);
                entries.insert(key.to_string(), entry);
                result
            }
            None => f(None, &mut entries),
        }
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.with_live_entry(key, |entry, _| match entry {
            Some(Entry {
                value: Value::Text(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(CacheError::WrongKind {
                key: key.to_string(),
                expected: "text value",
            }),
            None => Ok(None),
        })
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    fn incr(&self, key: &str) -> CacheResult<i64> {
        self.with_live_entry(key, |entry, entries| match entry {
            Some(Entry {
                value: Value::Text(s),
                ..
            }) => {
                let current: i64 = s.parse().map_err(|_| CacheError::WrongKind {
                    key: key.to_string(),
                    expected: "integer counter",
                })?;
                let next = current + 1;
                *s = next.to_string();
                Ok(next)
            }
            Some(_) => Err(CacheError::WrongKind {
                key: key.to_string(),
                expected: "integer counter",
            }),
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Text("1".to_string()),
                        expires_at: None,
                    },
                );
                Ok(1)
            }
        })
    }

    fn decr_floor_zero(&self, key: &str) -> CacheResult<i64> {
        self.with_live_entry(key, |entry, entries| match entry {
            Some(Entry {
                value: Value::Text(s),
                ..
            }) => {
                let current: i64 = s.parse().map_err(|_| CacheError::WrongKind {
                    key: key.to_string(),
                    expected: "integer counter",
                })?;
                let next = (current - 1).max(0);
                *s = next.to_string();
                Ok(next)
            }
            Some(_) => Err(CacheError::WrongKind {
                key: key.to_string(),
                expected: "integer counter",
            }),
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Text("0".to_string()),
                        expires_at: None,
                    },
                );
                Ok(0)
            }
        })
    }

    fn list_replace(&self, key: &str, items: &[String], ttl: Option<Duration>) -> CacheResult<()> {
        let mut entries = self.entries.lock().unwrap();
        if items.is_empty() {
            entries.remove(key);
            return Ok(());
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::List(items.iter().cloned().collect()),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    fn list_pop_front(&self, key: &str) -> CacheResult<Option<String>> {
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();
        if entries.get(key).is_some_and(|e| e.expired(now)) {
            entries.remove(key);
        }
        let Some(entry) = entries.get_mut(key) else {
            return Ok(None);
        };
        let Value::List(items) = &mut entry.value else {
            return Err(CacheError::WrongKind {
                key: key.to_string(),
                expected: "list",
            });
        };
        let popped = items.pop_front();
        if items.is_empty() {
            entries.remove(key);
        }
        Ok(popped)
    }

    fn list_items(&self, key: &str) -> CacheResult<Vec<String>> {
        self.with_live_entry(key, |entry, _| match entry {
            Some(Entry {
                value: Value::List(items),
                ..
            }) => Ok(items.iter().cloned().collect()),
            Some(_) => Err(CacheError::WrongKind {
                key: key.to_string(),
                expected: "list",
            }),
            None => Ok(Vec::new()),
        })
    }
}
