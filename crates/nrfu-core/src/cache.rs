use crate::command::CommandResult;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::trace;

/// Default maximum number of cached command results per device.
pub const DEFAULT_CACHE_CAPACITY: usize = 128;

/// Default time-to-live for a cached command result.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

struct CacheEntry {
    result: CommandResult,
    inserted_at: Instant,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    // Recency order, least-recently-used first
    order: Vec<String>,
}

/// Bounded TTL cache of command results, keyed by the expanded command
/// string. One instance per device client.
///
/// All operations serialize on an internal mutex. There is no
/// thundering-herd coalescing: two callers racing on the same key may both
/// run the command and the last write wins. Commands are idempotent reads,
/// so both observe a valid answer.
pub struct CommandCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
    ttl: Duration,
}

impl CommandCache {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL)
    }

    pub fn with_limits(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: Vec::new(),
            }),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Look up a command result. Expired entries are removed on access and
    /// reported as a miss. A hit refreshes the entry's recency.
    pub fn get(&self, key: &str) -> Option<CommandResult> {
        self.get_at(key, Instant::now())
    }

    /// `get` with an explicit "now" for deterministic tests.
    pub fn get_at(&self, key: &str, now: Instant) -> Option<CommandResult> {
        let mut inner = self.inner.lock();

        let expired = match inner.entries.get(key) {
            Some(entry) => now.saturating_duration_since(entry.inserted_at) > self.ttl,
            None => return None,
        };

        if expired {
            trace!(key, "cache entry expired");
            inner.entries.remove(key);
            inner.order.retain(|k| k != key);
            return None;
        }

        touch(&mut inner.order, key);
        inner.entries.get(key).map(|entry| entry.result.clone())
    }

    /// Insert or update an entry, evicting the least-recently-used entry
    /// when the cache is over capacity.
    pub fn set(&self, key: &str, result: CommandResult) {
        self.set_at(key, result, Instant::now())
    }

    /// `set` with an explicit "now" for deterministic tests.
    pub fn set_at(&self, key: &str, result: CommandResult, now: Instant) {
        let mut inner = self.inner.lock();

        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                result,
                inserted_at: now,
            },
        );
        touch(&mut inner.order, key);

        while inner.entries.len() > self.capacity {
            let victim = inner.order.remove(0);
            trace!(key = %victim, "evicting least-recently-used cache entry");
            inner.entries.remove(&victim);
        }
    }

    /// Remove every entry. Invoked on disconnect.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

impl Default for CommandCache {
    fn default() -> Self {
        Self::new()
    }
}

fn touch(order: &mut Vec<String>, key: &str) {
    if let Some(pos) = order.iter().position(|k| k == key) {
        let k = order.remove(pos);
        order.push(k);
    } else {
        order.push(key.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(command: &str, value: serde_json::Value) -> CommandResult {
        CommandResult::new(command.to_string(), value, 5)
    }

    #[test]
    fn get_after_set_within_ttl() {
        let cache = CommandCache::new();
        cache.set("show version", result("show version", json!({"uptime": 1.0})));

        let hit = cache.get("show version").expect("expected a hit");
        assert_eq!(hit.output, json!({"uptime": 1.0}));
    }

    #[test]
    fn expired_entry_is_removed() {
        let cache = CommandCache::with_limits(8, Duration::from_secs(60));
        let t0 = Instant::now();
        cache.set_at("show version", result("show version", json!({})), t0);

        // Just inside the TTL
        assert!(cache.get_at("show version", t0 + Duration::from_secs(60)).is_some());
        // Just past it
        assert!(cache
            .get_at("show version", t0 + Duration::from_secs(61))
            .is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn lru_eviction_at_capacity() {
        let cache = CommandCache::with_limits(3, Duration::from_secs(60));
        cache.set("a", result("a", json!(1)));
        cache.set("b", result("b", json!(2)));
        cache.set("c", result("c", json!(3)));

        // Touch "a" so "b" becomes the LRU entry
        cache.get("a").unwrap();
        cache.set("d", result("d", json!(4)));

        assert_eq!(cache.len(), 3);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
        assert!(cache.get("d").is_some());
    }

    #[test]
    fn clear_removes_everything() {
        let cache = CommandCache::new();
        cache.set("a", result("a", json!(1)));
        cache.set("b", result("b", json!(2)));
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get("a").is_none());
    }
}
