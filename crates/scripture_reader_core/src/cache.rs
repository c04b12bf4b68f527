//! crates/scripture_reader_core/src/cache.rs
//!
//! A keyed query cache with a freshness window and a longer retention window.
//! Fresh entries are served as-is; stale entries may still be served while a
//! refetch is in flight; entries past retention are dropped.

use dashmap::DashMap;
use std::hash::Hash;
use tokio::time::{Duration, Instant};
use tracing::debug;

/// Entries are fresh for one hour.
pub const FRESH_FOR: Duration = Duration::from_secs(60 * 60);
/// Entries are retained (stale but servable) for 24 hours.
pub const RETAIN_FOR: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub fresh_for: Duration,
    pub retain_for: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            fresh_for: FRESH_FOR,
            retain_for: RETAIN_FOR,
        }
    }
}

/// Result of a cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<V> {
    Fresh(V),
    Stale(V),
    Miss,
}

struct Entry<V> {
    value: V,
    stored_at: Instant,
    tag: Option<&'static str>,
}

/// Thread-safe keyed cache on a `DashMap`. No method awaits, so a shard lock
/// is never held across a suspension point.
pub struct QueryCache<K, V> {
    policy: CachePolicy,
    entries: DashMap<K, Entry<V>>,
}

impl<K, V> QueryCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            entries: DashMap::new(),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn get(&self, key: &K) -> Lookup<V> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            let age = now.saturating_duration_since(entry.stored_at);
            if age < self.policy.fresh_for {
                return Lookup::Fresh(entry.value.clone());
            }
            if age < self.policy.retain_for {
                return Lookup::Stale(entry.value.clone());
            }
        } else {
            return Lookup::Miss;
        }

        // Past retention: drop it so the next writer starts clean. The read
        // guard above is released before this point.
        let retain_for = self.policy.retain_for;
        self.entries
            .remove_if(key, |_, e| now.saturating_duration_since(e.stored_at) >= retain_for);
        debug!(?key, "Evicted expired cache entry");
        Lookup::Miss
    }

    pub fn insert(&self, key: K, value: V, tag: Option<&'static str>) {
        let entry = Entry {
            value,
            stored_at: Instant::now(),
            tag,
        };
        self.entries.insert(key, entry);
    }

    pub fn invalidate(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drops every entry carrying `tag`. Returns how many were removed.
    pub fn invalidate_tag(&self, tag: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.tag != Some(tag));
        before.saturating_sub(self.entries.len())
    }

    /// Removes entries past the retention window.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let retain_for = self.policy.retain_for;
        let before = self.entries.len();
        self.entries
            .retain(|_, e| now.saturating_duration_since(e.stored_at) < retain_for);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> Default for QueryCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    fn default() -> Self {
        Self::new(CachePolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entry_ages_from_fresh_to_stale_to_gone() {
        let cache: QueryCache<&'static str, u32> = QueryCache::default();
        cache.insert("gen-1-acf", 31, None);
        assert_eq!(cache.get(&"gen-1-acf"), Lookup::Fresh(31));

        tokio::time::advance(FRESH_FOR + Duration::from_secs(1)).await;
        assert_eq!(cache.get(&"gen-1-acf"), Lookup::Stale(31));

        tokio::time::advance(RETAIN_FOR).await;
        assert_eq!(cache.get(&"gen-1-acf"), Lookup::Miss);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn invalidate_tag_leaves_untagged_entries() {
        let cache: QueryCache<u32, &'static str> = QueryCache::default();
        cache.insert(1, "verse text", None);
        cache.insert(2, "yellow", Some("verse-highlights"));
        cache.insert(3, "green", Some("verse-highlights"));

        assert_eq!(cache.invalidate_tag("verse-highlights"), 2);
        assert_eq!(cache.get(&1), Lookup::Fresh("verse text"));
        assert_eq!(cache.get(&2), Lookup::Miss);
    }

    #[tokio::test(start_paused = true)]
    async fn prune_drops_only_expired_entries() {
        let cache: QueryCache<u32, u32> = QueryCache::default();
        cache.insert(1, 1, None);
        tokio::time::advance(RETAIN_FOR + Duration::from_secs(1)).await;
        cache.insert(2, 2, None);

        assert_eq!(cache.prune(), 1);
        assert_eq!(cache.len(), 1);
    }
}
