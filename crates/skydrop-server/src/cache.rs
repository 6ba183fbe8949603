//! Bounding for the in-memory maps that remember things by key: cached
//! weather cells and retired missions.

use dashmap::DashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// A map value that knows when it was recorded.
pub trait CacheEntry {
    fn recorded_at(&self) -> Instant;
}

/// Remove entries older than `max_age`, then evict oldest-first until the map
/// holds at most `max_entries`.
pub fn prune_cache<K, V>(map: &DashMap<K, V>, max_entries: usize, max_age: Duration)
where
    K: Clone + Eq + Hash,
    V: CacheEntry,
{
    let now = Instant::now();
    let mut by_age: Vec<(Instant, K)> = map
        .iter()
        .map(|entry| (entry.value().recorded_at(), entry.key().clone()))
        .collect();
    by_age.sort_by_key(|(recorded_at, _)| *recorded_at);

    let mut remaining = by_age.len();
    for (recorded_at, key) in by_age {
        let expired = now.saturating_duration_since(recorded_at) > max_age;
        if !expired && remaining <= max_entries {
            break;
        }
        if map.remove(&key).is_some() {
            remaining -= 1;
        }
    }
}
