//! Process-local cache for summary statistics.

use crate::workspace::ArrayKind;
use crate::Result;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value as JsonValue;

//-----------------------------------------------------------------------------

/// Cached values keyed by array and metric, each valid for a fixed time.
///
/// Values are computed outside the lock, so concurrent misses may compute the same value more than once.
/// Errors are not cached.
#[derive(Debug)]
pub struct StatsCache {
    ttl: Duration,
    entries: Mutex<HashMap<(ArrayKind, &'static str), (Instant, JsonValue)>>,
}

impl StatsCache {
    /// Creates an empty cache.
    pub fn new(ttl: Duration) -> Self {
        StatsCache { ttl, entries: Mutex::new(HashMap::new()) }
    }

    /// Returns the time a value remains valid.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached value if it is still valid.
    pub fn get(&self, array: ArrayKind, metric: &'static str) -> Option<JsonValue> {
        let entries = self.entries.lock().ok()?;
        let (created, value) = entries.get(&(array, metric))?;
        if created.elapsed() < self.ttl {
            Some(value.clone())
        } else {
            None
        }
    }

    /// Stores a value.
    pub fn insert(&self, array: ArrayKind, metric: &'static str, value: JsonValue) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert((array, metric), (Instant::now(), value));
        }
    }

    /// Returns the cached value, or computes and caches it.
    pub fn get_or_try_insert_with<F>(&self, array: ArrayKind, metric: &'static str, f: F) -> Result<JsonValue>
        where F: FnOnce() -> Result<JsonValue>
    {
        if let Some(value) = self.get(array, metric) {
            return Ok(value);
        }
        let value = f()?;
        self.insert(array, metric, value.clone());
        Ok(value)
    }

    /// Removes all values.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use crate::Error;

    use serde_json::json;

    #[test]
    fn cached_until_cleared() {
        let cache = StatsCache::new(Duration::from_secs(300));
        let mut calls = 0;
        for _ in 0..3 {
            let value = cache.get_or_try_insert_with(ArrayKind::Variants, "stats", || {
                calls += 1;
                Ok(json!({ "totalVariants": 42 }))
            });
            assert_eq!(value.unwrap(), json!({ "totalVariants": 42 }));
        }
        assert_eq!(calls, 1, "The value was recomputed");
        assert!(cache.get(ArrayKind::Population, "stats").is_none(), "Keys are per array");

        cache.clear();
        assert!(cache.get(ArrayKind::Variants, "stats").is_none());
    }

    #[test]
    fn expired_values() {
        let cache = StatsCache::new(Duration::ZERO);
        cache.insert(ArrayKind::Variants, "stats", json!(1));
        assert!(cache.get(ArrayKind::Variants, "stats").is_none(), "A value outlived a zero TTL");
    }

    #[test]
    fn errors_are_not_cached() {
        let cache = StatsCache::new(Duration::from_secs(300));
        let result = cache.get_or_try_insert_with(ArrayKind::Population, "stats", || {
            Err(Error::StoreUnavailable(String::from("Population frequency")))
        });
        assert!(result.is_err());
        assert!(cache.get(ArrayKind::Population, "stats").is_none());
        let result = cache.get_or_try_insert_with(ArrayKind::Population, "stats", || Ok(json!(7)));
        assert_eq!(result.unwrap(), json!(7));
    }
}

//-----------------------------------------------------------------------------
