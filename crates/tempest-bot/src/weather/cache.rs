//! Per-city weather cache with TTL and last-known-good fallback.
//!
//! Shared across the city worker pool: readers take a read lock, writers an
//! exclusive lock. No I/O happens under either lock.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use tempest_common::WeatherSnapshot;

/// Thread-safe snapshot cache keyed by city code.
#[derive(Debug, Default)]
pub struct WeatherCache {
    entries: RwLock<HashMap<String, WeatherSnapshot>>,
    /// Last successful fetch per city, kept even after TTL expiry so a
    /// failed refresh can degrade to stale data instead of nothing.
    last_good: RwLock<HashMap<String, WeatherSnapshot>>,
}

impl WeatherCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot younger than `ttl`, if present.
    pub fn fresh(&self, city_code: &str, ttl: Duration, now: DateTime<Utc>) -> Option<WeatherSnapshot> {
        let entries = self.entries.read();
        let snap = entries.get(city_code)?;
        let age = now - snap.captured_at;
        if age < chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero()) {
            Some(snap.clone())
        } else {
            None
        }
    }

    /// Store a freshly fetched snapshot. Non-stale snapshots also become
    /// the last-known-good value for the city.
    pub fn store(&self, snapshot: WeatherSnapshot) {
        if !snapshot.stale {
            self.last_good
                .write()
                .insert(snapshot.city_code.clone(), snapshot.clone());
        }
        self.entries
            .write()
            .insert(snapshot.city_code.clone(), snapshot);
    }

    /// Last successful snapshot regardless of age.
    pub fn last_good(&self, city_code: &str) -> Option<WeatherSnapshot> {
        self.last_good.read().get(city_code).cloned()
    }

    pub fn invalidate(&self, city_code: &str) -> bool {
        self.entries.write().remove(city_code).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
