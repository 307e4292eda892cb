//! Component health tracking.
//!
//! Latest status per component, mutated under a mutex and periodically
//! persisted. An exchange AuthError marks `exchange_api` DOWN, which
//! pauses the order path until the status clears.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::warn;

use tempest_common::{Component, HealthRecord, HealthState};

/// In-process health registry.
#[derive(Debug, Default)]
pub struct HealthMonitor {
    entries: Mutex<HashMap<Component, HealthRecord>>,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a status observation for a component.
    pub fn set(
        &self,
        component: Component,
        status: HealthState,
        message: Option<String>,
        now: DateTime<Utc>,
    ) {
        let mut entries = self.entries.lock();
        let last_ok = match entries.get(&component) {
            _ if status == HealthState::Ok => now,
            Some(prev) => prev.last_ok,
            None => now,
        };
        if status != HealthState::Ok {
            warn!(component = %component, status = %status, message = message.as_deref().unwrap_or(""), "component unhealthy");
        }
        entries.insert(
            component,
            HealthRecord {
                component,
                status,
                last_ok,
                checked_at: now,
                message,
            },
        );
    }

    pub fn ok(&self, component: Component, now: DateTime<Utc>) {
        self.set(component, HealthState::Ok, None, now);
    }

    pub fn degraded(&self, component: Component, message: impl Into<String>, now: DateTime<Utc>) {
        self.set(component, HealthState::Degraded, Some(message.into()), now);
    }

    pub fn down(&self, component: Component, message: impl Into<String>, now: DateTime<Utc>) {
        self.set(component, HealthState::Down, Some(message.into()), now);
    }

    pub fn status_of(&self, component: Component) -> Option<HealthState> {
        self.entries.lock().get(&component).map(|r| r.status)
    }

    /// True when the exchange is marked DOWN; the loop skips the order
    /// path while this holds.
    pub fn order_path_paused(&self) -> bool {
        self.status_of(Component::ExchangeApi) == Some(HealthState::Down)
    }

    /// Snapshot for persistence.
    pub fn snapshot(&self) -> Vec<HealthRecord> {
        self.entries.lock().values().cloned().collect()
    }
}
