//! Per-device poll selection.
//!
//! Remembers which poll each device looked at last, so that bare `stats`,
//! `attested` or `voted:` messages know what they refer to. Entries expire
//! after a period of inactivity.

use crate::ports::outbound::{TimeSource, Timestamp};
use dashmap::DashMap;
use shared_types::entities::{DeviceAddress, UnitId};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// What a device has selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    pub poll_unit: UnitId,
    /// Latest vote sequence of the poll when it was last shown.
    pub vote_watermark: Option<u64>,
    touched_at: Timestamp,
}

/// TTL-bounded map from device to selected poll.
pub struct SessionStore {
    entries: DashMap<DeviceAddress, SessionEntry>,
    ttl: Duration,
    clock: Arc<dyn TimeSource>,
}

impl SessionStore {
    pub fn new(ttl: Duration, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            clock,
        }
    }

    fn ttl_ms(&self) -> u64 {
        u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX)
    }

    fn is_expired(&self, entry: &SessionEntry, now: Timestamp) -> bool {
        now.saturating_sub(entry.touched_at) >= self.ttl_ms()
    }

    /// Select `poll_unit` for `device`, replacing any earlier selection.
    pub fn select(&self, device: &DeviceAddress, poll_unit: UnitId, vote_watermark: Option<u64>) {
        let entry = SessionEntry {
            poll_unit,
            vote_watermark,
            touched_at: self.clock.now(),
        };
        self.entries.insert(device.clone(), entry);
    }

    /// Current selection of `device`, if any and not expired.
    pub fn selected(&self, device: &DeviceAddress) -> Option<SessionEntry> {
        let now = self.clock.now();
        let entry = self.entries.get(device)?.clone();
        if self.is_expired(&entry, now) {
            self.entries
                .remove_if(device, |_, current| self.is_expired(current, now));
            debug!(device = %device, "Session expired");
            return None;
        }
        Some(entry)
    }

    /// Forget the selection of `device`.
    pub fn clear(&self, device: &DeviceAddress) {
        self.entries.remove(device);
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn remove_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !self.is_expired(entry, now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "Removed expired sessions");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Periodically sweep expired sessions. Runs until the task is dropped.
pub async fn cleanup_task(store: Arc<SessionStore>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        store.remove_expired();
    }
}
