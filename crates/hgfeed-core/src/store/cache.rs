// ── Device state cache ──
//
// Last-known-good snapshot per device, plus sync health. Writers stamp a
// request when it starts (`stamp()`), and a result is applied only if its
// stamp is newer than the one that produced the cached snapshot. A late
// poll can therefore never overwrite the result of a command that started
// after it. Removing a device (or clearing the cache) takes a stamp too, so
// a request already in flight cannot bring the entry back. Readers get whole
// `Arc<Device>` values, never partial writes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

use crate::model::{Device, DeviceId, DeviceStatus};

/// Logical start time of a request that will write to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestStamp(u64);

/// Result of offering a snapshot to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// A newer request already wrote this device; the snapshot was dropped.
    Superseded,
}

/// Result of recording a failed poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Counted {
        consecutive_failures: u32,
        /// This failure crossed the offline threshold.
        went_offline: bool,
    },
    /// A request that started later already refreshed the device.
    Superseded,
    /// Nothing is cached for the device.
    Uncached,
}

struct CacheEntry {
    device: Arc<Device>,
    origin: RequestStamp,
    last_success: DateTime<Utc>,
    consecutive_failures: u32,
    stale: bool,
}

pub struct DeviceStateCache {
    entries: DashMap<DeviceId, CacheEntry>,
    /// Stamp taken when a device was removed; older writes are refused.
    removed: DashMap<DeviceId, RequestStamp>,
    /// Stamp taken by the last `clear`.
    cleared: AtomicU64,
    clock: AtomicU64,
    snapshot: watch::Sender<Arc<Vec<Arc<Device>>>>,
}

impl DeviceStateCache {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            entries: DashMap::new(),
            removed: DashMap::new(),
            cleared: AtomicU64::new(0),
            clock: AtomicU64::new(0),
            snapshot,
        }
    }

    /// Stamp a request that is about to start.
    pub fn stamp(&self) -> RequestStamp {
        RequestStamp(self.clock.fetch_add(1, Ordering::AcqRel) + 1)
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get(&self, device_id: &DeviceId) -> Option<Arc<Device>> {
        self.entries
            .get(device_id)
            .map(|entry| Arc::clone(&entry.device))
    }

    pub fn status(&self, device_id: &DeviceId) -> Option<DeviceStatus> {
        self.entries.get(device_id).map(|entry| DeviceStatus {
            device_id: device_id.clone(),
            online: entry.device.online,
            stale: entry.stale,
            consecutive_failures: entry.consecutive_failures,
            last_success: entry.last_success,
        })
    }

    /// All cached devices, sorted by id (cheap `Arc` clone).
    pub fn snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<Device>>>> {
        self.snapshot.subscribe()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Replace a device's snapshot if `origin` is newer than the cached one
    /// and than the device's last removal.
    ///
    /// The manual feed preference is carried over from the cached snapshot.
    pub(crate) fn apply(&self, mut device: Device, origin: RequestStamp) -> WriteOutcome {
        if origin.0 <= self.cleared.load(Ordering::Acquire) {
            return WriteOutcome::Superseded;
        }

        let outcome = match self.entries.entry(device.device_id.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if origin <= entry.origin {
                    WriteOutcome::Superseded
                } else {
                    device.manual_feed_portions = entry.device.manual_feed_portions;
                    *entry = CacheEntry::fresh(device, origin);
                    WriteOutcome::Applied
                }
            }
            Entry::Vacant(vacant) => {
                let removed_at = self.removed.get(vacant.key()).map(|stamp| *stamp);
                if removed_at.is_some_and(|removed_at| origin <= removed_at) {
                    WriteOutcome::Superseded
                } else {
                    if removed_at.is_some() {
                        self.removed.remove(vacant.key());
                    }
                    vacant.insert(CacheEntry::fresh(device, origin));
                    WriteOutcome::Applied
                }
            }
        };

        if outcome == WriteOutcome::Applied {
            self.publish();
        }
        outcome
    }

    /// Count a failed poll that started at `origin`. The snapshot is kept;
    /// once the count reaches `offline_after` the device is reported offline.
    ///
    /// A failure older than the cached snapshot changes nothing.
    pub(crate) fn record_failure(
        &self,
        device_id: &DeviceId,
        origin: RequestStamp,
        offline_after: u32,
    ) -> FailureOutcome {
        let outcome = {
            let Some(mut entry) = self.entries.get_mut(device_id) else {
                return FailureOutcome::Uncached;
            };
            if origin <= entry.origin {
                return FailureOutcome::Superseded;
            }
            entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
            entry.stale = true;

            let went_offline = entry.device.online && entry.consecutive_failures >= offline_after;
            if went_offline {
                let mut offline = Device::clone(&entry.device);
                offline.online = false;
                entry.device = Arc::new(offline);
            }
            FailureOutcome::Counted {
                consecutive_failures: entry.consecutive_failures,
                went_offline,
            }
        };

        self.publish();
        outcome
    }

    /// Store the manual feed preference on a cached device.
    pub(crate) fn set_manual_portions(&self, device_id: &DeviceId, portions: u8) -> Option<Arc<Device>> {
        let updated = {
            let mut entry = self.entries.get_mut(device_id)?;
            let mut device = Device::clone(&entry.device);
            device.manual_feed_portions = portions;
            entry.device = Arc::new(device);
            Arc::clone(&entry.device)
        };

        self.publish();
        Some(updated)
    }

    pub(crate) fn remove(&self, device_id: &DeviceId) -> Option<Arc<Device>> {
        self.removed.insert(device_id.clone(), self.stamp());
        let removed = self.entries.remove(device_id).map(|(_, entry)| entry.device);
        if removed.is_some() {
            self.publish();
        }
        removed
    }

    pub(crate) fn clear(&self) {
        self.cleared.fetch_max(self.stamp().0, Ordering::AcqRel);
        self.removed.clear();
        self.entries.clear();
        self.publish();
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Rebuild the snapshot and broadcast it. Must not be called while a
    /// map guard is held.
    ///
    /// The rebuild runs inside `send_modify` so concurrent publishers are
    /// serialized and the last snapshot sent reflects every write before it.
    fn publish(&self) {
        self.snapshot.send_modify(|snap| {
            let mut devices: Vec<Arc<Device>> = self
                .entries
                .iter()
                .map(|entry| Arc::clone(&entry.device))
                .collect();
            devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
            *snap = Arc::new(devices);
        });
    }
}

impl Default for DeviceStateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheEntry {
    fn fresh(device: Device, origin: RequestStamp) -> Self {
        Self {
            device: Arc::new(device),
            origin,
            last_success: Utc::now(),
            consecutive_failures: 0,
            stale: false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn device(id: &str, food: u8) -> Device {
        Device {
            device_id: DeviceId::from(id),
            name: "Feeder".into(),
            model: "S25D".into(),
            firmware_version: None,
            online: true,
            food_remaining_pct: Some(food),
            desiccant_expiry: None,
            manual_feed_portions: 1,
            schedules: Vec::new(),
        }
    }

    #[test]
    fn later_stamp_wins_regardless_of_arrival_order() {
        let cache = DeviceStateCache::new();
        let poll = cache.stamp();
        let command = cache.stamp();

        // The command's read returns first, the older poll arrives late.
        assert_eq!(cache.apply(device("d", 80), command), WriteOutcome::Applied);
        assert_eq!(cache.apply(device("d", 20), poll), WriteOutcome::Superseded);

        let id = DeviceId::from("d");
        assert_eq!(cache.get(&id).unwrap().food_remaining_pct, Some(80));
    }

    #[test]
    fn failures_keep_snapshot_and_flip_offline_at_threshold() {
        let cache = DeviceStateCache::new();
        let id = DeviceId::from("d");
        cache.apply(device("d", 55), cache.stamp());

        let first = cache.record_failure(&id, cache.stamp(), 3);
        assert_eq!(
            first,
            FailureOutcome::Counted {
                consecutive_failures: 1,
                went_offline: false
            }
        );
        assert!(cache.get(&id).unwrap().online);
        assert!(cache.status(&id).unwrap().stale);

        cache.record_failure(&id, cache.stamp(), 3);
        let third = cache.record_failure(&id, cache.stamp(), 3);
        assert_eq!(
            third,
            FailureOutcome::Counted {
                consecutive_failures: 3,
                went_offline: true
            }
        );

        let cached = cache.get(&id).unwrap();
        assert!(!cached.online);
        assert_eq!(cached.food_remaining_pct, Some(55));

        // A fourth failure does not report the transition again.
        assert!(matches!(
            cache.record_failure(&id, cache.stamp(), 3),
            FailureOutcome::Counted {
                went_offline: false,
                ..
            }
        ));

        // Recovery resets health.
        cache.apply(device("d", 50), cache.stamp());
        let status = cache.status(&id).unwrap();
        assert!(status.online);
        assert!(!status.stale);
        assert_eq!(status.consecutive_failures, 0);
    }

    #[test]
    fn manual_portions_survive_refresh() {
        let cache = DeviceStateCache::new();
        let id = DeviceId::from("d");
        cache.apply(device("d", 60), cache.stamp());

        cache.set_manual_portions(&id, 4).unwrap();
        cache.apply(device("d", 58), cache.stamp());

        assert_eq!(cache.get(&id).unwrap().manual_feed_portions, 4);
    }

    #[test]
    fn unknown_device_failures_are_ignored() {
        let cache = DeviceStateCache::new();
        let ghost = DeviceId::from("ghost");
        assert_eq!(
            cache.record_failure(&ghost, cache.stamp(), 3),
            FailureOutcome::Uncached
        );
        assert!(cache.set_manual_portions(&ghost, 2).is_none());
    }

    #[test]
    fn failure_older_than_cached_snapshot_is_ignored() {
        let cache = DeviceStateCache::new();
        let id = DeviceId::from("d");
        let poll = cache.stamp();
        let command = cache.stamp();
        cache.apply(device("d", 80), command);

        // The poll started before the command's read but failed after it.
        assert_eq!(cache.record_failure(&id, poll, 1), FailureOutcome::Superseded);

        let status = cache.status(&id).unwrap();
        assert!(status.online);
        assert!(!status.stale);
        assert_eq!(status.consecutive_failures, 0);
    }

    #[test]
    fn removed_device_is_not_revived_by_inflight_write() {
        let cache = DeviceStateCache::new();
        let id = DeviceId::from("d");
        cache.apply(device("d", 60), cache.stamp());

        let in_flight = cache.stamp();
        cache.remove(&id);
        assert_eq!(cache.apply(device("d", 55), in_flight), WriteOutcome::Superseded);
        assert!(cache.get(&id).is_none());
        assert!(cache.snapshot().is_empty());

        // A request started after the removal may cache it again.
        assert_eq!(cache.apply(device("d", 50), cache.stamp()), WriteOutcome::Applied);
        assert_eq!(cache.get(&id).unwrap().food_remaining_pct, Some(50));
    }

    #[test]
    fn clear_refuses_writes_started_before_it() {
        let cache = DeviceStateCache::new();
        let in_flight = cache.stamp();
        cache.clear();

        assert_eq!(cache.apply(device("a", 10), in_flight), WriteOutcome::Superseded);
        assert!(cache.is_empty());
        assert_eq!(cache.apply(device("a", 10), cache.stamp()), WriteOutcome::Applied);
    }

    #[test]
    fn subscribers_see_sorted_snapshots() {
        let cache = DeviceStateCache::new();
        let rx = cache.subscribe();

        cache.apply(device("b", 10), cache.stamp());
        cache.apply(device("a", 20), cache.stamp());

        let ids: Vec<String> = rx
            .borrow()
            .iter()
            .map(|d| d.device_id.to_string())
            .collect();
        assert_eq!(ids, ["a", "b"]);

        cache.remove(&DeviceId::from("a"));
        assert_eq!(cache.snapshot().len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
