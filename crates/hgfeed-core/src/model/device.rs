// ── Feeder domain types ──

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::schedule::{ScheduleEntry, ScheduleId};

/// Vendor-assigned device identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A device as listed on the account, before any state is fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceListing {
    pub device_id: DeviceId,
    pub name: String,
    pub model: String,
    pub firmware_version: Option<String>,
    pub online: bool,
}

/// Full snapshot of one feeder.
///
/// Built only from confirmed cloud responses, except `manual_feed_portions`,
/// which is a local preference the cloud does not store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: DeviceId,
    pub name: String,
    pub model: String,
    pub firmware_version: Option<String>,
    pub online: bool,
    /// Percent of hopper capacity, as last reported.
    pub food_remaining_pct: Option<u8>,
    /// Date the desiccant pack should be replaced.
    pub desiccant_expiry: Option<NaiveDate>,
    /// Portions dispensed by a manual feed that does not name a count.
    pub manual_feed_portions: u8,
    /// Ordered by time of day.
    pub schedules: Vec<ScheduleEntry>,
}

impl Device {
    /// Days until the desiccant should be replaced, negative when overdue.
    pub fn desiccant_days_left(&self, today: NaiveDate) -> Option<i64> {
        self.desiccant_expiry
            .map(|expiry| expiry.signed_duration_since(today).num_days())
    }

    pub fn schedule(&self, id: &ScheduleId) -> Option<&ScheduleEntry> {
        self.schedules.iter().find(|s| s.id == *id)
    }
}

/// Sync health of one cached device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    pub device_id: DeviceId,
    /// Last known connectivity; forced false after repeated poll failures.
    pub online: bool,
    /// The latest poll failed, so the snapshot may be out of date.
    pub stale: bool,
    pub consecutive_failures: u32,
    pub last_success: DateTime<Utc>,
}
