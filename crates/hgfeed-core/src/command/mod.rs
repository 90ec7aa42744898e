// ── Command types ──
//
// Typed mutation requests. Every user action becomes a `CommandRequest`,
// is checked locally, then dispatched; the outcome is an `Ack` or an error.

mod dispatcher;
mod validate;

use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

pub use dispatcher::CommandDispatcher;
pub use validate::validate;

use crate::model::{Device, DeviceId, ScheduleDraft, ScheduleEntry, ScheduleId};

/// What to do to a feeder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum::IntoStaticStr)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CommandKind {
    /// Dispense now. `None` uses the device's manual feed preference.
    ManualFeed { portions: Option<u8> },
    /// Change the manual feed preference.
    SetPortions { portions: u8 },
    ResetDesiccant,
    /// Tell the cloud how full the hopper is after a refill.
    SetFoodRemaining { percent: u8 },
    UpsertSchedule { schedule: ScheduleDraft },
    DeleteSchedule { id: ScheduleId },
}

impl CommandKind {
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

/// A command addressed to one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub device_id: DeviceId,
    #[serde(flatten)]
    pub kind: CommandKind,
}

impl CommandRequest {
    pub fn new(device_id: impl Into<DeviceId>, kind: CommandKind) -> Self {
        Self {
            device_id: device_id.into(),
            kind,
        }
    }

    pub fn manual_feed(device_id: impl Into<DeviceId>, portions: Option<u8>) -> Self {
        Self::new(device_id, CommandKind::ManualFeed { portions })
    }

    pub fn set_portions(device_id: impl Into<DeviceId>, portions: u8) -> Self {
        Self::new(device_id, CommandKind::SetPortions { portions })
    }

    pub fn reset_desiccant(device_id: impl Into<DeviceId>) -> Self {
        Self::new(device_id, CommandKind::ResetDesiccant)
    }

    pub fn set_food_remaining(device_id: impl Into<DeviceId>, percent: u8) -> Self {
        Self::new(device_id, CommandKind::SetFoodRemaining { percent })
    }

    pub fn upsert_schedule(device_id: impl Into<DeviceId>, schedule: ScheduleDraft) -> Self {
        Self::new(device_id, CommandKind::UpsertSchedule { schedule })
    }

    /// Shorthand for a new every-day schedule.
    pub fn add_schedule(device_id: impl Into<DeviceId>, time_of_day: NaiveTime, portions: u8) -> Self {
        Self::upsert_schedule(device_id, ScheduleDraft::new(time_of_day, portions))
    }

    pub fn delete_schedule(device_id: impl Into<DeviceId>, id: ScheduleId) -> Self {
        Self::new(device_id, CommandKind::DeleteSchedule { id })
    }
}

/// Confirmation that the cloud (or, for `set_portions`, the session)
/// accepted a command.
#[derive(Debug, Clone, Serialize)]
pub struct Ack {
    pub device_id: DeviceId,
    pub command: &'static str,
    pub confirmed_at: DateTime<Utc>,
    /// The stored entry, for `upsert_schedule`.
    pub schedule: Option<ScheduleEntry>,
    /// Device state read back after the command. `None` if that read failed;
    /// the command itself still succeeded.
    pub device: Option<Arc<Device>>,
}

impl Ack {
    pub(crate) fn new(device_id: DeviceId, kind: &CommandKind) -> Self {
        Self {
            device_id,
            command: kind.name(),
            confirmed_at: Utc::now(),
            schedule: None,
            device: None,
        }
    }
}
