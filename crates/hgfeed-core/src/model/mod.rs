// ── Domain model ──
//
// Canonical types hosts read. Built from wire types in `convert`.

mod device;
mod schedule;

pub use device::{Device, DeviceId, DeviceListing, DeviceStatus};
pub use schedule::{ScheduleDraft, ScheduleEntry, ScheduleId, WeekdayMask};
