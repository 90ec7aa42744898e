// ── Local command validation ──
//
// Everything that can be checked without the network is checked here, so
// a bad request costs zero round trips.

use crate::config::CommandLimits;
use crate::error::CoreError;
use crate::model::Device;

use super::{CommandKind, CommandRequest};

/// Check `request` against the configured limits and, when the device is
/// cached, against its known schedules.
pub fn validate(
    request: &CommandRequest,
    limits: &CommandLimits,
    cached: Option<&Device>,
) -> Result<(), CoreError> {
    if request.device_id.as_str().trim().is_empty() {
        return Err(CoreError::validation("device id must not be empty"));
    }

    match &request.kind {
        CommandKind::ManualFeed { portions: Some(portions) }
        | CommandKind::SetPortions { portions } => {
            if !limits.manual_feed_portions.contains(*portions) {
                return Err(CoreError::validation(format!(
                    "portions must be within {}, got {portions}",
                    limits.manual_feed_portions
                )));
            }
        }
        CommandKind::ManualFeed { portions: None } | CommandKind::ResetDesiccant => {}
        CommandKind::SetFoodRemaining { percent } => {
            if *percent > 100 {
                return Err(CoreError::validation(format!(
                    "food remaining must be 0-100%, got {percent}"
                )));
            }
        }
        CommandKind::UpsertSchedule { schedule } => {
            if !limits.schedule_portions.contains(schedule.portions) {
                return Err(CoreError::validation(format!(
                    "schedule portions must be within {}, got {}",
                    limits.schedule_portions, schedule.portions
                )));
            }
            if !schedule.has_minute_precision() {
                return Err(CoreError::validation(
                    "schedule time must be a whole minute (seconds are not stored)",
                ));
            }
            if !schedule.weekday_mask.is_valid() {
                return Err(CoreError::validation(format!(
                    "weekday mask {:#04x} must select at least one day and only bits 0-6",
                    schedule.weekday_mask.bits()
                )));
            }
            if let Some(id) = &schedule.id {
                if id.as_str().trim().is_empty() {
                    return Err(CoreError::validation("schedule id must not be empty"));
                }
            } else if let Some(device) = cached {
                if device.schedules.len() >= limits.schedule_slots {
                    return Err(CoreError::validation(format!(
                        "all {} schedule slots are in use; edit or delete one",
                        limits.schedule_slots
                    )));
                }
            }
        }
        CommandKind::DeleteSchedule { id } => {
            if id.as_str().trim().is_empty() {
                return Err(CoreError::validation("schedule id must not be empty"));
            }
        }
    }

    Ok(())
}
