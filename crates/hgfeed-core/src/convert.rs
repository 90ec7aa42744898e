// ── Wire -> domain conversion ──
//
// Pure functions turning `hgfeed-api` payloads into model types. A payload
// that cannot be represented fails the whole conversion so a snapshot is
// never assembled from half-understood data.

use chrono::{NaiveDate, NaiveTime, TimeDelta, Timelike};

use hgfeed_api::models::{DeviceRecord, FeederSummary, PlanRecord, PlanWrite};

use crate::error::CoreError;
use crate::model::{
    Device, DeviceId, DeviceListing, ScheduleDraft, ScheduleEntry, ScheduleId, WeekdayMask,
};

pub(crate) fn listing_from_record(record: DeviceRecord) -> DeviceListing {
    DeviceListing {
        device_id: DeviceId::from(record.device_id),
        name: record.name,
        model: record.model,
        firmware_version: record.fw_version.filter(|v| !v.is_empty()),
        online: record.online,
    }
}

pub(crate) fn schedule_from_plan(plan: &PlanRecord) -> Result<ScheduleEntry, CoreError> {
    let time_of_day = NaiveTime::from_hms_opt(u32::from(plan.hour), u32::from(plan.minute), 0)
        .ok_or_else(|| {
            CoreError::Internal(format!(
                "plan {} has invalid time {:02}:{:02}",
                plan.plan_id, plan.hour, plan.minute
            ))
        })?;

    Ok(ScheduleEntry {
        id: ScheduleId::new(plan.plan_id.clone()),
        time_of_day,
        portions: plan.portions,
        enabled: plan.enable,
        weekday_mask: WeekdayMask::from_bits(plan.week_mask),
    })
}

pub(crate) fn schedules_from_plans(plans: &[PlanRecord]) -> Result<Vec<ScheduleEntry>, CoreError> {
    let mut entries = plans
        .iter()
        .map(schedule_from_plan)
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort_by(|a, b| {
        a.time_of_day
            .cmp(&b.time_of_day)
            .then_with(|| a.id.cmp(&b.id))
    });
    Ok(entries)
}

pub(crate) fn plan_from_draft(draft: &ScheduleDraft) -> Result<PlanWrite, CoreError> {
    let hour = u8::try_from(draft.time_of_day.hour())
        .map_err(|_| CoreError::validation("hour out of range"))?;
    let minute = u8::try_from(draft.time_of_day.minute())
        .map_err(|_| CoreError::validation("minute out of range"))?;

    Ok(PlanWrite {
        plan_id: draft.id.as_ref().map(|id| id.as_str().to_owned()),
        hour,
        minute,
        portions: draft.portions,
        enable: draft.enabled,
        week_mask: draft.weekday_mask.bits(),
    })
}

/// Assemble a full snapshot from the three reads that make one up.
pub(crate) fn device_from_parts(
    listing: DeviceListing,
    summary: &FeederSummary,
    plans: &[PlanRecord],
    manual_feed_portions: u8,
    today: NaiveDate,
) -> Result<Device, CoreError> {
    Ok(Device {
        device_id: listing.device_id,
        name: listing.name,
        model: listing.model,
        firmware_version: listing.firmware_version,
        online: listing.online,
        food_remaining_pct: summary.remaining.map(percent),
        desiccant_expiry: summary
            .desiccant_expire
            .and_then(TimeDelta::try_days)
            .and_then(|days| today.checked_add_signed(days)),
        manual_feed_portions,
        schedules: schedules_from_plans(plans)?,
    })
}

fn percent(raw: i64) -> u8 {
    u8::try_from(raw.clamp(0, 100)).unwrap_or(100)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn plan(id: &str, hour: u8, minute: u8) -> PlanRecord {
        PlanRecord {
            plan_id: id.into(),
            hour,
            minute,
            portions: 2,
            enable: true,
            week_mask: 0x7f,
        }
    }

    #[test]
    fn device_snapshot_from_parts() {
        let today = NaiveDate::from_ymd_opt(2026, 5, 10).unwrap();
        let listing = DeviceListing {
            device_id: DeviceId::from("dev-1"),
            name: "Kitchen".into(),
            model: "S25D".into(),
            firmware_version: Some("1.2.0".into()),
            online: true,
        };
        let summary = FeederSummary {
            remaining: Some(130),
            desiccant_expire: Some(14),
        };

        let device = device_from_parts(
            listing,
            &summary,
            &[plan("b", 18, 0), plan("a", 7, 30)],
            3,
            today,
        )
        .unwrap();

        assert_eq!(device.food_remaining_pct, Some(100));
        assert_eq!(device.desiccant_expiry, NaiveDate::from_ymd_opt(2026, 5, 24));
        assert_eq!(device.manual_feed_portions, 3);
        let ids: Vec<&str> = device.schedules.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn invalid_plan_time_fails_conversion() {
        assert!(schedule_from_plan(&plan("x", 25, 0)).is_err());
    }

    #[test]
    fn draft_round_trips_hour_and_minute() {
        let draft = ScheduleDraft::new(NaiveTime::from_hms_opt(6, 45, 0).unwrap(), 4)
            .for_slot(ScheduleId::new("9"));
        let write = plan_from_draft(&draft).unwrap();
        assert_eq!((write.hour, write.minute, write.portions), (6, 45, 4));
        assert_eq!(write.plan_id.as_deref(), Some("9"));
    }
}
