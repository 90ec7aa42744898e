//! Shared helpers for command handlers.

use chrono::{NaiveTime, Weekday};

use hgfeed_core::{DeviceId, DeviceListing, Session, WeekdayMask};

use crate::error::CliError;

/// Resolve a device by ID, or by name (case-insensitive), against the
/// account's device list.
pub async fn resolve_device(session: &Session, identifier: &str) -> Result<DeviceListing, CliError> {
    let listings = session.list_devices().await?;
    find_device(listings, identifier)
}

fn find_device(listings: Vec<DeviceListing>, identifier: &str) -> Result<DeviceListing, CliError> {
    let by_name = |l: &DeviceListing| l.name.eq_ignore_ascii_case(identifier);
    let mut by_id = None;
    let mut named = Vec::new();
    for listing in listings {
        if listing.device_id.as_str() == identifier {
            by_id = Some(listing);
        } else if by_name(&listing) {
            named.push(listing);
        }
    }

    if let Some(listing) = by_id {
        return Ok(listing);
    }
    match named.len() {
        0 => Err(CliError::NotFound {
            resource_type: "device".into(),
            identifier: identifier.into(),
            list_command: "devices".into(),
        }),
        1 => Ok(named.remove(0)),
        _ => Err(CliError::Validation {
            field: "device".into(),
            reason: format!("'{identifier}' matches several feeders; use the device ID"),
        }),
    }
}

/// Resolve and register a device so it can be polled and commanded.
pub async fn attach_device(session: &Session, identifier: &str) -> Result<DeviceId, CliError> {
    let listing = resolve_device(session, identifier).await?;
    session.register_device(listing.device_id.clone());
    Ok(listing.device_id)
}

/// Parse `HH:MM` into a time of day.
pub fn parse_time(value: &str) -> Result<NaiveTime, CliError> {
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| CliError::Validation {
        field: "time".into(),
        reason: format!("expected HH:MM, got '{value}'"),
    })
}

/// Parse `daily`, `weekdays`, `weekends`, or a comma list like `mon,wed`.
pub fn parse_days(value: &str) -> Result<WeekdayMask, CliError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "daily" | "all" | "everyday" => return Ok(WeekdayMask::EVERY_DAY),
        "weekdays" => return Ok(WeekdayMask::WEEKDAYS),
        "weekends" => return Ok(WeekdayMask::WEEKENDS),
        _ => {}
    }

    let days = value
        .split(',')
        .map(|part| {
            part.trim().parse::<Weekday>().map_err(|_| CliError::Validation {
                field: "days".into(),
                reason: format!("unknown day '{}'", part.trim()),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(WeekdayMask::from_days(days))
}
