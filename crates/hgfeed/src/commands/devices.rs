//! Device listing and status handlers.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tabled::Tabled;

use hgfeed_core::{Device, DeviceListing, DeviceStatus, PollOutcome};

use crate::cli::{GlobalOpts, StatusArgs};
use crate::context::CliContext;
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct ListingRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Firmware")]
    firmware: String,
    #[tabled(rename = "State")]
    state: String,
}

fn listing_row(l: &DeviceListing, color: bool) -> ListingRow {
    ListingRow {
        id: l.device_id.to_string(),
        name: l.name.clone(),
        model: l.model.clone(),
        firmware: l.firmware_version.clone().unwrap_or_else(|| "-".into()),
        state: output::online_label(l.online, color),
    }
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Food")]
    food: String,
    #[tabled(rename = "Desiccant")]
    desiccant: String,
    #[tabled(rename = "Schedules")]
    schedules: usize,
}

/// A cached device with its sync health.
#[derive(Serialize)]
pub struct StatusView {
    #[serde(flatten)]
    pub device: Arc<Device>,
    pub status: Option<DeviceStatus>,
}

impl StatusView {
    fn online(&self) -> bool {
        self.status.as_ref().map_or(self.device.online, |s| s.online)
    }

    fn stale(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.stale)
    }
}

fn status_row(v: &StatusView, today: NaiveDate, color: bool) -> StatusRow {
    let mut state = output::online_label(v.online(), color);
    if v.stale() {
        state.push_str(" (stale)");
    }
    StatusRow {
        id: v.device.device_id.to_string(),
        name: v.device.name.clone(),
        state,
        food: output::percent_label(v.device.food_remaining_pct, color),
        desiccant: desiccant_label(&v.device, today),
        schedules: v.device.schedules.len(),
    }
}

fn desiccant_label(d: &Device, today: NaiveDate) -> String {
    match d.desiccant_days_left(today) {
        None => "-".into(),
        Some(days) if days < 0 => format!("overdue {}d", -days),
        Some(days) => format!("{days}d"),
    }
}

/// Multi-line view of one device for table output.
pub fn detail(v: &StatusView, color: bool) -> String {
    let d = &v.device;
    let today = Utc::now().date_naive();
    let mut lines = vec![
        format!("ID:        {}", d.device_id),
        format!("Name:      {}", d.name),
        format!("Model:     {}", d.model),
        format!("Firmware:  {}", d.firmware_version.as_deref().unwrap_or("-")),
        format!("State:     {}", output::online_label(v.online(), color)),
        format!("Food:      {}", output::percent_label(d.food_remaining_pct, color)),
        format!(
            "Desiccant: {}",
            d.desiccant_expiry.map_or_else(
                || "-".into(),
                |date| format!("{date} ({})", desiccant_label(d, today))
            )
        ),
        format!("Portions:  {} per manual feed", d.manual_feed_portions),
    ];
    if let Some(ref status) = v.status {
        lines.push(format!(
            "Synced:    {}{}",
            status.last_success.format("%Y-%m-%d %H:%M:%S UTC"),
            if status.stale {
                format!(" (stale, {} failed polls)", status.consecutive_failures)
            } else {
                String::new()
            }
        ));
    }
    for s in &d.schedules {
        lines.push(format!(
            "Schedule:  #{} {} x{} {}{}",
            s.id,
            s.time_of_day.format("%H:%M"),
            s.portions,
            s.weekday_mask,
            if s.enabled { "" } else { " (disabled)" }
        ));
    }
    lines.join("\n")
}

fn view(ctx: &CliContext, device: Arc<Device>) -> StatusView {
    let status = ctx.session.device_status(&device.device_id);
    StatusView { device, status }
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn list(ctx: &CliContext, global: &GlobalOpts) -> Result<(), CliError> {
    let listings = ctx.session.list_devices().await?;
    let color = output::should_color(&global.color);
    let out = output::render_list(
        &global.output,
        &listings,
        |l| listing_row(l, color),
        |l| l.device_id.to_string(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn status(ctx: &CliContext, args: StatusArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(&global.color);

    if let Some(ref identifier) = args.device {
        let device_id = util::attach_device(&ctx.session, identifier).await?;
        let outcome = ctx.session.refresh_device(&device_id).await;
        let Ok(device) = ctx.session.cached_state(&device_id) else {
            return Err(CliError::DeviceUnreachable {
                device: device_id.to_string(),
                reason: poll_failure(&outcome),
            });
        };
        let v = view(ctx, device);
        let out = output::render_single(
            &global.output,
            &v,
            |v| detail(v, color),
            |v| v.device.device_id.to_string(),
        );
        output::print_output(&out, global.quiet);
        return Ok(());
    }

    ctx.session.discover().await?;
    ctx.session.refresh_all().await;
    let views: Vec<StatusView> = ctx
        .session
        .devices_snapshot()
        .iter()
        .map(|d| view(ctx, Arc::clone(d)))
        .collect();
    let today = Utc::now().date_naive();
    let out = output::render_list(
        &global.output,
        &views,
        |v| status_row(v, today, color),
        |v| v.device.device_id.to_string(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

fn poll_failure(outcome: &PollOutcome) -> String {
    match outcome {
        PollOutcome::Failed {
            consecutive_failures,
            ..
        } => format!("state could not be read ({consecutive_failures} failed polls)"),
        other => format!("no state available ({other:?})"),
    }
}
