//! `watch`: poll in the background and print every state change until
//! interrupted.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Local, Utc};
use tracing::{debug, info};

use hgfeed_core::{AuthState, Device, DeviceId, DeviceStatus};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::context::CliContext;
use crate::error::CliError;
use crate::output;

use super::devices::StatusView;
use super::util;

pub async fn handle(ctx: &CliContext, args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let session = &ctx.session;
    if args.devices.is_empty() {
        session.discover().await?;
    } else {
        for identifier in &args.devices {
            util::attach_device(session, identifier).await?;
        }
    }

    session.start().await?;
    info!(
        interval_secs = ctx.poll_interval().as_secs(),
        devices = session.registered_devices().len(),
        "watching feeders"
    );

    let result = watch_loop(ctx, global).await;
    session.shutdown().await;
    result
}

async fn watch_loop(ctx: &CliContext, global: &GlobalOpts) -> Result<(), CliError> {
    let session = &ctx.session;
    let color = output::should_color(&global.color);
    let mut devices = session.devices();
    let mut updates = session.session_updates();
    let mut seen: HashMap<DeviceId, (Arc<Device>, Option<DeviceStatus>)> = HashMap::new();

    let initial = devices.borrow_and_update().clone();
    report_changes(ctx, &initial, &mut seen, global, color);

    loop {
        tokio::select! {
            biased;

            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted");
                return Ok(());
            }

            changed = updates.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                ctx.finish()?;
                if session.auth().state() == AuthState::ReauthRequired {
                    return Err(CliError::ReauthRequired { profile: ctx.profile.clone() });
                }
            }

            changed = devices.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let snapshot = devices.borrow_and_update().clone();
                report_changes(ctx, &snapshot, &mut seen, global, color);
            }
        }
    }
}

/// Print one line (or one JSON document) per device whose state or sync
/// health differs from what was last printed.
fn report_changes(
    ctx: &CliContext,
    snapshot: &[Arc<Device>],
    seen: &mut HashMap<DeviceId, (Arc<Device>, Option<DeviceStatus>)>,
    global: &GlobalOpts,
    color: bool,
) {
    for device in snapshot {
        let status = ctx.session.device_status(&device.device_id);
        let unchanged = seen.get(&device.device_id).is_some_and(|(prev, prev_status)| {
            **prev == **device && sync_view(prev_status.as_ref()) == sync_view(status.as_ref())
        });
        if unchanged {
            continue;
        }
        seen.insert(device.device_id.clone(), (Arc::clone(device), status.clone()));

        let view = StatusView {
            device: Arc::clone(device),
            status,
        };
        let line = match global.output {
            OutputFormat::Table | OutputFormat::Plain => change_line(&view, color),
            // One document per change
            OutputFormat::Json | OutputFormat::JsonCompact => {
                output::render_single(&OutputFormat::JsonCompact, &view, |_| String::new(), |_| String::new())
            }
            OutputFormat::Yaml => format!(
                "---\n{}",
                output::render_single(&OutputFormat::Yaml, &view, |_| String::new(), |_| String::new())
            ),
        };
        output::print_output(&line, global.quiet);
    }
}

/// Status fields worth reporting; `last_success` moves on every poll.
fn sync_view(status: Option<&DeviceStatus>) -> Option<(bool, bool)> {
    status.map(|s| (s.online, s.stale))
}

fn change_line(v: &StatusView, color: bool) -> String {
    let d = &v.device;
    let (online, stale) = v
        .status
        .as_ref()
        .map_or((d.online, false), |s| (s.online, s.stale));
    let today = Utc::now().date_naive();
    format!(
        "[{}] {} ({}): {}{} food {} desiccant {}",
        Local::now().format("%H:%M:%S"),
        d.name,
        d.device_id,
        output::online_label(online, color),
        if stale { " (stale)" } else { "" },
        output::percent_label(d.food_remaining_pct, color),
        d.desiccant_days_left(today)
            .map_or_else(|| "-".into(), |days| format!("{days}d")),
    )
}
