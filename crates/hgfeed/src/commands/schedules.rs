//! Feeding schedule handlers.

use serde::Serialize;
use tabled::Tabled;

use hgfeed_core::{CommandRequest, ScheduleDraft, ScheduleEntry, ScheduleId};

use crate::cli::{GlobalOpts, ScheduleSetArgs, SchedulesArgs, SchedulesCommand};
use crate::context::CliContext;
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct ScheduleRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Time (UTC)")]
    time: String,
    #[tabled(rename = "Portions")]
    portions: u8,
    #[tabled(rename = "Days")]
    days: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
}

impl From<&ScheduleEntry> for ScheduleRow {
    fn from(s: &ScheduleEntry) -> Self {
        Self {
            id: s.id.to_string(),
            time: s.time_of_day.format("%H:%M").to_string(),
            portions: s.portions,
            days: s.weekday_mask.to_string(),
            enabled: if s.enabled { "yes" } else { "no" }.into(),
        }
    }
}

#[derive(Serialize)]
struct Deleted<'a> {
    device_id: &'a str,
    schedule_id: &'a str,
}

pub async fn handle(ctx: &CliContext, args: SchedulesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        SchedulesCommand::List { device } => {
            let listing = util::resolve_device(&ctx.session, &device).await?;
            let schedules = ctx.session.list_schedules(&listing.device_id).await?;
            let out = output::render_list(
                &global.output,
                &schedules,
                |s| ScheduleRow::from(s),
                |s| s.id.to_string(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        SchedulesCommand::Set(args) => set(ctx, args, global).await,

        SchedulesCommand::Delete { device, id } => {
            let device_id = util::attach_device(&ctx.session, &device).await?;
            let ack = ctx
                .session
                .submit_command(CommandRequest::delete_schedule(
                    device_id,
                    ScheduleId::new(id.clone()),
                ))
                .await?;
            let deleted = Deleted {
                device_id: ack.device_id.as_str(),
                schedule_id: &id,
            };
            let out = output::render_single(
                &global.output,
                &deleted,
                |d| format!("Schedule #{} deleted from {}", d.schedule_id, d.device_id),
                |d| d.schedule_id.to_owned(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

async fn set(ctx: &CliContext, args: ScheduleSetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let time_of_day = util::parse_time(&args.time)?;
    let weekday_mask = util::parse_days(&args.days)?;

    let device_id = util::attach_device(&ctx.session, &args.device).await?;
    // Poll first so a new slot is checked against the stored schedules.
    ctx.session.refresh_device(&device_id).await;

    let mut draft = ScheduleDraft::new(time_of_day, args.portions);
    draft.enabled = !args.disabled;
    draft.weekday_mask = weekday_mask;
    if let Some(id) = args.id {
        draft = draft.for_slot(ScheduleId::new(id));
    }

    let ack = ctx
        .session
        .submit_command(CommandRequest::upsert_schedule(device_id, draft))
        .await?;

    let Some(entry) = ack.schedule else {
        output::print_output(
            &format!("Schedule saved on {}", ack.device_id),
            global.quiet,
        );
        return Ok(());
    };
    let out = output::render_single(
        &global.output,
        &entry,
        |s| {
            format!(
                "Schedule #{} saved: {} x{} {}{}",
                s.id,
                s.time_of_day.format("%H:%M"),
                s.portions,
                s.weekday_mask,
                if s.enabled { "" } else { " (disabled)" }
            )
        },
        |s| s.id.to_string(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
