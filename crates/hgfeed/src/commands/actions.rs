//! One-shot feeder commands: feed, desiccant reset, refill.

use hgfeed_core::{Ack, CommandRequest};

use crate::cli::{DesiccantArgs, DesiccantCommand, FeedArgs, GlobalOpts, RefillArgs};
use crate::context::CliContext;
use crate::error::CliError;
use crate::output;

use super::devices::{StatusView, detail};
use super::util;

pub async fn feed(ctx: &CliContext, args: FeedArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let device_id = util::attach_device(&ctx.session, &args.device).await?;
    let ack = ctx
        .session
        .submit_command(CommandRequest::manual_feed(device_id, args.portions))
        .await?;
    let summary = match args.portions {
        Some(n) => format!("Dispensed {n} portion(s) from {}", ack.device_id),
        None => format!("Dispensed a manual feed from {}", ack.device_id),
    };
    print_ack(ctx, &ack, &summary, global);
    Ok(())
}

pub async fn desiccant(
    ctx: &CliContext,
    args: DesiccantArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        DesiccantCommand::Reset { device } => {
            let device_id = util::attach_device(&ctx.session, &device).await?;
            let ack = ctx
                .session
                .submit_command(CommandRequest::reset_desiccant(device_id))
                .await?;
            let expiry = ack
                .device
                .as_ref()
                .and_then(|d| d.desiccant_expiry)
                .map_or_else(String::new, |date| format!(", next change due {date}"));
            let summary = format!("Desiccant reset on {}{expiry}", ack.device_id);
            print_ack(ctx, &ack, &summary, global);
            Ok(())
        }
    }
}

pub async fn refill(ctx: &CliContext, args: RefillArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let device_id = util::attach_device(&ctx.session, &args.device).await?;
    let ack = ctx
        .session
        .submit_command(CommandRequest::set_food_remaining(device_id, args.percent))
        .await?;
    let summary = format!("Food level of {} set to {}%", ack.device_id, args.percent);
    print_ack(ctx, &ack, &summary, global);
    Ok(())
}

/// Table output gets the summary line plus the refreshed device; the
/// structured formats get the whole `Ack`.
fn print_ack(ctx: &CliContext, ack: &Ack, summary: &str, global: &GlobalOpts) {
    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        ack,
        |ack| match ack.device {
            Some(ref device) => {
                let v = StatusView {
                    device: std::sync::Arc::clone(device),
                    status: ctx.session.device_status(&device.device_id),
                };
                format!("{summary}\n\n{}", detail(&v, color))
            }
            None => format!("{summary}\n(device state could not be re-read)"),
        },
        |ack| ack.device_id.to_string(),
    );
    output::print_output(&out, global.quiet);
}
