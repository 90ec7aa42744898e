//! Command dispatch: bridges CLI args -> core commands -> output formatting.

pub mod actions;
pub mod auth;
pub mod config_cmd;
pub mod devices;
pub mod schedules;
pub mod util;
pub mod watch;

use crate::cli::{Command, GlobalOpts};
use crate::context::CliContext;
use crate::error::CliError;

/// Dispatch a session-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, ctx: &CliContext, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Devices => devices::list(ctx, global).await,
        Command::Status(args) => devices::status(ctx, args, global).await,
        Command::Feed(args) => actions::feed(ctx, args, global).await,
        Command::Desiccant(args) => actions::desiccant(ctx, args, global).await,
        Command::Refill(args) => actions::refill(ctx, args, global).await,
        Command::Schedules(args) => schedules::handle(ctx, args, global).await,
        Command::Watch(args) => watch::handle(ctx, args, global).await,
        // Handled before a session is restored
        Command::Login(_) | Command::Logout | Command::Config(_) | Command::Completions(_) => {
            Err(CliError::Internal("command does not use a session".into()))
        }
    }
}
