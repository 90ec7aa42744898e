mod cli;
mod commands;
mod context;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Local-only commands
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "hgfeed", &mut std::io::stdout());
            Ok(())
        }

        Command::Login(args) => commands::auth::login(args, &cli.global).await,
        Command::Logout => commands::auth::logout(&cli.global),

        // Everything else runs on a restored session
        cmd => {
            let poll_secs = match cmd {
                Command::Watch(ref args) => args.interval,
                _ => None,
            };
            let ctx = context::CliContext::connect(&cli.global, poll_secs).await?;
            tracing::debug!(command = ?cmd, profile = %ctx.profile, "dispatching command");
            let result = commands::dispatch(cmd, &ctx, &cli.global).await;
            let finished = ctx.finish();
            result.map_err(|e| ctx.refine(e))?;
            finished
        }
    }
}
