//! Clap derive structures for the `hgfeed` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// hgfeed -- control HGSmart Wi-Fi pet feeders from the command line
#[derive(Debug, Parser)]
#[command(
    name = "hgfeed",
    version,
    about = "Control HGSmart pet feeders from the command line",
    long_about = "Log in to the HGSmart cloud once, then feed, check food and desiccant \
        levels, and manage feeding schedules.\n\n\
        Only the refresh token is stored between runs; the password never is.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Account profile to use
    #[arg(long, short = 'p', env = "HGFEED_PROFILE", global = true)]
    pub profile: Option<String>,

    /// API root URL (overrides profile)
    #[arg(long, env = "HGFEED_BASE_URL", global = true, hide_env = true)]
    pub base_url: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "HGFEED_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip TLS certificate verification
    #[arg(long, short = 'k', env = "HGFEED_INSECURE", global = true)]
    pub insecure: bool,

    /// Per-operation timeout in seconds
    #[arg(long, env = "HGFEED_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and store a refresh token for the profile
    Login(LoginArgs),

    /// Forget the stored session for the profile
    Logout,

    /// List feeders on the account
    #[command(alias = "dev", alias = "d")]
    Devices,

    /// Show food level, desiccant and schedules
    #[command(alias = "st")]
    Status(StatusArgs),

    /// Dispense food now
    Feed(FeedArgs),

    /// Desiccant pack maintenance
    Desiccant(DesiccantArgs),

    /// Record how full the hopper is after refilling
    Refill(RefillArgs),

    /// Manage feeding schedules
    #[command(alias = "sched")]
    Schedules(SchedulesArgs),

    /// Poll feeders and print changes until interrupted
    Watch(WatchArgs),

    /// Inspect CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Auth ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Account e-mail (defaults to the profile's username)
    #[arg(long, short = 'u', env = "HGFEED_USERNAME")]
    pub username: Option<String>,

    /// Read the password from the first line of stdin
    #[arg(long)]
    pub password_stdin: bool,
}

// ── Device commands ──────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Device ID or name (all supported feeders if omitted)
    pub device: Option<String>,
}

#[derive(Debug, Args)]
pub struct FeedArgs {
    /// Device ID or name
    pub device: String,

    /// Portions to dispense
    #[arg(long, short = 'n')]
    pub portions: Option<u8>,
}

#[derive(Debug, Args)]
pub struct DesiccantArgs {
    #[command(subcommand)]
    pub command: DesiccantCommand,
}

#[derive(Debug, Subcommand)]
pub enum DesiccantCommand {
    /// Mark the desiccant pack as replaced
    Reset {
        /// Device ID or name
        device: String,
    },
}

#[derive(Debug, Args)]
pub struct RefillArgs {
    /// Device ID or name
    pub device: String,

    /// Hopper fill level, percent
    #[arg(long, default_value = "100", value_parser = clap::value_parser!(u8).range(0..=100))]
    pub percent: u8,
}

// ── Schedules ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SchedulesArgs {
    #[command(subcommand)]
    pub command: SchedulesCommand,
}

#[derive(Debug, Subcommand)]
pub enum SchedulesCommand {
    /// List a feeder's schedules
    #[command(alias = "ls")]
    List {
        /// Device ID or name
        device: String,
    },

    /// Create a schedule, or overwrite one with --id
    Set(ScheduleSetArgs),

    /// Delete a schedule
    #[command(alias = "rm")]
    Delete {
        /// Device ID or name
        device: String,

        /// Schedule ID (see `schedules list`)
        id: String,
    },
}

#[derive(Debug, Args)]
pub struct ScheduleSetArgs {
    /// Device ID or name
    pub device: String,

    /// Time of day, HH:MM (UTC)
    #[arg(long, short = 't')]
    pub time: String,

    /// Portions to dispense
    #[arg(long, short = 'n')]
    pub portions: u8,

    /// Existing schedule to overwrite
    #[arg(long)]
    pub id: Option<String>,

    /// Days: daily, weekdays, weekends, or a list like mon,wed,fri
    #[arg(long, default_value = "daily")]
    pub days: String,

    /// Store the schedule disabled
    #[arg(long)]
    pub disabled: bool,
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Device IDs or names (all supported feeders if omitted)
    pub devices: Vec<String>,

    /// Poll interval in seconds (minimum 5)
    #[arg(long, short = 'i')]
    pub interval: Option<u64>,
}

// ── Config / completions ─────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,
    /// Print the resolved configuration
    Show,
    /// List configured profiles
    Profiles,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
