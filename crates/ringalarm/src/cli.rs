//! Clap derive structures for the `ringalarm` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use ringalarm_api::AlarmMode;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// ringalarm -- talk to Ring alarm base stations from the command line
#[derive(Debug, Parser)]
#[command(
    name = "ringalarm",
    version,
    about = "Control Ring alarm base stations from the command line",
    long_about = "List base stations, read alarm device documents, arm and disarm\n\
        the security panel, and stream live alarm socket events as JSON.",
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
    #[arg(long, short = 'p', env = "RINGALARM_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Output format
    #[arg(long, short = 'o', default_value = "json", global = true)]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "RINGALARM_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Re-authenticate and retry this many times on HTTP 401 (overrides profile)
    #[arg(long, global = true)]
    pub retries: Option<u32>,

    /// Directory holding the credential cache (overrides profile)
    #[arg(long, env = "RINGALARM_CACHE_DIR", global = true)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List alarm base stations on the account
    #[command(alias = "ls")]
    Stations,

    /// Dump the device document list of a station
    #[command(alias = "dev")]
    Devices(StationArgs),

    /// Arm or disarm the security panel
    Mode(ModeArgs),

    /// Stream alarm socket events of one type as JSON lines
    Watch(WatchArgs),

    /// Send a raw alarm socket command and print the correlated response
    Send(SendArgs),

    /// Manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct StationArgs {
    /// Station location id (defaults to the first base station)
    #[arg(long, short = 'l')]
    pub location: Option<String>,
}

#[derive(Debug, Args)]
pub struct ModeArgs {
    #[command(flatten)]
    pub station: StationArgs,

    /// Security panel device zid (a UUID)
    #[arg(long)]
    pub panel: String,

    /// Target mode: all (away), some (home), none (disarmed)
    #[arg(value_parser = parse_mode)]
    pub mode: AlarmMode,

    /// Sensor zids to bypass while arming
    #[arg(long, value_delimiter = ',')]
    pub bypass: Vec<String>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    #[command(flatten)]
    pub station: StationArgs,

    /// Event name to subscribe to
    #[arg(long, short = 'e', default_value = "DataUpdate")]
    pub event: String,

    /// Stop after this many events
    #[arg(long, short = 'n')]
    pub count: Option<usize>,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    #[command(flatten)]
    pub station: StationArgs,

    /// Event name to emit
    #[arg(long, short = 'e', default_value = "message")]
    pub event: String,

    /// JSON object body; `seq` is filled in automatically
    pub body: String,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Show the effective configuration (passwords redacted)
    Show,

    /// Create or update a profile
    Init(InitArgs),

    /// Store a profile's password in the system keyring
    SetPassword,
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Ring account e-mail
    #[arg(long)]
    pub username: String,

    /// Read the password from this environment variable instead of storing it
    #[arg(long)]
    pub password_env: Option<String>,

    /// Make this the default profile
    #[arg(long)]
    pub default: bool,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: Shell,
}

fn parse_mode(raw: &str) -> Result<AlarmMode, String> {
    raw.parse::<AlarmMode>().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn mode_arguments_parse() {
        let cli = Cli::try_parse_from([
            "ringalarm",
            "mode",
            "--panel",
            "5f3c2a10-8b7e-4c1d-9a2b-0123456789ab",
            "some",
            "--bypass",
            "a,b",
            "-l",
            "loc-1",
        ])
        .unwrap();
        let Command::Mode(args) = cli.command else {
            panic!("expected mode command");
        };
        assert_eq!(args.mode, AlarmMode::Some);
        assert_eq!(args.bypass, vec!["a", "b"]);
        assert_eq!(args.station.location.as_deref(), Some("loc-1"));
    }

    #[test]
    fn unknown_mode_is_rejected_by_the_parser() {
        assert!(Cli::try_parse_from(["ringalarm", "mode", "--panel", "x", "bogus"]).is_err());
    }
}
