//! Command dispatch: bridges CLI args -> client operations -> JSON output.

pub mod config_cmd;
pub mod devices;
pub mod mode;
pub mod send;
pub mod stations;
pub mod watch;

use ringalarm_api::{RingClient, Station};

use crate::cli::{Command, GlobalOpts, StationArgs};
use crate::error::CliError;

/// Dispatch an account-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, client: &RingClient, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Stations => stations::handle(client, global).await,
        Command::Devices(args) => devices::handle(client, args, global).await,
        Command::Mode(args) => mode::handle(client, args, global).await,
        Command::Watch(args) => watch::handle(client, args, global).await,
        Command::Send(args) => send::handle(client, args, global).await,
        // Handled before a client is built
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}

/// Pick the station named by `--location`, or the account's first one.
pub(crate) async fn resolve_station(client: &RingClient, args: &StationArgs) -> Result<Station, CliError> {
    if let Some(location) = &args.location {
        return Ok(Station::for_location(location.clone()));
    }
    client
        .stations()
        .await?
        .into_iter()
        .find(|s| s.location().is_ok())
        .ok_or_else(|| CliError::NotFound {
            resource_type: "base station".into(),
            identifier: "(any)".into(),
            list_command: "stations".into(),
        })
}
