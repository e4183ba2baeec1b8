use ringalarm_api::RingClient;

use super::resolve_station;
use crate::cli::{GlobalOpts, StationArgs};
use crate::error::CliError;
use crate::output;

/// Print the `body` of the device list response: one document per device.
pub async fn handle(client: &RingClient, args: StationArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let station = resolve_station(client, &args).await?;
    let response = client.alarm_devices(&station).await?;
    match response.body() {
        Some(body) => output::print(body, global.output),
        None => output::print(&response.payload, global.output),
    }
}
