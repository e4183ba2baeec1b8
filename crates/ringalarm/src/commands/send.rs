use serde_json::{Map, Value};

use ringalarm_api::RingClient;

use super::resolve_station;
use crate::cli::{GlobalOpts, SendArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle(client: &RingClient, args: SendArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let body: Map<String, Value> = serde_json::from_str(&args.body)?;
    let station = resolve_station(client, &args.station).await?;
    let response = client.send_alarm_message(&station, &args.event, body).await?;
    output::print(&response, global.output)
}
