use tracing::info;

use ringalarm_api::RingClient;

use super::resolve_station;
use crate::cli::{GlobalOpts, ModeArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle(client: &RingClient, args: ModeArgs, global: &GlobalOpts) -> Result<(), CliError> {
    // Fail on a bad panel id before looking anything up.
    ringalarm_api::models::validate_panel_id(&args.panel)?;

    let station = resolve_station(client, &args.station).await?;
    let response = client
        .set_alarm_mode(&station, &args.panel, args.mode, &args.bypass)
        .await?;
    info!(mode = %args.mode, "alarm mode change acknowledged");
    output::print(&response.payload, global.output)
}
