use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use ringalarm_api::RingClient;

pub async fn handle(client: &RingClient, global: &GlobalOpts) -> Result<(), CliError> {
    let stations = client.stations().await?;
    output::print(&stations, global.output)
}
