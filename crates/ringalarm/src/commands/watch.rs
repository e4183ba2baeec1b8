use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use ringalarm_api::{AlarmCallback, AlarmMessage, RingClient};

use super::resolve_station;
use crate::cli::{GlobalOpts, WatchArgs};
use crate::error::CliError;
use crate::output;

/// Print every matching event until `--count` is reached or Ctrl-C.
pub async fn handle(client: &RingClient, args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let station = resolve_station(client, &args.station).await?;

    let (tx, mut rx) = mpsc::unbounded_channel::<AlarmMessage>();
    let callback: AlarmCallback = Arc::new(move |message: &AlarmMessage| {
        let _ = tx.send(message.clone());
    });
    client.set_alarm_callback(&station, &args.event, callback).await?;
    info!(event = %args.event, "watching alarm events, Ctrl-C to stop");

    let mut seen = 0_usize;
    loop {
        tokio::select! {
            message = rx.recv() => {
                let Some(message) = message else { break };
                output::print(&message, global.output)?;
                seen += 1;
                if args.count.is_some_and(|n| seen >= n) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.close_alarm_connection(&station)?;
    Ok(())
}
