// Public facade over the session and the alarm connection manager.

use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::alarm::{AlarmCallback, AlarmManager};
use crate::cache::{CredentialCache, FileCache};
use crate::config::SessionConfig;
use crate::error::Error;
use crate::http::ApiRequest;
use crate::models::{self, AlarmMessage, AlarmMode, RingDevices, Station};
use crate::session::Session;

/// High-level Ring alarm client.
///
/// Cheap to share behind an `Arc`; every method takes `&self`. Must be
/// created inside a Tokio runtime because construction starts the
/// credential cache load in the background.
#[derive(Debug)]
pub struct RingClient {
    session: Arc<Session>,
    alarm: Arc<AlarmManager>,
}

impl RingClient {
    /// Start a client. Fails synchronously on missing credentials.
    pub fn new(config: SessionConfig, cache: Arc<dyn CredentialCache>) -> Result<Self, Error> {
        let session = Session::start(config, cache)?;
        let alarm = AlarmManager::new(Arc::clone(&session));
        Ok(Self { session, alarm })
    }

    /// Start a client whose credentials persist to `<dir>/.ringAlarmCache`.
    pub fn with_file_cache(config: SessionConfig, dir: impl AsRef<Path>) -> Result<Self, Error> {
        Self::new(config, Arc::new(FileCache::in_dir(dir)))
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn alarm(&self) -> &Arc<AlarmManager> {
        &self.alarm
    }

    // ── REST ─────────────────────────────────────────────────────────

    /// List the account's alarm base stations.
    pub async fn stations(&self) -> Result<Vec<Station>, Error> {
        let response = self.session.request(&ApiRequest::get("/ring_devices")).await?;
        let devices: RingDevices = response.body.decode_into()?;
        debug!(count = devices.base_stations.len(), "fetched base stations");
        Ok(devices.base_stations)
    }

    // ── Alarm socket ─────────────────────────────────────────────────

    /// Fetch the full device document list for a station.
    pub async fn alarm_devices(&self, station: &Station) -> Result<AlarmMessage, Error> {
        let location = station.location()?;
        self.alarm
            .send_command(location, "message", models::device_list_command())
            .await
    }

    /// Switch the security panel to `mode`, bypassing the given sensor zids.
    ///
    /// Arguments are validated before anything touches the network.
    pub async fn set_alarm_mode(
        &self,
        station: &Station,
        panel_id: &str,
        mode: AlarmMode,
        bypassed: &[String],
    ) -> Result<AlarmMessage, Error> {
        let location = station.location()?;
        let panel = models::validate_panel_id(panel_id)?;
        info!(location, %mode, bypassed = bypassed.len(), "setting alarm mode");
        self.alarm
            .send_command(location, "message", models::switch_mode_command(&panel, mode, bypassed))
            .await
    }

    /// Invoke `callback` for every `event` the station's socket delivers,
    /// across reconnects.
    pub async fn set_alarm_callback(
        &self,
        station: &Station,
        event: &str,
        callback: AlarmCallback,
    ) -> Result<(), Error> {
        let location = station.location()?;
        self.alarm.subscribe(location, event, callback).await
    }

    /// Send an arbitrary event and wait for the response carrying its `seq`.
    pub async fn send_alarm_message(
        &self,
        station: &Station,
        event: &str,
        body: Map<String, Value>,
    ) -> Result<AlarmMessage, Error> {
        let location = station.location()?;
        self.alarm.send_command(location, event, body).await
    }

    /// Close the station's socket. Subscriptions survive and are replayed
    /// the next time the station is used.
    pub fn close_alarm_connection(&self, station: &Station) -> Result<(), Error> {
        let location = station.location()?;
        if !self.alarm.close_connection(location) {
            debug!(location, "no alarm connection to close");
        }
        Ok(())
    }

    /// Close every socket and stop reconnect supervision.
    pub fn shutdown(&self) {
        self.alarm.shutdown();
    }
}
