// Typed views of the few payloads the client interprets itself.
//
// Device documents coming over the alarm socket stay raw JSON; only the
// station listing, the connection ticket, and the command envelopes
// are modeled here.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::{Uuid, Variant};

use crate::error::Error;

// ── Stations ────────────────────────────────────────────────────────

/// An alarm base station (one per account location).
///
/// Uses `#[serde(flatten)]` to keep every field beyond the ones the
/// client needs, so nothing the API sends is silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    /// Scrubbed to a string upstream when it exceeds JSON number precision.
    #[serde(default, deserialize_with = "id_string::deserialize")]
    pub id: Option<String>,

    #[serde(default)]
    pub location_id: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub kind: Option<String>,

    #[serde(default, deserialize_with = "api_date::deserialize", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Station {
    /// A bare station for a known location id.
    pub fn for_location(location_id: impl Into<String>) -> Self {
        Self {
            id: None,
            location_id: Some(location_id.into()),
            description: None,
            kind: None,
            created_at: None,
            extra: Map::new(),
        }
    }

    /// A millisecond-UTC timestamp carried in an unmodelled field.
    pub fn date(&self, key: &str) -> Option<DateTime<Utc>> {
        self.extra.get(key)?.as_str().and_then(crate::body::revive_date)
    }

    /// The location key the alarm socket is scoped to.
    pub fn location(&self) -> Result<&str, Error> {
        match self.location_id.as_deref() {
            Some(id) if !id.trim().is_empty() => Ok(id),
            _ => Err(Error::Validation {
                field: "location_id",
                reason: "alarm device has no location_id".into(),
            }),
        }
    }
}

/// `GET /ring_devices` response; only base stations matter here.
#[derive(Debug, Deserialize)]
pub(crate) struct RingDevices {
    #[serde(default)]
    pub base_stations: Vec<Station>,
}

// ── Connection ticket ───────────────────────────────────────────────

/// One-time parameters for opening the alarm socket.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionTicket {
    pub server: String,
    #[serde(rename = "authCode")]
    pub auth_code: String,
}

// ── Alarm mode ──────────────────────────────────────────────────────

/// Security panel arming mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmMode {
    /// Away: every sensor armed.
    All,
    /// Home: perimeter sensors armed.
    Some,
    /// Disarmed.
    None,
}

impl AlarmMode {
    pub const ALL: [Self; 3] = [Self::All, Self::Some, Self::None];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Some => "some",
            Self::None => "none",
        }
    }
}

impl fmt::Display for AlarmMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlarmMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| Error::Validation {
                field: "alarm_mode",
                reason: format!("needs to be in [\"all\",\"some\",\"none\"], got {s:?}"),
            })
    }
}

/// Accept only hyphenated RFC 4122 UUIDs, versions 1 through 5.
pub fn validate_panel_id(panel_id: &str) -> Result<Uuid, Error> {
    let invalid = || Error::Validation {
        field: "alarm_panel_id",
        reason: "needs to be a UUID".into(),
    };
    if panel_id.len() != 36 {
        return Err(invalid());
    }
    let uuid = Uuid::parse_str(panel_id).map_err(|_| invalid())?;
    let version_ok = matches!(uuid.get_version_num(), 1..=5);
    if !version_ok || uuid.get_variant() != Variant::RFC4122 {
        return Err(invalid());
    }
    Ok(uuid)
}

// ── Alarm messages ──────────────────────────────────────────────────

/// An inbound alarm socket event.
///
/// `payload` is the raw event body, typically
/// `{msg, datatype, seq, body: [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmMessage {
    pub location_id: String,
    pub event: String,
    pub payload: Value,
}

impl AlarmMessage {
    pub fn msg(&self) -> Option<&str> {
        self.payload.get("msg").and_then(Value::as_str)
    }

    pub fn datatype(&self) -> Option<&str> {
        self.payload.get("datatype").and_then(Value::as_str)
    }

    pub fn seq(&self) -> Option<u64> {
        self.payload.get("seq").and_then(Value::as_u64)
    }

    pub fn body(&self) -> Option<&Value> {
        self.payload.get("body")
    }
}

/// Request the full device document list for a location.
pub(crate) fn device_list_command() -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("msg".into(), "DeviceInfoDocGetList".into());
    body
}

/// `DeviceInfoSet` switching the panel to `mode`, bypassing `bypassed` sensors.
pub(crate) fn switch_mode_command(panel: &Uuid, mode: AlarmMode, bypassed: &[String]) -> Map<String, Value> {
    let command = json!({
        "msg": "DeviceInfoSet",
        "datatype": "DeviceInfoSetType",
        "body": [{
            "zid": panel.hyphenated().to_string(),
            "command": {
                "v1": [{
                    "commandType": "security-panel.switch-mode",
                    "data": { "mode": mode.as_str(), "bypass": bypassed },
                }],
            },
        }],
    });
    match command {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

// ── Serde helpers ───────────────────────────────────────────────────

/// Accept ids as strings (after scrubbing) or plain numbers.
mod id_string {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }
}

/// Millisecond-UTC timestamps (`...T..:..:..000Z`) become `DateTime<Utc>`;
/// anything else is treated as absent.
pub mod api_date {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        Ok(raw.as_deref().and_then(crate::body::revive_date))
    }
}
