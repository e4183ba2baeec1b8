//! Engine.IO v3 / Socket.IO v2 text framing for the alarm socket.
//!
//! Only what the alarm channel uses: open handshake, ping/pong, namespace
//! connect/disconnect, events, and error packets. Binary attachments and
//! acknowledgements are not produced by the service.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::Error;

/// Engine.IO ping (client → server in v3).
pub const PING: &str = "2";
/// Engine.IO pong.
pub const PONG: &str = "3";
/// Socket.IO disconnect from the default namespace.
pub const DISCONNECT: &str = "41";

/// Payload of the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    #[serde(default)]
    pub sid: String,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    5_000
}

impl Default for Handshake {
    fn default() -> Self {
        Self {
            sid: String::new(),
            ping_interval: default_ping_interval(),
            ping_timeout: default_ping_timeout(),
        }
    }
}

impl Handshake {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval.max(1))
    }

    /// How long the peer may stay silent before the link counts as dead:
    /// one ping interval plus the time allowed for the pong.
    pub fn liveness_window(&self) -> Duration {
        self.ping_interval() + Duration::from_millis(self.ping_timeout)
    }
}

/// Socket.IO packet carried inside an Engine.IO message.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Connect,
    Disconnect,
    Event { name: String, payload: Value },
    Ack,
    Error(Value),
}

/// One decoded text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(Packet),
    Upgrade,
    Noop,
}

/// Decode one websocket text frame.
pub fn decode(text: &str) -> Result<Frame, Error> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| Error::Protocol("empty frame".into()))?;
    let rest = chars.as_str();

    match kind {
        '0' => {
            let handshake = serde_json::from_str(rest)
                .map_err(|e| Error::Protocol(format!("bad open packet: {e}")))?;
            Ok(Frame::Open(handshake))
        }
        '1' => Ok(Frame::Close),
        '2' => Ok(Frame::Ping(rest.to_owned())),
        '3' => Ok(Frame::Pong(rest.to_owned())),
        '4' => decode_packet(rest).map(Frame::Message),
        '5' => Ok(Frame::Upgrade),
        '6' => Ok(Frame::Noop),
        other => Err(Error::Protocol(format!("unknown engine.io packet type {other:?}"))),
    }
}

fn decode_packet(text: &str) -> Result<Packet, Error> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| Error::Protocol("empty socket.io packet".into()))?;
    let data = strip_ack_id(strip_namespace(chars.as_str()));

    match kind {
        '0' => Ok(Packet::Connect),
        '1' => Ok(Packet::Disconnect),
        '2' => decode_event(data),
        '3' => Ok(Packet::Ack),
        '4' => {
            let value = if data.is_empty() {
                Value::Null
            } else {
                serde_json::from_str(data).unwrap_or_else(|_| Value::String(data.to_owned()))
            };
            Ok(Packet::Error(value))
        }
        other => Err(Error::Protocol(format!("unsupported socket.io packet type {other:?}"))),
    }
}

fn decode_event(data: &str) -> Result<Packet, Error> {
    let args: Vec<Value> = serde_json::from_str(data)
        .map_err(|e| Error::Protocol(format!("bad event payload: {e}")))?;
    let mut args = args.into_iter();
    let name = match args.next() {
        Some(Value::String(name)) => name,
        _ => return Err(Error::Protocol("event without a name".into())),
    };
    let payload = args.next().unwrap_or(Value::Null);
    Ok(Packet::Event { name, payload })
}

/// `/nsp,rest` → `rest`; the default namespace has no prefix.
fn strip_namespace(data: &str) -> &str {
    if data.starts_with('/') {
        data.split_once(',').map_or("", |(_, rest)| rest)
    } else {
        data
    }
}

fn strip_ack_id(data: &str) -> &str {
    data.trim_start_matches(|c: char| c.is_ascii_digit())
}

/// Encode an event for the default namespace: `42["name",payload]`.
pub fn encode_event(name: &str, payload: &Value) -> String {
    let frame = Value::Array(vec![Value::String(name.to_owned()), payload.clone()]);
    format!("42{frame}")
}
