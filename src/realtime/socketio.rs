//! Engine.IO v4 / Socket.IO v5 packet codec (WebSocket transport, default
//! namespace).
//!
//! Frame layout: one Engine.IO type digit, then for `4` (message) one
//! Socket.IO type digit, an optional `/nsp,` prefix, an optional ack id and
//! a JSON body.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

/// Socket.IO connect request for the default namespace.
pub const CONNECT: &str = "40";
/// Engine.IO pong (reply to the server's `2`).
pub const PONG: &str = "3";

/// Engine.IO handshake parameters from the `0` open packet.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
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
    20_000
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Noop,
    /// Namespace connect acknowledged.
    Connect,
    Disconnect,
    Event {
        ack_id: Option<u64>,
        name: String,
        payload: Value,
    },
    Ack {
        ack_id: u64,
        payload: Value,
    },
    ConnectError(String),
}

/// Decode one text frame.
pub fn decode(frame: &str) -> Result<Packet> {
    let mut chars = frame.chars();
    let eio = chars.next().context("empty frame")?;
    let rest = chars.as_str();
    match eio {
        '0' => {
            let handshake: Handshake =
                serde_json::from_str(rest).context("Failed to parse open packet")?;
            Ok(Packet::Open(handshake))
        }
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '6' => Ok(Packet::Noop),
        '4' => decode_socket(rest),
        other => bail!("Unknown Engine.IO packet type '{}'", other),
    }
}

fn decode_socket(body: &str) -> Result<Packet> {
    let mut chars = body.chars();
    let kind = chars.next().context("empty Socket.IO packet")?;
    let mut rest = chars.as_str();

    // Non-default namespaces are prefixed with "/name,".
    if rest.starts_with('/') {
        rest = rest.split_once(',').map(|(_, r)| r).unwrap_or("");
    }

    let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    let ack_id = if digits > 0 {
        Some(rest[..digits].parse::<u64>().context("Invalid ack id")?)
    } else {
        None
    };
    let data = &rest[digits..];

    match kind {
        '0' => Ok(Packet::Connect),
        '1' => Ok(Packet::Disconnect),
        '2' => {
            let args: Vec<Value> =
                serde_json::from_str(data).context("Failed to parse event arguments")?;
            let mut args = args.into_iter();
            let name = match args.next() {
                Some(Value::String(name)) => name,
                _ => bail!("Event packet without a name"),
            };
            Ok(Packet::Event {
                ack_id,
                name,
                payload: args.next().unwrap_or(Value::Null),
            })
        }
        '3' => {
            let ack_id = ack_id.context("Ack packet without id")?;
            let mut args: Vec<Value> =
                serde_json::from_str(data).context("Failed to parse ack arguments")?;
            let payload = if args.is_empty() {
                Value::Null
            } else {
                args.swap_remove(0)
            };
            Ok(Packet::Ack { ack_id, payload })
        }
        '4' => {
            let message = serde_json::from_str::<Value>(data)
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
                .unwrap_or_else(|| data.to_string());
            Ok(Packet::ConnectError(message))
        }
        other => bail!("Unsupported Socket.IO packet type '{}'", other),
    }
}

/// Encode an event for the default namespace.
pub fn encode_event(name: &str, payload: &Value) -> String {
    format!("42{}", json!([name, payload]))
}
