//! Wire format of the notification hub.
//!
//! The hub speaks the JSON hub protocol: every message is a JSON object
//! terminated by the ASCII record separator (`0x1E`). A single websocket
//! message may carry several records, and a record may in principle be split
//! across websocket messages, so incoming text goes through a [`FrameBuffer`].
//!
//! # Messages handled
//!
//! | type | meaning | fields |
//! |------|---------|--------|
//! | 1 | Invocation | `target`, `arguments` |
//! | 6 | Ping | |
//! | 7 | Close | `error`, `allowReconnect` |
//!
//! Anything else (completions, stream items, acks) is parsed as [`HubMessage::Other`].

use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::PushError;

/// Terminator of every record.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Version of the JSON hub protocol spoken by the client.
pub const PROTOCOL_VERSION: u32 = 1;

const INVOCATION: u64 = 1;
const PING: u64 = 6;
const CLOSE: u64 = 7;

/// The first record a client sends after the websocket opens.
pub fn handshake_request() -> String {
    let body = json!({ "protocol": "json", "version": PROTOCOL_VERSION });
    format!("{body}{RECORD_SEPARATOR}")
}

/// Keep-alive record sent by the client.
pub fn ping_frame() -> String {
    format!("{}{RECORD_SEPARATOR}", json!({ "type": PING }))
}

/// Accumulates websocket text and yields complete records.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: String,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every record it completed, separators removed.
    /// Empty records are skipped.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.pending.push_str(chunk);

        let Some(last) = self.pending.rfind(RECORD_SEPARATOR) else {
            return Vec::new();
        };

        let rest = self.pending.split_off(last + RECORD_SEPARATOR.len_utf8());
        let complete = std::mem::replace(&mut self.pending, rest);

        complete
            .split(RECORD_SEPARATOR)
            .filter(|record| !record.trim().is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Whether an unterminated record is waiting for more input.
    pub fn has_partial(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// A decoded hub record.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    /// The server invokes a client-side event.
    Invocation {
        target: String,
        arguments: Vec<Value>,
    },

    Ping,

    /// The server is closing the connection.
    Close {
        error: Option<String>,
        /// Only an explicit `true` permits reconnecting.
        allow_reconnect: bool,
    },

    /// A message type the client does not act on.
    Other(u64),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(rename = "type")]
    kind: u64,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    arguments: Vec<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    allow_reconnect: Option<bool>,
}

/// Decode one record (without its separator).
pub fn parse_message(record: &str) -> Result<HubMessage, PushError> {
    let raw: RawMessage = serde_json::from_str(record)?;

    let message = match (raw.kind, raw.target) {
        (INVOCATION, Some(target)) => HubMessage::Invocation {
            target,
            arguments: raw.arguments,
        },
        (PING, _) => HubMessage::Ping,
        (CLOSE, _) => HubMessage::Close {
            error: raw.error,
            allow_reconnect: raw.allow_reconnect.unwrap_or(false),
        },
        (kind, _) => HubMessage::Other(kind),
    };

    Ok(message)
}

#[derive(Debug, Deserialize)]
struct HandshakeResponse {
    #[serde(default)]
    error: Option<String>,
}

/// Check the server's answer to [`handshake_request`]. `{}` means accepted.
pub fn parse_handshake_response(record: &str) -> Result<(), PushError> {
    let response: HandshakeResponse = serde_json::from_str(record)?;
    match response.error {
        Some(error) => Err(PushError::Handshake(error)),
        None => Ok(()),
    }
}

/// Body of `POST {hub}/negotiate`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiateResponse {
    #[serde(default)]
    pub negotiate_version: u32,
    #[serde(default)]
    pub connection_id: Option<String>,
    #[serde(default)]
    pub connection_token: Option<String>,
    /// Redirect to another hub endpoint.
    #[serde(default)]
    pub url: Option<String>,
    /// Token to use against the redirected endpoint.
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub available_transports: Vec<AvailableTransport>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableTransport {
    pub transport: String,
    #[serde(default)]
    pub transfer_formats: Vec<String>,
}

impl NegotiateResponse {
    /// Identifier to pass as `id` when opening the websocket.
    ///
    /// Version 1 servers hand out a separate connection token; version 0
    /// servers reuse the connection id.
    pub fn connection_token(&self) -> Option<&str> {
        if self.negotiate_version >= 1 {
            self.connection_token.as_deref()
        } else {
            self.connection_id.as_deref()
        }
    }

    /// True unless the server lists transports and websockets is not among them.
    pub fn offers_websockets(&self) -> bool {
        self.available_transports.is_empty()
            || self
                .available_transports
                .iter()
                .any(|t| t.transport == "WebSockets")
    }
}
