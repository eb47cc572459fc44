//! Error types for remote calls and the notification hub.

use thiserror::Error;

/// Failure talking to the complaint backend or the generative-language API.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Transport-level failure (DNS, connect, TLS, body decoding).
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("API returned status {status}")]
    Status { status: reqwest::StatusCode },
}

/// Failure establishing or running a hub connection.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("invalid hub URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("negotiation failed: {0}")]
    Negotiate(String),

    #[error("negotiation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("malformed hub message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("handshake rejected: {0}")]
    Handshake(String),

    #[error("no message from server within {0:?}")]
    Timeout(std::time::Duration),

    #[error("connection closed before the handshake completed")]
    ClosedDuringHandshake,
}
