//! Auto-reconnecting subscription to the notification hub.
//!
//! ```text
//! Disconnected -> Connecting -> Connected <-> Reconnecting -> Disconnected
//! ```
//!
//! A connection is established in three steps: negotiate over HTTP to obtain
//! a connection token, open the websocket, then exchange the protocol
//! handshake. After that the channel sends a ping every keep-alive interval
//! and treats silence longer than the server timeout as a dropped connection.
//!
//! When a connection drops, or cannot be established in the first place, the
//! channel walks through its reconnect delays. A successful connection resets
//! the schedule; running out of delays leaves the channel disconnected.
//!
//! # Usage
//!
//! ```ignore
//! let subscription = PushChannel::new(PushConfig::new("https://localhost:7001/notificationHub"))
//!     .on("ReceiveNotification", |args| println!("{args:?}"))
//!     .start();
//! // ...
//! subscription.unsubscribe().await;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use super::protocol::{self, FrameBuffer, HubMessage, NegotiateResponse};
use crate::error::PushError;

type HubSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Handler = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Upper bound on negotiate redirects.
const MAX_REDIRECTS: usize = 5;

/// Connection settings for a hub.
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// HTTP(S) URL of the hub, e.g. `https://localhost:7001/notificationHub`.
    pub hub_url: String,

    /// Bearer token for negotiate and `access_token` for the websocket.
    pub access_token: Option<String>,

    /// Connect straight to the websocket without negotiating.
    pub skip_negotiation: bool,

    /// Wait before each reconnect attempt; its length is the attempt budget.
    pub reconnect_delays: Vec<Duration>,

    pub keep_alive_interval: Duration,
    pub server_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl PushConfig {
    pub fn new(hub_url: &str) -> Self {
        Self {
            hub_url: hub_url.to_string(),
            access_token: None,
            skip_negotiation: false,
            reconnect_delays: vec![
                Duration::ZERO,
                Duration::from_secs(2),
                Duration::from_secs(10),
                Duration::from_secs(30),
            ],
            keep_alive_interval: Duration::from_secs(15),
            server_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(15),
        }
    }
}

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// How a connected session ended.
#[derive(Debug)]
enum SessionEnd {
    Shutdown,
    Dropped,
    Closed {
        error: Option<String>,
        allow_reconnect: bool,
    },
}

/// A hub client with its event handlers. Consumed by [`PushChannel::start`].
pub struct PushChannel {
    config: PushConfig,
    http: reqwest::Client,
    handlers: HashMap<String, Handler>,
}

impl PushChannel {
    pub fn new(config: PushConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            handlers: HashMap::new(),
        }
    }

    /// Handle invocations of `target`. Registering the same target again
    /// replaces the previous handler.
    ///
    /// Handlers run on the connection task, one record at a time, in arrival order.
    pub fn on<F>(mut self, target: &str, handler: F) -> Self
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.handlers.insert(target.to_string(), Arc::new(handler));
        self
    }

    /// Spawn the connection task. Must be called from within a tokio runtime.
    pub fn start(self) -> Subscription {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(self.run(state_tx, shutdown_rx));

        Subscription {
            state: state_rx,
            shutdown: shutdown_tx,
            task: Some(task),
        }
    }

    async fn run(
        self,
        state: watch::Sender<ConnectionState>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut attempt = 0usize;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let mut connected = false;
            let outcome = self.session(&state, &mut shutdown, &mut connected).await;
            if connected {
                attempt = 0;
            }

            match outcome {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Closed {
                    error,
                    allow_reconnect: false,
                }) => {
                    info!(hub = %self.config.hub_url, error = ?error, "Hub closed the connection");
                    break;
                }
                Ok(SessionEnd::Closed { error, .. }) => {
                    warn!(hub = %self.config.hub_url, error = ?error, "Hub asked the client to reconnect");
                }
                Ok(SessionEnd::Dropped) => {
                    warn!(hub = %self.config.hub_url, "Hub connection dropped");
                }
                Err(error) => {
                    warn!(hub = %self.config.hub_url, error = %error, "Hub connection error");
                }
            }

            let Some(delay) = self.config.reconnect_delays.get(attempt).copied() else {
                warn!(
                    hub = %self.config.hub_url,
                    attempts = attempt,
                    "Reconnect attempts exhausted, staying disconnected"
                );
                break;
            };
            attempt += 1;

            state.send_replace(ConnectionState::Reconnecting);
            info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting to hub");

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = sleep(delay) => {}
            }
        }

        state.send_replace(ConnectionState::Disconnected);
        info!(hub = %self.config.hub_url, "Hub subscription stopped");
    }

    async fn session(
        &self,
        state: &watch::Sender<ConnectionState>,
        shutdown: &mut watch::Receiver<bool>,
        connected: &mut bool,
    ) -> Result<SessionEnd, PushError> {
        let (socket, buffer, pending) = tokio::select! {
            _ = shutdown.changed() => return Ok(SessionEnd::Shutdown),
            opened = self.open() => opened?,
        };

        *connected = true;
        state.send_replace(ConnectionState::Connected);
        info!(hub = %self.config.hub_url, "Hub connected");

        self.pump(socket, buffer, pending, shutdown).await
    }

    /// Negotiate, open the websocket and complete the handshake.
    ///
    /// Returns the socket, the frame buffer and any records that arrived
    /// together with the handshake response.
    async fn open(&self) -> Result<(HubSocket, FrameBuffer, Vec<String>), PushError> {
        let ws_url = if self.config.skip_negotiation {
            websocket_url(
                &self.config.hub_url,
                None,
                self.config.access_token.as_deref(),
            )?
        } else {
            self.negotiate().await?
        };

        debug!(url = %ws_url, "Opening hub websocket");
        let (mut socket, _) = connect_async(ws_url.as_str()).await?;
        socket
            .send(Message::Text(protocol::handshake_request()))
            .await?;

        let mut buffer = FrameBuffer::new();
        loop {
            let next = timeout(self.config.handshake_timeout, socket.next())
                .await
                .map_err(|_| PushError::Timeout(self.config.handshake_timeout))?;

            match next {
                None | Some(Ok(Message::Close(_))) => return Err(PushError::ClosedDuringHandshake),
                Some(Err(error)) => return Err(error.into()),
                Some(Ok(Message::Text(text))) => {
                    let mut records = buffer.push(&text).into_iter();
                    if let Some(response) = records.next() {
                        protocol::parse_handshake_response(&response)?;
                        return Ok((socket, buffer, records.collect()));
                    }
                }
                Some(Ok(_)) => {}
            }
        }
    }

    async fn negotiate(&self) -> Result<String, PushError> {
        let mut hub_url = self.config.hub_url.clone();
        let mut access_token = self.config.access_token.clone();

        for _ in 0..=MAX_REDIRECTS {
            let mut request = self.http.post(negotiate_url(&hub_url)?);
            if let Some(token) = &access_token {
                request = request.bearer_auth(token);
            }

            let response = request.send().await?;
            if !response.status().is_success() {
                return Err(PushError::Negotiate(format!(
                    "negotiate returned status {}",
                    response.status()
                )));
            }

            let body: NegotiateResponse = response.json().await?;
            if let Some(error) = body.error {
                return Err(PushError::Negotiate(error));
            }

            if let Some(redirect) = body.url {
                debug!(from = %hub_url, to = %redirect, "Negotiate redirect");
                hub_url = redirect;
                if body.access_token.is_some() {
                    access_token = body.access_token;
                }
                continue;
            }

            if !body.offers_websockets() {
                return Err(PushError::Negotiate(
                    "server does not offer the WebSockets transport".to_string(),
                ));
            }

            let token = body.connection_token().ok_or_else(|| {
                PushError::Negotiate("response carried no connection token".to_string())
            })?;

            return websocket_url(&hub_url, Some(token), access_token.as_deref());
        }

        Err(PushError::Negotiate(format!(
            "more than {MAX_REDIRECTS} redirects"
        )))
    }

    async fn pump(
        &self,
        socket: HubSocket,
        mut buffer: FrameBuffer,
        pending: Vec<String>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SessionEnd, PushError> {
        for record in &pending {
            if let Some(end) = self.dispatch(record) {
                return Ok(end);
            }
        }

        let (mut sink, mut stream) = socket.split();
        let mut keep_alive = tokio::time::interval(self.config.keep_alive_interval);
        keep_alive.tick().await;
        let mut silence_deadline = Instant::now() + self.config.server_timeout;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if let Err(error) = sink.send(Message::Close(None)).await {
                        debug!(error = %error, "Close frame not delivered");
                    }
                    return Ok(SessionEnd::Shutdown);
                }
                _ = keep_alive.tick() => {
                    sink.send(Message::Text(protocol::ping_frame())).await?;
                }
                _ = sleep_until(silence_deadline) => {
                    return Err(PushError::Timeout(self.config.server_timeout));
                }
                next = stream.next() => {
                    silence_deadline = Instant::now() + self.config.server_timeout;
                    match next {
                        None => return Ok(SessionEnd::Dropped),
                        Some(Err(error)) => return Err(error.into()),
                        Some(Ok(Message::Text(text))) => {
                            for record in buffer.push(&text) {
                                if let Some(end) = self.dispatch(&record) {
                                    return Ok(end);
                                }
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!(frame = ?frame, "Hub sent a close frame");
                            return Ok(SessionEnd::Dropped);
                        }
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    }

    /// Route one record. Returns how the session ends if the record closes it.
    fn dispatch(&self, record: &str) -> Option<SessionEnd> {
        match protocol::parse_message(record) {
            Ok(HubMessage::Invocation { target, arguments }) => match self.handlers.get(&target) {
                Some(handler) => handler(arguments.as_slice()),
                None => debug!(event = %target, "No handler for hub event"),
            },
            Ok(HubMessage::Close {
                error,
                allow_reconnect,
            }) => {
                return Some(SessionEnd::Closed {
                    error,
                    allow_reconnect,
                });
            }
            Ok(HubMessage::Ping) => {}
            Ok(HubMessage::Other(kind)) => debug!(kind, "Ignoring hub message"),
            Err(error) => warn!(error = %error, "Skipping malformed hub record"),
        }
        None
    }
}

/// Handle to a running hub connection.
///
/// Dropping the handle also stops the connection, but without waiting for it.
pub struct Subscription {
    state: watch::Receiver<ConnectionState>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    pub fn states(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Stop the connection and wait until the task has finished.
    pub async fn unsubscribe(mut self) {
        self.shutdown.send_replace(true);
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                warn!(error = %error, "Hub task ended abnormally");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

fn parse_url(raw: &str) -> Result<Url, PushError> {
    Url::parse(raw).map_err(|e| PushError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

/// `{hub}/negotiate?negotiateVersion=1`, keeping any query the hub URL carries.
pub fn negotiate_url(hub_url: &str) -> Result<Url, PushError> {
    let mut url = parse_url(hub_url)?;
    let path = format!("{}/negotiate", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut()
        .append_pair("negotiateVersion", &protocol::PROTOCOL_VERSION.to_string());
    Ok(url)
}

/// Websocket URL for the hub, with `id` and `access_token` query parameters when given.
pub fn websocket_url(
    hub_url: &str,
    connection_token: Option<&str>,
    access_token: Option<&str>,
) -> Result<String, PushError> {
    let mut url = parse_url(hub_url)?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(PushError::InvalidUrl {
                url: hub_url.to_string(),
                reason: format!("unsupported scheme '{other}'"),
            });
        }
    };
    url.set_scheme(scheme).map_err(|_| PushError::InvalidUrl {
        url: hub_url.to_string(),
        reason: "cannot switch to a websocket scheme".to_string(),
    })?;

    if connection_token.is_some() || access_token.is_some() {
        let mut query = url.query_pairs_mut();
        if let Some(token) = connection_token {
            query.append_pair("id", token);
        }
        if let Some(token) = access_token {
            query.append_pair("access_token", token);
        }
    }

    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiate_url() {
        let url = negotiate_url("https://localhost:7001/notificationHub").unwrap();
        assert_eq!(
            url.as_str(),
            "https://localhost:7001/notificationHub/negotiate?negotiateVersion=1"
        );

        let url = negotiate_url("http://hub.local/hubs/notify/?tenant=7").unwrap();
        assert_eq!(
            url.as_str(),
            "http://hub.local/hubs/notify/negotiate?tenant=7&negotiateVersion=1"
        );
    }

    #[test]
    fn test_websocket_url_scheme_mapping() {
        assert_eq!(
            websocket_url("https://localhost:7001/notificationHub", Some("abc"), None).unwrap(),
            "wss://localhost:7001/notificationHub?id=abc"
        );
        assert_eq!(
            websocket_url("http://127.0.0.1:5000/hub", None, Some("t k")).unwrap(),
            "ws://127.0.0.1:5000/hub?access_token=t+k"
        );
        assert_eq!(
            websocket_url("ws://127.0.0.1:5000/hub", None, None).unwrap(),
            "ws://127.0.0.1:5000/hub"
        );
    }

    #[test]
    fn test_websocket_url_rejects_other_schemes() {
        assert!(matches!(
            websocket_url("ftp://example.com/hub", None, None),
            Err(PushError::InvalidUrl { .. })
        ));
        assert!(matches!(
            websocket_url("not a url", None, None),
            Err(PushError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_default_reconnect_schedule() {
        let config = PushConfig::new("https://localhost:7001/notificationHub");

        assert_eq!(
            config.reconnect_delays,
            vec![
                Duration::ZERO,
                Duration::from_secs(2),
                Duration::from_secs(10),
                Duration::from_secs(30),
            ]
        );
        assert!(config.keep_alive_interval < config.server_timeout);
    }

    #[tokio::test]
    async fn test_unreachable_hub_ends_disconnected() {
        let mut config = PushConfig::new("http://127.0.0.1:9/notificationHub");
        config.reconnect_delays = vec![Duration::from_millis(5)];

        let subscription = PushChannel::new(config).start();
        let mut states = subscription.states();
        states
            .wait_for(|s| *s == ConnectionState::Disconnected)
            .await
            .unwrap();

        subscription.unsubscribe().await;
    }
}
