//! Leader log subscription over the node's pubsub endpoint.
//!
//! The stream emits raw transaction signatures that mention the leader; the
//! engine fetches and classifies them. Connection health is driven by a
//! ping/pong heartbeat and every drop is followed by a capped exponential
//! backoff reconnect.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Bytes, Error as WsError, Message};
use tracing::{debug, info, warn};

use crate::trading::MirrorConfig;

/// Connection lifecycle, observable from outside the stream task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
        }
    }
}

/// How an established session ended.
enum SessionEnd {
    /// The signature consumer dropped; the stream should stop for good.
    ConsumerGone,
    /// The server closed the link, the socket died, or the heartbeat
    /// timed out.
    Remote,
}

/// Subscribes to logs mentioning the leader and forwards signatures.
pub struct LogStream {
    ws_url: String,
    leader: String,
    ping_interval: Duration,
    pong_timeout: Duration,
    max_backoff: Duration,
    state: watch::Sender<ConnectionState>,
}

impl LogStream {
    pub fn new(config: &MirrorConfig) -> (Self, watch::Receiver<ConnectionState>) {
        let (state, state_rx) = watch::channel(ConnectionState::Disconnected);
        let stream = Self {
            ws_url: config.ws_url.clone(),
            leader: config.leader.clone(),
            ping_interval: Duration::from_secs(config.ping_interval_secs),
            pong_timeout: Duration::from_secs(config.pong_timeout_secs),
            max_backoff: Duration::from_secs(config.reconnect_max_delay_secs),
            state,
        };
        (stream, state_rx)
    }

    /// Run until the signature consumer goes away. Reconnects forever; the
    /// backoff restarts small once a session has been established.
    pub async fn run(self, tx: mpsc::Sender<String>) {
        let mut attempt = 0u32;
        loop {
            if attempt == 0 {
                self.state.send_replace(ConnectionState::Connecting);
            } else {
                self.state
                    .send_replace(ConnectionState::Reconnecting { attempt });
                let delay = backoff_delay(attempt, self.max_backoff);
                info!(
                    attempt,
                    delay_secs = delay.as_secs(),
                    "Reconnecting to log stream"
                );
                tokio::time::sleep(delay).await;
            }

            match self.session(&tx).await {
                Ok(SessionEnd::ConsumerGone) => {
                    self.state.send_replace(ConnectionState::Disconnected);
                    info!("Signature consumer closed, stopping log stream");
                    return;
                }
                Ok(SessionEnd::Remote) => {
                    warn!("Log stream dropped after an established session");
                    attempt = 1;
                }
                Err(err) => {
                    warn!(error = %err, "Failed to establish log stream session");
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    /// One connect-subscribe-read cycle. `Err` means the session never got
    /// established; anything after subscription ends with a [`SessionEnd`].
    async fn session(&self, tx: &mpsc::Sender<String>) -> Result<SessionEnd, WsError> {
        debug!(url = %self.ws_url, "Connecting to pubsub endpoint");
        let (socket, _) = connect_async(&self.ws_url).await?;
        let (mut sink, mut source) = socket.split();

        let subscribe = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "logsSubscribe",
            "params": [
                {"mentions": [self.leader]},
                {"commitment": "confirmed"},
            ],
        });
        sink.send(Message::Text(subscribe.to_string().into()))
            .await?;

        self.state.send_replace(ConnectionState::Connected);
        info!(leader = %self.leader, "Subscribed to leader logs");

        let mut ping = interval(self.ping_interval);
        ping.tick().await; // the first tick fires immediately
        let mut last_pong = Instant::now();

        loop {
            tokio::select! {
                _ = ping.tick() => {
                    if last_pong.elapsed() > self.ping_interval + self.pong_timeout {
                        warn!("Heartbeat timed out, dropping connection");
                        return Ok(SessionEnd::Remote);
                    }
                    if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                        return Ok(SessionEnd::Remote);
                    }
                }
                message = source.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(signature) = extract_signature(text.as_str()) {
                                if tx.send(signature).await.is_err() {
                                    return Ok(SessionEnd::ConsumerGone);
                                }
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {
                            last_pong = Instant::now();
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if sink.send(Message::Pong(data)).await.is_err() {
                                return Ok(SessionEnd::Remote);
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "Close frame received");
                            return Ok(SessionEnd::Remote);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            warn!(error = %err, "Socket read failed");
                            return Ok(SessionEnd::Remote);
                        }
                        None => return Ok(SessionEnd::Remote),
                    }
                }
            }
        }
    }
}

/// Delay before reconnect attempt `attempt` (1-based), doubling up to `max`.
fn backoff_delay(attempt: u32, max: Duration) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    Duration::from_secs(1u64 << exp).min(max)
}

/// Pull the transaction signature out of a `logsNotification` payload.
/// Subscription confirmations and unrelated frames yield `None`.
fn extract_signature(raw: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw).ok()?;
    if value.get("id").is_some() && value.get("result").is_some() {
        debug!("Log subscription confirmed");
        return None;
    }
    value
        .pointer("/params/result/value/signature")
        .and_then(Value::as_str)
        .map(String::from)
}
