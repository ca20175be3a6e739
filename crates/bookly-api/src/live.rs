//! Live change feed with auto-reconnect.
//!
//! Connects to the backend's websocket change endpoint, registers the
//! widget's table subscriptions, and streams parsed change events through a
//! [`tokio::sync::broadcast`] channel. Handles reconnection with exponential
//! backoff + jitter (and resubscription) automatically.
//!
//! # Example
//!
//! ```rust,ignore
//! use bookly_api::live::{LiveFeedHandle, ReconnectConfig, Subscription};
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! let cancel = CancellationToken::new();
//! let ws_url = Url::parse("wss://api.bookly.example/widget/v1/live")?;
//! let subs = vec![Subscription::table("sessions").filtered("activity_id", "act_1")];
//!
//! let handle = LiveFeedHandle::connect(ws_url, subs, ReconnectConfig::default(), cancel.clone());
//! let mut rx = handle.subscribe();
//!
//! while let Ok(change) = rx.recv().await {
//!     println!("{change:?}");
//! }
//!
//! handle.shutdown();
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;

// ── Broadcast channel capacity ───────────────────────────────────────

const CHANGE_CHANNEL_CAPACITY: usize = 1024;

// ── Subscription ─────────────────────────────────────────────────────

/// A table subscription, optionally narrowed by an equality filter.
///
/// Sent to the backend on every (re)connect, e.g. sessions filtered by
/// activity id or activities filtered by venue id.
#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<SubscriptionFilter>,
}

/// `column = value` filter attached to a [`Subscription`].
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionFilter {
    pub column: String,
    pub value: String,
}

impl Subscription {
    /// Subscribe to every change on a table.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: None,
        }
    }

    /// Narrow the subscription to rows where `column == value`.
    pub fn filtered(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter = Some(SubscriptionFilter {
            column: column.into(),
            value: value.into(),
        });
        self
    }
}

// ── ChangeEvent ──────────────────────────────────────────────────────

/// A parsed change event from the live feed.
///
/// Update events carry the full changed record so consumers can merge it
/// in place by id. Inserts and deletes intentionally carry less -- the
/// consumer is expected to refetch the affected range, because the feed
/// makes no ordering promises relative to in-flight reads.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Insert { table: String, record: Value },
    Update { table: String, record: Value },
    Delete { table: String, id: String },
}

impl ChangeEvent {
    /// The table this change applies to.
    pub fn table(&self) -> &str {
        match self {
            Self::Insert { table, .. } | Self::Update { table, .. } | Self::Delete { table, .. } => {
                table
            }
        }
    }
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for feed reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── LiveFeedHandle ───────────────────────────────────────────────────

/// Handle to a running live change feed.
///
/// Drop all receivers and call [`shutdown`](Self::shutdown) to tear down
/// the background task.
pub struct LiveFeedHandle {
    change_rx: broadcast::Receiver<Arc<ChangeEvent>>,
    cancel: CancellationToken,
}

impl LiveFeedHandle {
    /// Spawn the feed's reconnection loop and return immediately.
    ///
    /// The first connection attempt happens asynchronously -- subscribe to
    /// the change receiver to start consuming events.
    pub fn connect(
        ws_url: Url,
        subscriptions: Vec<Subscription>,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (change_tx, change_rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            feed_loop(ws_url, subscriptions, change_tx, reconnect, task_cancel).await;
        });

        Self { change_rx, cancel }
    }

    /// Get a new broadcast receiver for the change stream.
    ///
    /// Multiple consumers can subscribe concurrently. If a consumer falls
    /// behind, it receives [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ChangeEvent>> {
        self.change_rx.resubscribe()
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → subscribe → read → on error, backoff → reconnect.
async fn feed_loop(
    ws_url: Url,
    subscriptions: Vec<Subscription>,
    change_tx: broadcast::Sender<Arc<ChangeEvent>>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = connect_and_read(&ws_url, &subscriptions, &change_tx, &cancel) => {
                match result {
                    // Clean disconnect (server close frame or stream ended).
                    // Reset attempt counter and reconnect immediately.
                    Ok(()) => {
                        tracing::info!("live feed disconnected cleanly, reconnecting");
                        attempt = 0;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, attempt, "live feed error");

                        if let Some(max) = reconnect.max_retries {
                            if attempt >= max {
                                tracing::error!(
                                    max_retries = max,
                                    "live feed reconnection limit reached, giving up"
                                );
                                break;
                            }
                        }

                        let delay = calculate_backoff(attempt, &reconnect);
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }

                        attempt += 1;
                    }
                }
            }
        }
    }
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish a single feed connection, register subscriptions, then read
/// messages until the connection drops.
async fn connect_and_read(
    url: &Url,
    subscriptions: &[Subscription],
    change_tx: &broadcast::Sender<Arc<ChangeEvent>>,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    tracing::info!(url = %url, "connecting to live feed");

    let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| Error::LiveConnect(e.to_string()))?;

    let (mut write, mut read) = ws_stream.split();

    // Register every subscription before consuming; the backend only
    // streams changes for tables registered on this connection.
    for sub in subscriptions {
        let frame = serde_json::json!({ "action": "subscribe", "subscription": sub });
        write
            .send(tungstenite::Message::text(frame.to_string()))
            .await
            .map_err(|e| Error::LiveConnect(e.to_string()))?;
    }

    tracing::info!(subscriptions = subscriptions.len(), "live feed connected");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        parse_and_broadcast(&text, change_tx);
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite handles pong replies automatically
                        tracing::trace!("live feed ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(code = %cf.code, reason = %cf.reason, "live feed close frame");
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        return Err(Error::LiveConnect(e.to_string()));
                    }
                    None => {
                        tracing::info!("live feed stream ended");
                        return Ok(());
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }
}

// ── Message parsing ──────────────────────────────────────────────────

/// Raw change message from the feed.
#[derive(Debug, Deserialize)]
struct WireChange {
    #[serde(rename = "type")]
    change_type: String,
    table: String,
    #[serde(default)]
    record: Option<Value>,
    #[serde(default)]
    id: Option<String>,
}

/// Parse a feed text frame and broadcast the change it carries, if any.
fn parse_and_broadcast(text: &str, change_tx: &broadcast::Sender<Arc<ChangeEvent>>) {
    let wire: WireChange = match serde_json::from_str(text) {
        Ok(w) => w,
        Err(e) => {
            tracing::debug!(error = %e, "failed to parse live feed message");
            return;
        }
    };

    let change = match wire.change_type.as_str() {
        "insert" => wire.record.map(|record| ChangeEvent::Insert {
            table: wire.table,
            record,
        }),
        "update" => wire.record.map(|record| ChangeEvent::Update {
            table: wire.table,
            record,
        }),
        // Deletes sometimes carry only an id, sometimes the full record.
        "delete" => wire
            .id
            .or_else(|| {
                wire.record
                    .as_ref()
                    .and_then(|r| r.get("id"))
                    .and_then(Value::as_str)
                    .map(String::from)
            })
            .map(|id| ChangeEvent::Delete {
                table: wire.table,
                id,
            }),
        other => {
            tracing::debug!(change_type = other, "unknown live feed message type");
            None
        }
    };

    if let Some(change) = change {
        // Ignore send errors -- just means no active subscribers right now
        let _ = change_tx.send(Arc::new(change));
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25% to spread out reconnection storms from many widget
/// instances embedded on the same page.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(attempt.min(16) as i32);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    // Not cryptographically random, but good enough for backoff spread.
    let jitter_factor = 1.0 + 0.25 * ((f64::from(attempt) * 7.3).sin());
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────
