use super::codec::{self, Envelope};
use super::registry::{Handler, SubscriptionRegistry};
use crate::error::Result;
use futures_util::{SinkExt, StreamExt};
use log::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

const DEFAULT_WS_URL: &str = "ws://localhost:8080/ws";
const WS_URL_ENV_VAR: &str = "PICKEM_WS_URL";
const DEFAULT_MAX_ATTEMPTS: u32 = 5; // Max number of consecutive reconnect attempts
const DEFAULT_BASE_DELAY_MS: u64 = 1000; // Scaled by the attempt number between retries

/// Connection settings for a [`RealtimeClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base WebSocket endpoint; the session token is appended as a query
    /// parameter at connect time.
    pub base_url: String,
    /// Base reconnect delay in milliseconds. The Nth consecutive retry
    /// waits `base_delay_ms * N`.
    pub base_delay_ms: u64,
    /// Retry ceiling: automatic reconnection stops after this many
    /// consecutive failed attempts.
    pub max_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var(WS_URL_ENV_VAR)
                .unwrap_or_else(|_| DEFAULT_WS_URL.to_string()),
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Lifecycle of the single underlying connection.
///
/// Observable via [`RealtimeClient::state`] so a UI layer can render
/// "reconnecting" or "offline" without polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No connection and no automatic retry pending. Initial state, and
    /// terminal after an explicit disconnect or retry exhaustion.
    Disconnected,
    /// A transport handshake is in flight.
    Connecting,
    /// Connected; inbound frames are being dispatched and `send` transmits.
    Open,
    /// The transport dropped; a reconnect may be scheduled.
    Closed,
}

struct Inner {
    config: ClientConfig,
    registry: SubscriptionRegistry,
    // Sender for the active connection's writer task, None while down
    shared_tx: Mutex<Option<mpsc::Sender<Message>>>,
    state_tx: watch::Sender<ConnectionState>,
    // Cleared by disconnect() to suppress any scheduled reconnect
    wanted: AtomicBool,
    manager: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn set_state(&self, state: ConnectionState) {
        trace!("Connection state -> {:?}", state);
        self.state_tx.send_replace(state);
    }
}

/// The real-time messaging client.
///
/// Owns one WebSocket connection at a time, fans inbound messages out to
/// subscribers by message kind, and reconnects automatically after
/// unexpected closures with linear backoff up to a retry ceiling.
///
/// Cloning is cheap and clones share the same connection and registry.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<Inner>,
}

impl RealtimeClient {
    /// Creates a client in the `Disconnected` state with no subscriptions.
    pub fn new(config: ClientConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                registry: SubscriptionRegistry::new(),
                shared_tx: Mutex::new(None),
                state_tx,
                wanted: AtomicBool::new(false),
                manager: Mutex::new(None),
            }),
        }
    }

    /// Opens the connection, authenticating with `token`.
    ///
    /// Returns immediately after spawning the connection task; handshake
    /// failures feed the reconnect policy and are visible via [`state`].
    /// A no-op while a connection task is already running (connecting,
    /// open, or waiting out a backoff delay). The token is captured here
    /// and reused verbatim for every automatic reconnect.
    ///
    /// [`state`]: RealtimeClient::state
    pub async fn connect(&self, token: &str) -> Result<()> {
        let mut manager = self.inner.manager.lock().await;
        if manager.as_ref().map_or(false, |h| !h.is_finished()) {
            debug!("connect ignored: connection task already running");
            return Ok(());
        }

        let mut url = Url::parse(&self.inner.config.base_url)?;
        url.query_pairs_mut().append_pair("token", token);

        self.inner.wanted.store(true, Ordering::SeqCst);
        *manager = Some(tokio::spawn(run_manager(Arc::clone(&self.inner), url)));
        Ok(())
    }

    /// Closes the connection and clears every subscription.
    ///
    /// Cancels any pending scheduled reconnect: a retry scheduled before
    /// this call never fires afterward. Idempotent; safe when never
    /// connected.
    pub async fn disconnect(&self) {
        self.inner.wanted.store(false, Ordering::SeqCst);
        if let Some(handle) = self.inner.manager.lock().await.take() {
            handle.abort();
            // Wait for the cancellation to land so a follow-up connect
            // sees the task as finished.
            let _ = handle.await;
        }
        if let Some(tx) = self.inner.shared_tx.lock().await.take() {
            let _ = tx.send(Message::Close(None)).await;
        }
        self.inner.registry.clear();
        self.inner.set_state(ConnectionState::Disconnected);
    }

    /// Serializes `message` and transmits it if the connection is open.
    ///
    /// While the connection is anything other than `Open` the message is
    /// silently dropped; there is no buffering or queueing. Serialization
    /// failures are returned to the caller and leave the connection
    /// untouched.
    pub async fn send<T: Serialize + ?Sized>(&self, message: &T) -> Result<()> {
        let text = codec::encode(message)?;
        let guard = self.inner.shared_tx.lock().await;
        if *self.inner.state_tx.borrow() != ConnectionState::Open {
            debug!("send dropped: connection not open");
            return Ok(());
        }
        if let Some(tx) = guard.as_ref() {
            if tx.send(Message::Text(text)).await.is_err() {
                // Writer already shut down; the close event will follow.
                debug!("send dropped: writer task gone");
            }
        }
        Ok(())
    }

    /// Registers `handler` for messages of `kind`.
    ///
    /// Handlers for the same kind run in registration order. Registering
    /// the same handler twice creates two entries; keep a clone of the
    /// `Arc` to unsubscribe the specific registration.
    pub fn subscribe(&self, kind: &str, handler: Handler) {
        self.inner.registry.subscribe(kind, handler);
    }

    /// Removes the first registration of `handler` under `kind`, if any.
    pub fn unsubscribe(&self, kind: &str, handler: &Handler) {
        self.inner.registry.unsubscribe(kind, handler);
    }

    /// Watch channel tracking the connection lifecycle.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// The connection state right now.
    pub fn current_state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }
}

/// Drives the connect/reconnect loop for one `connect` call.
///
/// The credential-bearing URL is captured once and reused for every retry.
async fn run_manager(inner: Arc<Inner>, url: Url) {
    let base_delay = Duration::from_millis(inner.config.base_delay_ms);
    let mut attempts: u32 = 0;
    loop {
        inner.set_state(ConnectionState::Connecting);
        info!("[Manager] Attempting connection (attempt {})...", attempts);
        match open_connection(Arc::clone(&inner), &url).await {
            Ok((handle, tx)) => {
                info!("[Manager] Connection established successfully.");
                attempts = 0; // Reset on successful open
                *inner.shared_tx.lock().await = Some(tx);
                inner.set_state(ConnectionState::Open);

                // Wait for this connection to end (close/error)
                handle.await.unwrap_or_else(|e| {
                    error!("[Manager] Connection task panicked: {}", e);
                });
                info!("[Manager] Connection ended.");
            }
            Err(e) => {
                error!("[Manager] Failed to establish connection: {}", e);
            }
        }

        *inner.shared_tx.lock().await = None;
        inner.set_state(ConnectionState::Closed);

        if !inner.wanted.load(Ordering::SeqCst) {
            // Explicit disconnect; never reconnect on its heels.
            inner.set_state(ConnectionState::Disconnected);
            break;
        }
        if attempts >= inner.config.max_attempts {
            error!(
                "[Manager] Max attempts ({}) reached. Stopping connection attempts.",
                inner.config.max_attempts
            );
            inner.set_state(ConnectionState::Disconnected);
            break;
        }

        attempts += 1;
        let delay = base_delay * attempts;
        warn!(
            "[Manager] Disconnected. Retrying in {:?} ({}/{})...",
            delay, attempts, inner.config.max_attempts
        );
        sleep(delay).await;

        if !inner.wanted.load(Ordering::SeqCst) {
            inner.set_state(ConnectionState::Disconnected);
            break;
        }
    }
    info!("[Manager] Task finished.");
}

/// Opens the transport and spawns the per-connection reader/writer tasks.
///
/// Returns a handle that resolves when the connection ends, plus the
/// channel sender feeding the writer task.
async fn open_connection(
    inner: Arc<Inner>,
    url: &Url,
) -> Result<(JoinHandle<()>, mpsc::Sender<Message>)> {
    info!("Connecting to WebSocket: {}", url.as_str());
    let (ws_stream, response) = connect_async(url.as_str()).await.map_err(|e| {
        crate::RealtimeError::WebsocketError(format!("WebSocket connection failed: {}", e))
    })?;
    info!(
        "WebSocket connected successfully. Response: {:?}",
        response.status()
    );

    let (mut write, mut read) = ws_stream.split();

    // Channel for sending outbound messages to the writer task
    let (tx, mut rx) = mpsc::channel::<Message>(32);
    let tx_clone_for_ping = tx.clone(); // Clone sender for the read task (to send pongs)

    // --- Writer Task ---
    // Reads messages from the channel and sends them to the WebSocket sink.
    let writer_handle = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            trace!("Sending WS message: {:?}", message);
            if let Err(e) = write.send(message).await {
                error!("WebSocket send error: {}. Stopping writer task.", e);
                break;
            }
        }
        info!("WebSocket writer task finished.");
    });

    // --- Reader Task ---
    // Reads frames from the stream, answers pings, decodes and dispatches.
    let reader_handle = tokio::spawn(async move {
        loop {
            match read.next().await {
                Some(Ok(msg)) => match msg {
                    Message::Text(text) => {
                        trace!("Received WS Text: {}", text);
                        match codec::decode(&text) {
                            Ok(envelope) => inner.registry.dispatch(&envelope),
                            Err(e) => {
                                warn!("Dropping malformed frame: {}", e);
                            }
                        }
                    }
                    Message::Binary(bin) => {
                        trace!("Received WS Binary ({} bytes), ignoring", bin.len());
                    }
                    Message::Ping(ping_data) => {
                        trace!("Received WS Ping, sending Pong via channel");
                        if tx_clone_for_ping
                            .send(Message::Pong(ping_data))
                            .await
                            .is_err()
                        {
                            error!("Failed to send Pong: writer channel closed.");
                            break;
                        }
                    }
                    Message::Pong(_) => {
                        trace!("Received WS Pong");
                    }
                    Message::Close(close_frame) => {
                        warn!("Received WS Close frame: {:?}", close_frame);
                        break;
                    }
                    Message::Frame(_) => { /* Ignore */ }
                },
                Some(Err(e)) => {
                    error!("WebSocket read error: {}", e);
                    break;
                }
                None => {
                    info!("WebSocket stream ended (read None).");
                    break;
                }
            }
        }
        info!("WebSocket reader task finished.");
        // Dropping the pong sender lets the writer task drain and exit.
        drop(tx_clone_for_ping);
    });

    // The connection is over when either side finishes.
    let combined_handle = tokio::spawn(async move {
        tokio::select! {
            _ = reader_handle => { info!("Reader task completed."); },
            _ = writer_handle => { info!("Writer task completed."); },
        }
        info!("WebSocket connection tasks finished.");
    });

    Ok((combined_handle, tx))
}

/// Convenience wrapper to build a [`Handler`] from a closure.
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&Envelope) + Send + Sync + 'static,
{
    Arc::new(f)
}
