//! Venue-agnostic connection lifecycle.
//!
//! One spawned task per connection owns the socket, the subscription set and
//! the outbound queue. Streaming venues get a reconnect loop with exponential
//! backoff and heartbeat supervision; REST-polling venues get a fetch loop
//! with the same retry accounting. State changes surface twice: cheaply via
//! [`ConnectionShared`] for pool introspection, and as [`VenueEvent`]s on the
//! fan-in channel for the hub.

use crate::error::{AdapterError, Result};
use crate::input::{HeartbeatSpec, ParsedMessage, VenueAdapter};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use types::{Symbol, VenueEvent, VenueId};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Dialing or between reconnect attempts
    Connecting,
    /// Socket open, subscriptions re-established
    Connected,
    /// Dropped; a reconnect is scheduled
    Disconnected,
    /// Terminal: reconnect budget exhausted, task has exited
    Error,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Pool key for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId {
    /// Venue this connection serves
    pub venue: VenueId,
    /// Purpose of the connection within the venue
    pub key: String,
}

impl ConnectionId {
    /// The market data stream connection for a venue.
    pub fn market_data(venue: VenueId) -> Self {
        Self {
            venue,
            key: "market_data".to_string(),
        }
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.venue, self.key)
    }
}

/// Effective per-connection tuning, resolved from config by
/// [`MarketDataConfig::policy_for`](crate::config::MarketDataConfig::policy_for).
#[derive(Debug, Clone)]
pub struct ConnectionPolicy {
    /// Budget for the TCP+WebSocket handshake
    pub connect_timeout: Duration,
    /// Client ping cadence; twice this with no inbound traffic is stale
    pub heartbeat_interval: Duration,
    /// First reconnect delay
    pub base_backoff: Duration,
    /// Reconnect delay ceiling
    pub max_backoff: Duration,
    /// Consecutive failures tolerated before the feed goes terminally down
    pub max_reconnect_attempts: u32,
    /// Payloads queued while disconnected; oldest dropped beyond this
    pub outbound_queue_cap: usize,
    /// Depth of the pool-to-task command channel
    pub command_buffer: usize,
    /// Fetch cadence for REST-polled venues
    pub poll_interval: Duration,
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            max_reconnect_attempts: 5,
            outbound_queue_cap: 64,
            command_buffer: 256,
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Delay before reconnect attempt `attempts` (1-based): base doubled per
/// failure, capped. Exponent is clamped so the shift cannot overflow.
pub(crate) fn backoff_delay(policy: &ConnectionPolicy, attempts: u32) -> Duration {
    let exponent = attempts.saturating_sub(1).min(6);
    policy
        .base_backoff
        .saturating_mul(2u32.saturating_pow(exponent))
        .min(policy.max_backoff)
}

/// Commands the pool sends into a connection task.
#[derive(Debug)]
pub(crate) enum ConnectionCommand {
    Send { payload: String },
    Subscribe { symbol: Symbol },
    Unsubscribe { symbol: Symbol },
    Close,
}

/// State a connection task shares with the pool.
#[derive(Debug)]
pub(crate) struct ConnectionShared {
    state: RwLock<ConnectionState>,
    reconnect_attempts: AtomicU32,
    messages_in: AtomicU64,
}

impl ConnectionShared {
    fn new() -> Self {
        Self {
            state: RwLock::new(ConnectionState::Connecting),
            reconnect_attempts: AtomicU32::new(0),
            messages_in: AtomicU64::new(0),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn set_state(&self, next: ConnectionState) {
        *self.state.write() = next;
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    fn set_attempts(&self, n: u32) {
        self.reconnect_attempts.store(n, Ordering::Relaxed);
    }

    fn bump_attempts(&self) -> u32 {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn record_message(&self) {
        self.messages_in.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn messages_in(&self) -> u64 {
        self.messages_in.load(Ordering::Relaxed)
    }
}

/// Owning handle to a spawned connection task.
pub struct ConnectionHandle {
    id: ConnectionId,
    command_tx: mpsc::Sender<ConnectionCommand>,
    shared: Arc<ConnectionShared>,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    /// Spawn the task driving `adapter`. Streaming venues run the socket
    /// loop, others the polling loop.
    pub(crate) fn spawn(
        adapter: Arc<dyn VenueAdapter>,
        policy: ConnectionPolicy,
        event_tx: mpsc::Sender<VenueEvent>,
    ) -> Self {
        let id = ConnectionId::market_data(adapter.venue());
        let (command_tx, command_rx) = mpsc::channel(policy.command_buffer.max(1));
        let shared = Arc::new(ConnectionShared::new());
        let streaming = adapter.capabilities().supports_streaming;
        let task = {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                if streaming {
                    run_stream(adapter, policy, command_rx, event_tx, shared).await;
                } else {
                    run_poll(adapter, policy, command_rx, event_tx, shared).await;
                }
            })
        };
        Self {
            id,
            command_tx,
            shared,
            task,
        }
    }

    /// Identity of the connection this handle owns.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Venue the connection serves.
    pub fn venue(&self) -> VenueId {
        self.id.venue
    }

    /// Current lifecycle state, read from task-shared storage.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub(crate) fn command_tx(&self) -> mpsc::Sender<ConnectionCommand> {
        self.command_tx.clone()
    }

    pub(crate) fn shared(&self) -> &ConnectionShared {
        &self.shared
    }

    /// Whether the connection task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub(crate) fn abort(&self) {
        self.task.abort();
    }
}

enum SessionEnd {
    /// Task must exit without reconnecting
    Shutdown,
    /// Session over; retry accounting applies
    Closed { reason: String, was_connected: bool },
}

async fn run_stream(
    adapter: Arc<dyn VenueAdapter>,
    policy: ConnectionPolicy,
    mut command_rx: mpsc::Receiver<ConnectionCommand>,
    event_tx: mpsc::Sender<VenueEvent>,
    shared: Arc<ConnectionShared>,
) {
    let venue = adapter.venue();
    let mut subscriptions: Vec<Symbol> = Vec::new();
    let mut outbound: VecDeque<String> = VecDeque::new();

    loop {
        shared.set_state(ConnectionState::Connecting);
        let end = run_session(
            adapter.as_ref(),
            &policy,
            &mut command_rx,
            &event_tx,
            &shared,
            &mut subscriptions,
            &mut outbound,
        )
        .await;

        let (reason, was_connected) = match end {
            SessionEnd::Shutdown => {
                shared.set_state(ConnectionState::Disconnected);
                debug!(%venue, "connection task stopped");
                return;
            }
            SessionEnd::Closed {
                reason,
                was_connected,
            } => (reason, was_connected),
        };

        shared.set_state(ConnectionState::Disconnected);
        if was_connected {
            warn!(%venue, %reason, "stream disconnected");
            let _ = event_tx
                .send(VenueEvent::Disconnected {
                    venue,
                    reason: reason.clone(),
                })
                .await;
        } else {
            warn!(%venue, %reason, "connect attempt failed");
        }

        let attempts = shared.bump_attempts();
        if attempts >= policy.max_reconnect_attempts {
            shared.set_state(ConnectionState::Error);
            error!(%venue, attempts, "reconnect budget exhausted, feed failed");
            let _ = event_tx.send(VenueEvent::Failed { venue, reason }).await;
            return;
        }

        let delay = backoff_delay(&policy, attempts);
        info!(%venue, attempt = attempts, delay_ms = delay.as_millis() as u64, "reconnecting");
        if wait_backoff(
            delay,
            &policy,
            venue,
            &mut command_rx,
            &mut subscriptions,
            &mut outbound,
        )
        .await
        {
            debug!(%venue, "connection task stopped during backoff");
            return;
        }
    }
}

/// One socket session: open, restore subscriptions, flush the queue, then
/// drive until the stream dies. The Connected event only fires after the
/// restore steps, so consumers never observe a live-but-unsubscribed feed.
async fn run_session(
    adapter: &dyn VenueAdapter,
    policy: &ConnectionPolicy,
    command_rx: &mut mpsc::Receiver<ConnectionCommand>,
    event_tx: &mpsc::Sender<VenueEvent>,
    shared: &ConnectionShared,
    subscriptions: &mut Vec<Symbol>,
    outbound: &mut VecDeque<String>,
) -> SessionEnd {
    let venue = adapter.venue();
    let mut socket = match open_socket(adapter, policy).await {
        Ok(socket) => socket,
        Err(e) => {
            return SessionEnd::Closed {
                reason: e.to_string(),
                was_connected: false,
            }
        }
    };

    if !subscriptions.is_empty() {
        let payloads = match adapter.subscribe_payload(subscriptions) {
            Ok(payloads) => payloads,
            Err(e) => {
                return SessionEnd::Closed {
                    reason: format!("re-subscribe failed: {e}"),
                    was_connected: false,
                }
            }
        };
        for payload in payloads {
            if let Err(e) = socket.send(Message::Text(payload)).await {
                return SessionEnd::Closed {
                    reason: format!("re-subscribe send failed: {e}"),
                    was_connected: false,
                };
            }
        }
        debug!(%venue, count = subscriptions.len(), "subscriptions restored");
    }

    while let Some(payload) = outbound.pop_front() {
        if let Err(e) = socket.send(Message::Text(payload)).await {
            return SessionEnd::Closed {
                reason: format!("queued send failed: {e}"),
                was_connected: false,
            };
        }
    }

    shared.set_attempts(0);
    shared.set_state(ConnectionState::Connected);
    info!(%venue, "stream connected");
    let _ = event_tx.send(VenueEvent::Connected { venue }).await;

    drive_socket(
        adapter,
        policy,
        socket,
        command_rx,
        event_tx,
        shared,
        subscriptions,
    )
    .await
}

async fn open_socket(adapter: &dyn VenueAdapter, policy: &ConnectionPolicy) -> Result<WsStream> {
    let venue = adapter.venue();
    let endpoint = adapter.stream_endpoint().await?;
    match timeout(policy.connect_timeout, connect_async(endpoint.as_str())).await {
        Ok(Ok((socket, _response))) => Ok(socket),
        Ok(Err(e)) => Err(AdapterError::ConnectionFailed {
            venue,
            reason: e.to_string(),
        }),
        Err(_) => Err(AdapterError::ConnectTimeout {
            venue,
            timeout_ms: policy.connect_timeout.as_millis() as u64,
        }),
    }
}

async fn drive_socket(
    adapter: &dyn VenueAdapter,
    policy: &ConnectionPolicy,
    socket: WsStream,
    command_rx: &mut mpsc::Receiver<ConnectionCommand>,
    event_tx: &mpsc::Sender<VenueEvent>,
    shared: &ConnectionShared,
    subscriptions: &mut Vec<Symbol>,
) -> SessionEnd {
    let venue = adapter.venue();
    let heartbeat = adapter.heartbeat();
    let (mut sink, mut stream) = socket.split();
    let mut last_inbound = Instant::now();
    let mut ticker = tokio::time::interval_at(
        Instant::now() + policy.heartbeat_interval,
        policy.heartbeat_interval,
    );

    fn closed(reason: String) -> SessionEnd {
        SessionEnd::Closed {
            reason,
            was_connected: true,
        }
    }

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        last_inbound = Instant::now();
                        shared.record_message();
                        match adapter.parse_message(&text) {
                            Ok(ParsedMessage::Trades { symbol, trades }) => {
                                for trade in trades {
                                    let event = VenueEvent::Trade {
                                        venue,
                                        symbol: symbol.clone(),
                                        trade,
                                    };
                                    if event_tx.send(event).await.is_err() {
                                        return SessionEnd::Shutdown;
                                    }
                                }
                            }
                            Ok(ParsedMessage::Ping { reply }) => {
                                if let Err(e) = sink.send(Message::Text(reply)).await {
                                    return closed(format!("ping reply failed: {e}"));
                                }
                            }
                            Ok(ParsedMessage::Heartbeat) => {}
                            Ok(ParsedMessage::Ack { detail }) => {
                                debug!(%venue, detail, "venue ack");
                            }
                            Ok(ParsedMessage::VenueError { message }) => {
                                warn!(%venue, message, "venue reported error");
                            }
                            Ok(ParsedMessage::Ignored) => {}
                            Err(e) => {
                                // One bad frame never takes the feed down.
                                warn!(%venue, error = %e, "dropped unparseable message");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        last_inbound = Instant::now();
                        if let Err(e) = sink.send(Message::Pong(payload)).await {
                            return closed(format!("pong failed: {e}"));
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_inbound = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) => {
                        return closed("venue closed the stream".to_string());
                    }
                    Some(Ok(_)) => {
                        last_inbound = Instant::now();
                    }
                    Some(Err(e)) => {
                        return closed(format!("stream error: {e}"));
                    }
                    None => {
                        return closed("stream ended".to_string());
                    }
                }
            }
            _ = ticker.tick() => {
                let silent = last_inbound.elapsed();
                if silent >= policy.heartbeat_interval * 2 {
                    return closed(format!("no traffic for {}ms, closing stale stream", silent.as_millis()));
                }
                if let HeartbeatSpec::ClientPing { payload } = &heartbeat {
                    if let Err(e) = sink.send(Message::Text(payload.clone())).await {
                        return closed(format!("heartbeat send failed: {e}"));
                    }
                }
            }
            command = command_rx.recv() => {
                match command {
                    Some(ConnectionCommand::Send { payload }) => {
                        if let Err(e) = sink.send(Message::Text(payload)).await {
                            return closed(format!("send failed: {e}"));
                        }
                    }
                    Some(ConnectionCommand::Subscribe { symbol }) => {
                        if !subscriptions.contains(&symbol) {
                            subscriptions.push(symbol.clone());
                        }
                        match adapter.subscribe_payload(std::slice::from_ref(&symbol)) {
                            Ok(payloads) => {
                                for payload in payloads {
                                    if let Err(e) = sink.send(Message::Text(payload)).await {
                                        return closed(format!("subscribe send failed: {e}"));
                                    }
                                }
                            }
                            Err(e) => warn!(%venue, %symbol, error = %e, "subscribe payload failed"),
                        }
                    }
                    Some(ConnectionCommand::Unsubscribe { symbol }) => {
                        subscriptions.retain(|s| s != &symbol);
                        match adapter.unsubscribe_payload(std::slice::from_ref(&symbol)) {
                            Ok(payloads) => {
                                for payload in payloads {
                                    if let Err(e) = sink.send(Message::Text(payload)).await {
                                        return closed(format!("unsubscribe send failed: {e}"));
                                    }
                                }
                            }
                            Err(e) => warn!(%venue, %symbol, error = %e, "unsubscribe payload failed"),
                        }
                    }
                    Some(ConnectionCommand::Close) | None => {
                        let _ = sink.send(Message::Close(None)).await;
                        return SessionEnd::Shutdown;
                    }
                }
            }
        }
    }
}

/// Sleep out a backoff delay while still accepting commands. Sends are
/// queued with the oldest dropped at capacity; subscription changes are
/// recorded for replay on reconnect. Returns true when the task must exit.
async fn wait_backoff(
    delay: Duration,
    policy: &ConnectionPolicy,
    venue: VenueId,
    command_rx: &mut mpsc::Receiver<ConnectionCommand>,
    subscriptions: &mut Vec<Symbol>,
    outbound: &mut VecDeque<String>,
) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => return false,
            command = command_rx.recv() => {
                match command {
                    Some(ConnectionCommand::Send { payload }) => {
                        push_bounded(outbound, payload, policy.outbound_queue_cap, venue);
                    }
                    Some(ConnectionCommand::Subscribe { symbol }) => {
                        if !subscriptions.contains(&symbol) {
                            subscriptions.push(symbol);
                        }
                    }
                    Some(ConnectionCommand::Unsubscribe { symbol }) => {
                        subscriptions.retain(|s| s != &symbol);
                    }
                    Some(ConnectionCommand::Close) | None => return true,
                }
            }
        }
    }
}

fn push_bounded(queue: &mut VecDeque<String>, payload: String, cap: usize, venue: VenueId) {
    if queue.len() >= cap.max(1) {
        queue.pop_front();
        warn!(%venue, cap, "outbound queue full, dropped oldest message");
    }
    queue.push_back(payload);
}

/// Fetch loop for venues without a stream. Trades are deduplicated against a
/// per-symbol timestamp watermark so overlapping poll windows emit each trade
/// once. A round counts as failed only when every symbol's fetch failed.
async fn run_poll(
    adapter: Arc<dyn VenueAdapter>,
    policy: ConnectionPolicy,
    mut command_rx: mpsc::Receiver<ConnectionCommand>,
    event_tx: mpsc::Sender<VenueEvent>,
    shared: Arc<ConnectionShared>,
) {
    let venue = adapter.venue();
    let mut subscriptions: Vec<Symbol> = Vec::new();
    let mut outbound: VecDeque<String> = VecDeque::new();
    let mut watermarks: HashMap<Symbol, DateTime<Utc>> = HashMap::new();
    let mut live = false;
    let mut ticker = tokio::time::interval(policy.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    shared.set_state(ConnectionState::Connecting);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if subscriptions.is_empty() {
                    continue;
                }
                let mut fetched_any = false;
                let mut failed_any = false;
                for symbol in &subscriptions {
                    match adapter.fetch_recent_trades(symbol).await {
                        Ok(trades) => {
                            fetched_any = true;
                            shared.record_message();
                            let watermark = watermarks
                                .entry(symbol.clone())
                                .or_insert(DateTime::<Utc>::MIN_UTC);
                            for trade in trades {
                                if trade.timestamp <= *watermark {
                                    continue;
                                }
                                *watermark = trade.timestamp;
                                let event = VenueEvent::Trade {
                                    venue,
                                    symbol: symbol.clone(),
                                    trade,
                                };
                                if event_tx.send(event).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            failed_any = true;
                            warn!(%venue, %symbol, error = %e, "poll failed");
                        }
                    }
                }

                if failed_any && !fetched_any {
                    live = false;
                    shared.set_state(ConnectionState::Disconnected);
                    let _ = event_tx
                        .send(VenueEvent::Disconnected {
                            venue,
                            reason: "poll round failed".to_string(),
                        })
                        .await;
                    let attempts = shared.bump_attempts();
                    if attempts >= policy.max_reconnect_attempts {
                        shared.set_state(ConnectionState::Error);
                        error!(%venue, attempts, "poll retry budget exhausted, feed failed");
                        let _ = event_tx
                            .send(VenueEvent::Failed {
                                venue,
                                reason: "poll retry budget exhausted".to_string(),
                            })
                            .await;
                        return;
                    }
                    let delay = backoff_delay(&policy, attempts);
                    info!(%venue, attempt = attempts, delay_ms = delay.as_millis() as u64, "poll retrying");
                    if wait_backoff(
                        delay,
                        &policy,
                        venue,
                        &mut command_rx,
                        &mut subscriptions,
                        &mut outbound,
                    )
                    .await
                    {
                        shared.set_state(ConnectionState::Disconnected);
                        return;
                    }
                } else if fetched_any && !live {
                    live = true;
                    shared.set_attempts(0);
                    shared.set_state(ConnectionState::Connected);
                    info!(%venue, "poll feed live");
                    let _ = event_tx.send(VenueEvent::Connected { venue }).await;
                }
            }
            command = command_rx.recv() => {
                match command {
                    Some(ConnectionCommand::Subscribe { symbol }) => {
                        if !subscriptions.contains(&symbol) {
                            subscriptions.push(symbol);
                        }
                    }
                    Some(ConnectionCommand::Unsubscribe { symbol }) => {
                        subscriptions.retain(|s| s != &symbol);
                        watermarks.remove(&symbol);
                    }
                    Some(ConnectionCommand::Send { .. }) => {
                        debug!(%venue, "send ignored on polling venue");
                    }
                    Some(ConnectionCommand::Close) | None => {
                        shared.set_state(ConnectionState::Disconnected);
                        return;
                    }
                }
            }
        }
    }
}
