//! Market data hub: the normalized state store behind every consumer query.
//!
//! A single consume loop drains the fan-in channel fed by connection tasks,
//! so per-feed ordering is preserved end to end. State is sharded per
//! (venue, symbol) behind `DashMap`; consumers read snapshots or follow a
//! shard's broadcast channel for typed [`MarketEvent`]s. Candles are built
//! here from normalized trades, one open candle per tracked timeframe,
//! rolled lazily when a trade lands past the period boundary.

use crate::config::MarketDataConfig;
use crate::error::{AdapterError, ErrorKind, Result};
use crate::input::connection::ConnectionId;
use crate::input::pool::{ConnectionPool, PoolStats};
use crate::input::VenueAdapter;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use types::{Candle, FeedStatus, MarketEvent, Symbol, Timeframe, Trade, VenueEvent, VenueId};

/// Per-(venue, symbol) market state.
struct MarketShard {
    last_price: Option<Decimal>,
    last_update: Option<DateTime<Utc>>,
    /// Timeframes consumers asked for; one open candle is kept per entry
    timeframes: BTreeSet<Timeframe>,
    open_candles: BTreeMap<Timeframe, Candle>,
    closed: BTreeMap<Timeframe, VecDeque<Candle>>,
    trades: VecDeque<Trade>,
    sender: broadcast::Sender<MarketEvent>,
}

impl MarketShard {
    fn new(sender: broadcast::Sender<MarketEvent>) -> Self {
        Self {
            last_price: None,
            last_update: None,
            timeframes: BTreeSet::new(),
            open_candles: BTreeMap::new(),
            closed: BTreeMap::new(),
            trades: VecDeque::new(),
            sender,
        }
    }
}

/// Point-in-time copy of one shard, plus the venue's feed status.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    /// Venue the shard belongs to
    pub venue: VenueId,
    /// Symbol the shard tracks
    pub symbol: Symbol,
    /// Venue feed health at snapshot time
    pub status: FeedStatus,
    /// Price of the most recent trade, if any has arrived
    pub last_price: Option<Decimal>,
    /// Timestamp of the most recent trade
    pub last_update: Option<DateTime<Utc>>,
    /// In-progress candle per subscribed timeframe
    pub open_candles: BTreeMap<Timeframe, Candle>,
    /// Ring buffer contents, oldest first
    pub recent_trades: Vec<Trade>,
}

/// Hub-level counters for introspection endpoints and logs.
#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    /// Live (venue, symbol) shards
    pub shards: usize,
    /// Feed health per venue
    pub venue_status: BTreeMap<VenueId, FeedStatus>,
    /// Connection pool counters
    pub pool: PoolStats,
}

struct HubInner {
    config: MarketDataConfig,
    pool: Arc<ConnectionPool>,
    adapters: HashMap<VenueId, Arc<dyn VenueAdapter>>,
    shards: DashMap<(VenueId, Symbol), Arc<RwLock<MarketShard>>>,
    venue_status: DashMap<VenueId, FeedStatus>,
}

/// Owns the pool, the adapters and all normalized market state.
pub struct MarketDataHub {
    inner: Arc<HubInner>,
    event_rx: Mutex<Option<mpsc::Receiver<VenueEvent>>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl MarketDataHub {
    /// Build a hub over the given adapters. Nothing connects until the
    /// first [`subscribe`](Self::subscribe).
    pub fn new(config: MarketDataConfig, adapters: Vec<Arc<dyn VenueAdapter>>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.hub.event_buffer.max(1));
        let pool = Arc::new(ConnectionPool::new(config.pool.clone(), event_tx));
        let adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.venue(), adapter))
            .collect();
        Self {
            inner: Arc::new(HubInner {
                config,
                pool,
                adapters,
                shards: DashMap::new(),
                venue_status: DashMap::new(),
            }),
            event_rx: Mutex::new(Some(event_rx)),
            consumer: Mutex::new(None),
        }
    }

    /// Start the consume loop. Idempotent; later calls are no-ops.
    pub fn start(&self) {
        let Some(mut event_rx) = self.event_rx.lock().take() else {
            return;
        };
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                inner.handle_event(event);
            }
            debug!("hub consume loop ended");
        });
        *self.consumer.lock() = Some(task);
    }

    /// Subscribe to a venue's trades for one symbol, tracking candles at
    /// `timeframe`. Connects the venue on first use, then registers the
    /// symbol; repeated calls with new timeframes widen the same shard.
    /// The returned receiver observes this shard's typed events.
    pub async fn subscribe(
        &self,
        venue: VenueId,
        symbol: Symbol,
        timeframe: Timeframe,
    ) -> Result<broadcast::Receiver<MarketEvent>> {
        let adapter = self.inner.adapters.get(&venue).cloned().ok_or_else(|| {
            AdapterError::Configuration(format!("no adapter registered for venue {venue}"))
        })?;

        let policy = self.inner.config.policy_for(venue);
        let id = self.inner.pool.connect(adapter.clone(), policy)?;
        self.inner.pool.subscribe(&id, symbol.clone()).await?;

        let key = (venue, symbol.clone());
        let (receiver, timeframe_added) = {
            let shard_arc = self
                .inner
                .shards
                .entry(key)
                .or_insert_with(|| {
                    let (sender, _) =
                        broadcast::channel(self.inner.config.hub.broadcast_buffer.max(1));
                    Arc::new(RwLock::new(MarketShard::new(sender)))
                })
                .clone();
            let mut shard = shard_arc.write();
            let added = shard.timeframes.insert(timeframe);
            (shard.sender.subscribe(), added)
        };

        if timeframe_added
            && self.inner.config.hub.backfill_candles > 0
            && adapter.capabilities().supports_candle_history
        {
            self.spawn_backfill(adapter, venue, symbol, timeframe);
        }

        Ok(receiver)
    }

    fn spawn_backfill(
        &self,
        adapter: Arc<dyn VenueAdapter>,
        venue: VenueId,
        symbol: Symbol,
        timeframe: Timeframe,
    ) {
        let inner = Arc::clone(&self.inner);
        let limit = inner.config.hub.backfill_candles;
        tokio::spawn(async move {
            match adapter.fetch_candles(&symbol, timeframe, limit).await {
                Ok(candles) => {
                    let count = candles.len();
                    let Some(shard_arc) = inner
                        .shards
                        .get(&(venue, symbol.clone()))
                        .map(|entry| entry.clone())
                    else {
                        // Unsubscribed while the fetch was in flight.
                        return;
                    };
                    let mut shard = shard_arc.write();
                    let history = shard.closed.entry(timeframe).or_default();
                    // Live candles may have closed already; never clobber them.
                    if history.is_empty() {
                        let cap = inner.config.hub.candle_history_capacity.max(1);
                        for candle in candles {
                            if history.len() >= cap {
                                history.pop_front();
                            }
                            history.push_back(candle);
                        }
                        debug!(%venue, %symbol, timeframe = timeframe.as_str(), count, "candle history backfilled");
                    }
                }
                Err(e) if e.kind() == ErrorKind::Unsupported => {
                    debug!(%venue, %symbol, timeframe = timeframe.as_str(), "backfill not supported, building candles live only");
                }
                Err(e) => {
                    warn!(%venue, %symbol, timeframe = timeframe.as_str(), error = %e, "candle backfill failed");
                }
            }
        });
    }

    /// Drop a (venue, symbol) shard. Closes the venue connection once its
    /// last symbol is gone.
    pub async fn unsubscribe(&self, venue: VenueId, symbol: Symbol) -> Result<()> {
        if self.inner.shards.remove(&(venue, symbol.clone())).is_none() {
            return Ok(());
        }
        let id = ConnectionId::market_data(venue);
        self.inner.pool.unsubscribe(&id, symbol).await?;

        let venue_in_use = self.inner.shards.iter().any(|entry| entry.key().0 == venue);
        if !venue_in_use {
            info!(%venue, "last symbol unsubscribed, closing venue connection");
            self.inner.pool.disconnect(&id).await?;
        }
        Ok(())
    }

    /// Latest state for a (venue, symbol), if subscribed.
    pub fn latest(&self, venue: VenueId, symbol: &Symbol) -> Option<MarketSnapshot> {
        let shard_arc = self
            .inner
            .shards
            .get(&(venue, symbol.clone()))
            .map(|entry| entry.clone())?;
        let shard = shard_arc.read();
        Some(MarketSnapshot {
            venue,
            symbol: symbol.clone(),
            status: self.status_of(venue),
            last_price: shard.last_price,
            last_update: shard.last_update,
            open_candles: shard.open_candles.clone(),
            recent_trades: shard.trades.iter().cloned().collect(),
        })
    }

    /// Closed candles for a (venue, symbol, timeframe), oldest first.
    pub fn candle_history(
        &self,
        venue: VenueId,
        symbol: &Symbol,
        timeframe: Timeframe,
    ) -> Vec<Candle> {
        let Some(shard_arc) = self
            .inner
            .shards
            .get(&(venue, symbol.clone()))
            .map(|entry| entry.clone())
        else {
            return Vec::new();
        };
        let shard = shard_arc.read();
        shard
            .closed
            .get(&timeframe)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Feed status for one venue. Venues that never connected are Down.
    pub fn status_of(&self, venue: VenueId) -> FeedStatus {
        self.inner
            .venue_status
            .get(&venue)
            .map(|entry| *entry.value())
            .unwrap_or(FeedStatus::Down)
    }

    /// Status of every venue the hub has heard from.
    pub fn venue_status(&self) -> BTreeMap<VenueId, FeedStatus> {
        self.inner
            .venue_status
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }

    /// Counters for status logs and introspection endpoints.
    pub fn stats(&self) -> HubStats {
        HubStats {
            shards: self.inner.shards.len(),
            venue_status: self.venue_status(),
            pool: self.inner.pool.stats(),
        }
    }

    /// Sender feeding the consume loop. Connection tasks hold clones; tests
    /// and out-of-process feeds can inject normalized events here.
    pub fn event_sender(&self) -> mpsc::Sender<VenueEvent> {
        self.inner.pool.event_sender()
    }

    /// Underlying connection pool, for direct send/disconnect control.
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.inner.pool
    }

    /// Stop the consume loop and close every connection.
    pub async fn shutdown(&self) {
        if let Some(task) = self.consumer.lock().take() {
            task.abort();
        }
        self.inner.pool.shutdown().await;
        info!("market data hub stopped");
    }
}

impl HubInner {
    fn handle_event(&self, event: VenueEvent) {
        match event {
            VenueEvent::Trade {
                venue,
                symbol,
                trade,
            } => self.apply_trade(venue, symbol, trade),
            VenueEvent::Connected { venue } => {
                info!(%venue, "feed live");
                self.set_status(venue, FeedStatus::Live);
            }
            VenueEvent::Disconnected { venue, reason } => {
                warn!(%venue, %reason, "feed disconnected, marking stale");
                self.set_status(venue, FeedStatus::Stale);
            }
            VenueEvent::Failed { venue, reason } => {
                error!(%venue, %reason, "feed failed, marking down");
                self.set_status(venue, FeedStatus::Down);
            }
        }
    }

    fn set_status(&self, venue: VenueId, status: FeedStatus) {
        let previous = self.venue_status.insert(venue, status);
        if previous == Some(status) {
            return;
        }
        for entry in self.shards.iter() {
            if entry.key().0 != venue {
                continue;
            }
            let shard = entry.value().read();
            let _ = shard.sender.send(MarketEvent::Status { venue, status });
        }
    }

    fn apply_trade(&self, venue: VenueId, symbol: Symbol, trade: Trade) {
        let Some(shard_arc) = self
            .shards
            .get(&(venue, symbol.clone()))
            .map(|entry| entry.clone())
        else {
            // Trades for symbols nobody subscribed are dropped.
            return;
        };
        let mut shard = shard_arc.write();
        shard.last_price = Some(trade.price);
        shard.last_update = Some(trade.timestamp);

        if shard.trades.len() >= self.config.hub.trade_buffer_capacity.max(1) {
            shard.trades.pop_front();
        }
        shard.trades.push_back(trade.clone());

        let timeframes: Vec<Timeframe> = shard.timeframes.iter().copied().collect();
        for timeframe in timeframes {
            self.roll_candle(&mut shard, venue, &symbol, timeframe, &trade);
        }

        let _ = shard.sender.send(MarketEvent::Trade {
            venue,
            symbol,
            trade,
        });
    }

    /// Fold a trade into the open candle for `timeframe`, closing and
    /// emitting it first when the trade lands past the period boundary.
    fn roll_candle(
        &self,
        shard: &mut MarketShard,
        venue: VenueId,
        symbol: &Symbol,
        timeframe: Timeframe,
        trade: &Trade,
    ) {
        match shard.open_candles.get_mut(&timeframe) {
            None => {
                let open_time = timeframe.align(trade.timestamp);
                shard
                    .open_candles
                    .insert(timeframe, Candle::open_at(open_time, trade.price));
            }
            Some(candle) if candle.period_elapsed(timeframe, trade.timestamp) => {
                let closed = candle.clone();
                *candle = Candle::open_at(timeframe.align(trade.timestamp), trade.price);
                let history = shard.closed.entry(timeframe).or_default();
                if history.len() >= self.config.hub.candle_history_capacity.max(1) {
                    history.pop_front();
                }
                history.push_back(closed.clone());
                let _ = shard.sender.send(MarketEvent::Candle {
                    venue,
                    symbol: symbol.clone(),
                    timeframe,
                    candle: closed,
                });
            }
            Some(candle) => {
                candle.apply_price(trade.price);
            }
        }
    }
}
