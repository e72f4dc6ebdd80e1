//! Connection pool: owns every connection task, enforces the connection
//! cap, and routes commands to tasks by id.

use crate::config::PoolConfig;
use crate::error::{AdapterError, Result};
use crate::input::connection::{
    ConnectionCommand, ConnectionHandle, ConnectionId, ConnectionPolicy, ConnectionState,
};
use crate::input::VenueAdapter;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use types::{Symbol, VenueEvent, VenueId};

/// Snapshot of one connection for introspection.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStats {
    /// Connection identity
    pub id: ConnectionId,
    /// Venue this connection serves
    pub venue: VenueId,
    /// Lifecycle state at snapshot time
    pub state: ConnectionState,
    /// Reconnects since the last healthy session
    pub reconnect_attempts: u32,
    /// Frames received over the connection's lifetime
    pub messages_in: u64,
}

/// Snapshot of the whole pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    /// Connection cap from [`PoolConfig`]
    pub max_connections: usize,
    /// Connections currently registered
    pub active: usize,
    /// Per-connection detail
    pub connections: Vec<ConnectionStats>,
}

/// Bounded registry of connection tasks. All venue events fan into the
/// single channel handed to `new`; per-task command channels fan out.
pub struct ConnectionPool {
    config: PoolConfig,
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    event_tx: mpsc::Sender<VenueEvent>,
}

impl ConnectionPool {
    /// Create an empty pool. `event_tx` receives every venue event from
    /// every connection the pool ever spawns.
    pub fn new(config: PoolConfig, event_tx: mpsc::Sender<VenueEvent>) -> Self {
        Self {
            config,
            connections: RwLock::new(HashMap::new()),
            event_tx,
        }
    }

    /// Ensure a market data connection for `adapter`'s venue exists,
    /// spawning one when needed. Terminally failed connections are replaced
    /// so a venue can come back after exhausting its reconnect budget.
    pub fn connect(
        &self,
        adapter: Arc<dyn VenueAdapter>,
        policy: ConnectionPolicy,
    ) -> Result<ConnectionId> {
        let id = ConnectionId::market_data(adapter.venue());
        let mut connections = self.connections.write();

        if let Some(existing) = connections.get(&id) {
            if existing.state() != ConnectionState::Error && !existing.is_finished() {
                return Ok(id);
            }
            if let Some(old) = connections.remove(&id) {
                old.abort();
            }
            debug!(%id, "replacing terminally failed connection");
        }

        if connections.len() >= self.config.max_connections {
            return Err(AdapterError::PoolExhausted {
                active: connections.len(),
                max: self.config.max_connections,
            });
        }

        let handle = ConnectionHandle::spawn(adapter, policy, self.event_tx.clone());
        info!(%id, "connection spawned");
        connections.insert(id.clone(), handle);
        Ok(id)
    }

    fn command_tx(&self, id: &ConnectionId) -> Result<mpsc::Sender<ConnectionCommand>> {
        self.connections
            .read()
            .get(id)
            .map(ConnectionHandle::command_tx)
            .ok_or_else(|| AdapterError::UnknownConnection { id: id.to_string() })
    }

    /// Queue a raw payload for a connection. Delivered immediately when
    /// connected, buffered (oldest dropped at capacity) otherwise.
    pub async fn send(&self, id: &ConnectionId, payload: String) -> Result<()> {
        let tx = self.command_tx(id)?;
        tx.send(ConnectionCommand::Send { payload })
            .await
            .map_err(|_| AdapterError::ChannelClosed("connection command"))
    }

    /// Add a symbol to a connection's subscription set.
    pub async fn subscribe(&self, id: &ConnectionId, symbol: Symbol) -> Result<()> {
        let tx = self.command_tx(id)?;
        tx.send(ConnectionCommand::Subscribe { symbol })
            .await
            .map_err(|_| AdapterError::ChannelClosed("connection command"))
    }

    /// Remove a symbol from a connection's subscription set.
    pub async fn unsubscribe(&self, id: &ConnectionId, symbol: Symbol) -> Result<()> {
        let tx = self.command_tx(id)?;
        tx.send(ConnectionCommand::Unsubscribe { symbol })
            .await
            .map_err(|_| AdapterError::ChannelClosed("connection command"))
    }

    /// Close a connection and forget it. The task drains its Close command
    /// and exits on its own.
    pub async fn disconnect(&self, id: &ConnectionId) -> Result<()> {
        let handle = self
            .connections
            .write()
            .remove(id)
            .ok_or_else(|| AdapterError::UnknownConnection { id: id.to_string() })?;
        let _ = handle.command_tx().send(ConnectionCommand::Close).await;
        info!(%id, "connection closed");
        Ok(())
    }

    /// Current state of a connection, if the pool knows it.
    pub fn state(&self, id: &ConnectionId) -> Option<ConnectionState> {
        self.connections.read().get(id).map(ConnectionHandle::state)
    }

    /// Sender feeding the fan-in event channel. Connection tasks hold
    /// clones; out-of-process feeds can inject normalized events here.
    pub fn event_sender(&self) -> mpsc::Sender<VenueEvent> {
        self.event_tx.clone()
    }

    /// Point-in-time counters across every registered connection.
    pub fn stats(&self) -> PoolStats {
        let connections = self.connections.read();
        let mut entries: Vec<ConnectionStats> = connections
            .values()
            .map(|handle| ConnectionStats {
                id: handle.id().clone(),
                venue: handle.venue(),
                state: handle.state(),
                reconnect_attempts: handle.shared().attempts(),
                messages_in: handle.shared().messages_in(),
            })
            .collect();
        entries.sort_by_key(|entry| entry.venue);
        PoolStats {
            max_connections: self.config.max_connections,
            active: entries.len(),
            connections: entries,
        }
    }

    /// Close everything. Tasks still mid-connect are aborted.
    pub async fn shutdown(&self) {
        let handles: Vec<ConnectionHandle> = {
            let mut connections = self.connections.write();
            connections.drain().map(|(_, handle)| handle).collect()
        };
        let count = handles.len();
        for handle in handles {
            let _ = handle.command_tx().send(ConnectionCommand::Close).await;
            handle.abort();
        }
        info!(count, "connection pool shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockAdapter;

    fn pool_with_max(max_connections: usize) -> ConnectionPool {
        let (event_tx, _event_rx) = mpsc::channel(64);
        let config = PoolConfig {
            max_connections,
            ..PoolConfig::default()
        };
        ConnectionPool::new(config, event_tx)
    }

    #[tokio::test]
    async fn test_connect_is_idempotent_per_venue() {
        let pool = pool_with_max(4);
        let adapter = Arc::new(MockAdapter::polling(VenueId::Gemini));

        let first = pool
            .connect(adapter.clone(), ConnectionPolicy::default())
            .unwrap();
        let second = pool.connect(adapter, ConnectionPolicy::default()).unwrap();

        assert_eq!(first, second);
        assert_eq!(pool.stats().active, 1);
    }

    #[tokio::test]
    async fn test_pool_rejects_when_full() {
        let pool = pool_with_max(1);
        pool.connect(
            Arc::new(MockAdapter::polling(VenueId::Gemini)),
            ConnectionPolicy::default(),
        )
        .unwrap();

        let err = pool
            .connect(
                Arc::new(MockAdapter::polling(VenueId::Kraken)),
                ConnectionPolicy::default(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            AdapterError::PoolExhausted { active: 1, max: 1 }
        ));
    }

    #[tokio::test]
    async fn test_unknown_connection_id() {
        let pool = pool_with_max(2);
        let id = ConnectionId::market_data(VenueId::Binance);
        let err = pool.send(&id, "x".to_string()).await.unwrap_err();
        assert!(matches!(err, AdapterError::UnknownConnection { .. }));
    }

    #[tokio::test]
    async fn test_disconnect_forgets_connection() {
        let pool = pool_with_max(2);
        let id = pool
            .connect(
                Arc::new(MockAdapter::polling(VenueId::Gemini)),
                ConnectionPolicy::default(),
            )
            .unwrap();

        pool.disconnect(&id).await.unwrap();
        assert!(pool.state(&id).is_none());
        assert!(pool.disconnect(&id).await.is_err());
    }
}
