//! Per-owner registry of live duplex connections.
//!
//! An owner may hold any number of simultaneous connections (one per
//! device). Delivery is best-effort: a message sent while the owner has no
//! connections is dropped, and a connection whose send fails is removed on
//! the spot.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use taskcast_core::types::{ConnectionId, OwnerId, Timestamp};
use tokio::sync::{mpsc, RwLock};

/// A single connection could not take a message.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("connection closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Outbound half of a message-framed connection.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send_text(&self, text: &str) -> Result<(), DeliveryError>;
}

/// Sink that queues text frames on an unbounded channel.
///
/// The transport task owning the receiver forwards them to the socket;
/// once it drops the receiver every send fails with [`DeliveryError::Closed`].
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::UnboundedSender<String>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl MessageSink for ChannelSink {
    async fn send_text(&self, text: &str) -> Result<(), DeliveryError> {
        self.sender
            .send(text.to_owned())
            .map_err(|_| DeliveryError::Closed)
    }
}

struct ConnectionEntry {
    sink: Arc<dyn MessageSink>,
    connected_at: Timestamp,
}

/// Manages the live connections of every owner.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<OwnerId, HashMap<ConnectionId, ConnectionEntry>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handshake-complete connection under `owner_id`.
    ///
    /// Re-using a connection id replaces the previous sink.
    pub async fn connect(
        &self,
        owner_id: OwnerId,
        conn_id: ConnectionId,
        sink: Arc<dyn MessageSink>,
    ) {
        let mut conns = self.connections.write().await;
        let owned = conns.entry(owner_id).or_default();
        owned.insert(
            conn_id.clone(),
            ConnectionEntry {
                sink,
                connected_at: chrono::Utc::now(),
            },
        );
        tracing::info!(
            owner_id,
            conn_id = %conn_id,
            owner_connections = owned.len(),
            "Connection registered",
        );
    }

    /// Register a channel-backed connection with a fresh id.
    ///
    /// Returns the id and the receiver the transport should drain.
    pub async fn connect_channel(
        &self,
        owner_id: OwnerId,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn_id = uuid::Uuid::new_v4().to_string();
        self.connect(owner_id, conn_id.clone(), Arc::new(ChannelSink::new(tx)))
            .await;
        (conn_id, rx)
    }

    /// Remove a connection. Unknown ids are ignored.
    ///
    /// Returns whether a connection was actually removed.
    pub async fn disconnect(&self, owner_id: OwnerId, conn_id: &str) -> bool {
        let mut conns = self.connections.write().await;
        let Some(owned) = conns.get_mut(&owner_id) else {
            return false;
        };
        let removed = owned.remove(conn_id);
        if owned.is_empty() {
            conns.remove(&owner_id);
        }
        if let Some(entry) = &removed {
            let connected_secs = (chrono::Utc::now() - entry.connected_at).num_seconds();
            tracing::info!(owner_id, conn_id, connected_secs, "Connection removed");
        }
        removed.is_some()
    }

    /// Send `text` to every live connection of `owner_id`.
    ///
    /// Connections whose send fails are skipped and pruned from the
    /// registry. Returns the number of connections that took the message;
    /// zero when the owner is offline.
    pub async fn send_to_owner(&self, owner_id: OwnerId, text: &str) -> usize {
        // Snapshot the sinks so no lock is held across a send.
        let targets: Vec<(ConnectionId, Arc<dyn MessageSink>)> = {
            let conns = self.connections.read().await;
            match conns.get(&owner_id) {
                Some(owned) => owned
                    .iter()
                    .map(|(id, entry)| (id.clone(), Arc::clone(&entry.sink)))
                    .collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (conn_id, sink) in targets {
            match sink.send_text(text).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(owner_id, conn_id = %conn_id, error = %e, "Send failed, pruning connection");
                    dead.push(conn_id);
                }
            }
        }

        for conn_id in dead {
            self.disconnect(owner_id, &conn_id).await;
        }

        delivered
    }

    /// Number of live connections held by `owner_id`.
    pub async fn connection_count(&self, owner_id: OwnerId) -> usize {
        self.connections
            .read()
            .await
            .get(&owner_id)
            .map_or(0, HashMap::len)
    }

    /// Number of live connections across all owners.
    pub async fn total_connections(&self) -> usize {
        self.connections.read().await.values().map(HashMap::len).sum()
    }

    /// Drop every connection.
    ///
    /// Channel-backed sinks close their receivers, which ends the transport
    /// forwarding loops. Used during graceful shutdown.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count: usize = conns.values().map(HashMap::len).sum();
        conns.clear();
        tracing::info!(count, "Closed all connections");
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
