//! Connection registry
//!
//! Maps a subscriber id to the outbound handle of the connection it was first
//! seen on. Registration is first-registration-wins: once an id is mapped,
//! later connections presenting the same id do not replace the mapping, even
//! if the original connection is dead. Reproducing that quirk is deliberate;
//! [`ConnectionRegistry::with_replace_on_reconnect`] opts into replacing a
//! dead mapping instead.
//!
//! Entries are never purged when a connection dies. A stale id simply stops
//! resolving to a live handle and the router skips it as a routing miss.

use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::RwLock;

/// Outbound handle for one subscriber connection
///
/// Wraps the sending side of the connection's event queue. A dedicated writer
/// task drains the queue onto the socket, so everything pushed through one
/// handle reaches the peer in push order.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    session_id: u64,
    tx: mpsc::UnboundedSender<Bytes>,
}

impl ConnectionHandle {
    /// Create a handle from a session id and the connection's event queue
    pub fn new(session_id: u64, tx: mpsc::UnboundedSender<Bytes>) -> Self {
        Self { session_id, tx }
    }

    /// Session id of the connection this handle belongs to
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Queue one event line for delivery
    ///
    /// Returns false once the connection's writer task is gone; the caller
    /// treats that as a per-connection delivery failure, never an error.
    pub fn send(&self, event: Bytes) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Whether the writer task on the far side of the queue is still running
    pub fn is_live(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Subscriber id -> connection handle
///
/// Thread-safe via `RwLock`. When an operation needs both this registry and
/// the subscription table, the table is always locked first; the two are
/// never held at once by this crate, which keeps the order trivially safe.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, ConnectionHandle>>,
    replace_on_reconnect: bool,
}

impl ConnectionRegistry {
    /// Create a registry with first-registration-wins semantics
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            replace_on_reconnect: false,
        }
    }

    /// Create a registry that replaces a dead mapping when the same id
    /// reconnects
    ///
    /// This deviates from the source behavior, where a reconnecting id never
    /// receives pushes again; live mappings are still never displaced.
    pub fn with_replace_on_reconnect() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            replace_on_reconnect: true,
        }
    }

    /// Register a handle under a subscriber id
    ///
    /// First-registration-wins: an existing mapping is left untouched even if
    /// it refers to a dead connection (unless replace-on-reconnect is on and
    /// the mapping is dead). Returns true if the handle was installed.
    pub async fn register(&self, id: &str, handle: ConnectionHandle) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get(id) {
            None => {
                connections.insert(id.to_string(), handle);
                true
            }
            Some(existing) if self.replace_on_reconnect && !existing.is_live() => {
                tracing::debug!(
                    subscriber_id = %id,
                    old_session = existing.session_id(),
                    new_session = handle.session_id(),
                    "Replacing dead connection mapping"
                );
                connections.insert(id.to_string(), handle);
                true
            }
            Some(_) => false,
        }
    }

    /// Look up the handle for a subscriber id
    ///
    /// `None` is a routing miss, not an error.
    pub async fn lookup(&self, id: &str) -> Option<ConnectionHandle> {
        self.connections.read().await.get(id).cloned()
    }

    /// Number of registered subscriber ids
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Whether no subscriber id has registered yet
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
