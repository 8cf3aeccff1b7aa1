//! Bookkeeping for daemon connections.
//!
//! Every extension that connects to the daemon gets its own
//! [`BridgeRouter`], and with it its own sessions and monitors. The manager
//! keeps each connection's router so the daemon can report how many
//! instances are live across connections and can force every connection
//! closed on shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::router::BridgeRouter;

struct ConnectionState {
    opened_at: Instant,
    router: BridgeRouter,
}

/// Live daemon connections keyed by `ws-<n>`.
///
/// Connections are cancelled through children of one token, which is swapped
/// for a fresh one by [`close_all`](Self::close_all) so that extensions
/// reconnecting afterwards are not born cancelled.
pub struct WsConnectionManager {
    connections: DashMap<String, ConnectionState>,
    next_id: AtomicU64,
    global_cancel: RwLock<CancellationToken>,
}

impl WsConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            global_cancel: RwLock::new(CancellationToken::new()),
        }
    }

    /// Registers the connection served by `router`. Dropping the returned
    /// guard closes the router's instances and forgets the connection.
    pub fn register(self: &Arc<Self>, router: BridgeRouter) -> ConnectionGuard {
        let id = format!("ws-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel_token = self.global_cancel.read().child_token();

        self.connections.insert(
            id.clone(),
            ConnectionState {
                opened_at: Instant::now(),
                router,
            },
        );
        log::info!(
            "[WS] Extension connected: {} ({} open)",
            id,
            self.connections.len()
        );

        ConnectionGuard {
            id,
            manager: Arc::clone(self),
            cancel_token,
        }
    }

    fn unregister(&self, id: &str) {
        let Some((_, state)) = self.connections.remove(id) else {
            return;
        };
        let instances = state.router.instance_count();
        state.router.close();
        log::info!(
            "[WS] Extension disconnected: {} after {:?}, {} instance(s) closed ({} open)",
            id,
            state.opened_at.elapsed(),
            instances,
            self.connections.len()
        );
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Sessions and monitors owned by all open connections.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.connections
            .iter()
            .map(|entry| entry.value().router.instance_count())
            .sum()
    }

    /// Signals every open connection to close and returns how many were
    /// signaled.
    pub fn close_all(&self) -> usize {
        let count = self.connections.len();
        let mut guard = self.global_cancel.write();
        guard.cancel();
        *guard = CancellationToken::new();
        if count > 0 {
            log::info!(
                "[WS] Closing {} extension connection(s) holding {} instance(s)",
                count,
                self.instance_count()
            );
        }
        count
    }
}

impl Default for WsConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Held by a connection's handler for as long as the socket is open.
pub struct ConnectionGuard {
    id: String,
    manager: Arc<WsConnectionManager>,
    cancel_token: CancellationToken,
}

impl ConnectionGuard {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Cancelled when the daemon shuts the connection down.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.manager.unregister(&self.id);
    }
}
