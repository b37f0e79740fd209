//! Console socket tracking
//!
//! Tracks the websockets a session has open so that closing the session can
//! cancel captures that are still listening.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Unique socket identifier within one tracker
pub type SocketId = u64;

#[derive(Debug)]
struct OpenSocket {
    server_id: String,
    opened_at: Instant,
    cancel_token: CancellationToken,
}

/// Registry of open console sockets for one panel session
#[derive(Debug, Clone)]
pub struct SocketTracker {
    next_id: Arc<AtomicU64>,
    sockets: Arc<DashMap<SocketId, OpenSocket>>,
}

impl Default for SocketTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketTracker {
    pub fn new() -> Self {
        Self {
            next_id: Arc::new(AtomicU64::new(1)),
            sockets: Arc::new(DashMap::new()),
        }
    }

    /// Register an open socket and return its id and cancellation token
    pub fn register(&self, server_id: &str) -> (SocketId, CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel_token = CancellationToken::new();
        self.sockets.insert(
            id,
            OpenSocket {
                server_id: server_id.to_string(),
                opened_at: Instant::now(),
                cancel_token: cancel_token.clone(),
            },
        );
        (id, cancel_token)
    }

    /// Forget a socket. Returns how long it was open.
    pub fn unregister(&self, id: SocketId) -> Option<std::time::Duration> {
        self.sockets
            .remove(&id)
            .map(|(_, socket)| socket.opened_at.elapsed())
    }

    /// Cancel every tracked socket
    pub fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        for entry in self.sockets.iter() {
            entry.cancel_token.cancel();
            cancelled += 1;
        }
        cancelled
    }

    pub fn open_count(&self) -> usize {
        self.sockets.len()
    }

    /// Number of open sockets for one server
    pub fn open_for_server(&self, server_id: &str) -> usize {
        self.sockets
            .iter()
            .filter(|entry| entry.server_id == server_id)
            .count()
    }
}
