use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Websocket connection counters shared by every handler
#[derive(Debug, Default)]
pub struct ConnectionStats {
    active: AtomicU64,
    total: AtomicU64,
    messages_sent: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time copy of [`ConnectionStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStatsSnapshot {
    pub active_connections: u64,
    pub total_connections: u64,
    pub messages_sent: u64,
    pub rejected_connections: u64,
}

impl ConnectionStats {
    pub fn connection_opened(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    /// A connection for an unknown board
    pub fn connection_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ConnectionStatsSnapshot {
        ConnectionStatsSnapshot {
            active_connections: self.active.load(Ordering::Relaxed),
            total_connections: self.total.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            rejected_connections: self.rejected.load(Ordering::Relaxed),
        }
    }
}
