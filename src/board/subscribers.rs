use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

/// Identifier handed to each subscribed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which of a board's two feeds a client follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Full history, then each new move
    Moves,
    /// The starting position only
    Fen,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Moves => f.write_str("moves"),
            ChannelKind::Fen => f.write_str("fen"),
        }
    }
}

/// Text sent to viewers when their board is replaced
pub const RESET_MESSAGE: &str = "RESET";

/// One item in a client's outbound queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// History at subscribe time, oldest first, delivered as one queue item
    Replay(Vec<String>),
    /// A newly appended move
    Move(String),
    /// `FEN:<initial position>`
    Fen(String),
    /// The board was replaced; the connection closes after this
    Reset,
}

impl Outbound {
    /// Wire messages this item expands to, in send order
    pub fn into_messages(self) -> Vec<String> {
        match self {
            Outbound::Replay(moves) => moves,
            Outbound::Move(text) | Outbound::Fen(text) => vec![text],
            Outbound::Reset => vec![RESET_MESSAGE.to_string()],
        }
    }
}

/// What happened when a move was fanned out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: usize,
    /// Clients removed because their queue was full or closed
    pub dropped: Vec<ClientId>,
}

struct Subscriber {
    kind: ChannelKind,
    tx: mpsc::Sender<Outbound>,
}

/// A board's subscribed clients
#[derive(Default)]
pub struct SubscriberSet {
    clients: HashMap<ClientId, Subscriber>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `client` and queue its opening payload.
    ///
    /// Returns false (and registers nothing) when the queue could not take it.
    pub fn insert(
        &mut self,
        client: ClientId,
        kind: ChannelKind,
        tx: mpsc::Sender<Outbound>,
        opening: Option<Outbound>,
    ) -> bool {
        if let Some(item) = opening {
            if let Err(e) = tx.try_send(item) {
                warn!("Client {} could not take its opening payload: {}", client, e);
                return false;
            }
        }
        self.clients.insert(client, Subscriber { kind, tx });
        true
    }

    /// Idempotent removal
    pub fn remove(&mut self, client: ClientId) -> bool {
        self.clients.remove(&client).is_some()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn count(&self, kind: ChannelKind) -> usize {
        self.clients.values().filter(|s| s.kind == kind).count()
    }

    /// Queue `item` for every client on `kind` without waiting. A client whose
    /// queue is full or closed is removed on the spot.
    pub fn fanout(&mut self, kind: ChannelKind, item: &Outbound) -> FanoutReport {
        let mut report = FanoutReport::default();

        self.clients.retain(|client, subscriber| {
            if subscriber.kind != kind {
                return true;
            }
            match subscriber.tx.try_send(item.clone()) {
                Ok(()) => {
                    report.delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    warn!("Client {} is not keeping up, dropping it", client);
                    report.dropped.push(*client);
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Client {} went away, removing it", client);
                    report.dropped.push(*client);
                    false
                }
            }
        });

        report
    }

    /// Send `RESET` to everyone and forget them. Dropping the senders ends
    /// each connection's queue.
    pub fn close_all(&mut self) -> usize {
        let count = self.clients.len();
        for (client, subscriber) in self.clients.drain() {
            if subscriber.tx.try_send(Outbound::Reset).is_err() {
                debug!("Client {} missed the reset notice", client);
            }
        }
        count
    }
}
