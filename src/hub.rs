//! Per-board subscription lifecycle and move fan-out

use crate::board::{Board, BoardRegistry, ChannelKind, ClientId, FanoutReport, Outbound};
use crate::chess::MoveRecord;
use crate::error::BoardError;
use crate::events::{ChesscamEvent, EventBus};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Lookups a subscribe makes before giving up on a board that keeps being
/// replaced underneath it
const SUBSCRIBE_ATTEMPTS: u32 = 3;

/// Removes its client from the board it subscribed to when dropped, whatever
/// path the connection task leaves by.
pub struct SubscriptionGuard {
    board: Arc<Board>,
    client: ClientId,
}

impl SubscriptionGuard {
    pub fn client(&self) -> ClientId {
        self.client
    }

    pub fn board_id(&self) -> u32 {
        self.board.id()
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if self.board.detach(self.client) {
            debug!(
                "Subscription guard released client {} on board {}",
                self.client,
                self.board.id()
            );
        }
    }
}

/// A live subscription: the client's outbound queue plus its guard
pub struct Subscription {
    pub kind: ChannelKind,
    receiver: mpsc::Receiver<Outbound>,
    guard: SubscriptionGuard,
}

impl Subscription {
    pub fn client(&self) -> ClientId {
        self.guard.client()
    }

    pub fn board_id(&self) -> u32 {
        self.guard.board_id()
    }

    /// Next queued item; `None` once the board has released this client
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Outbound> {
        self.receiver.try_recv().ok()
    }
}

/// Fans moves out to each board's subscribers
#[derive(Clone)]
pub struct BroadcastHub {
    registry: Arc<BoardRegistry>,
    event_bus: Arc<EventBus>,
    client_queue_capacity: usize,
}

impl BroadcastHub {
    pub fn new(
        registry: Arc<BoardRegistry>,
        event_bus: Arc<EventBus>,
        client_queue_capacity: usize,
    ) -> Self {
        Self {
            registry,
            event_bus,
            client_queue_capacity: client_queue_capacity.max(1),
        }
    }

    pub fn registry(&self) -> &Arc<BoardRegistry> {
        &self.registry
    }

    /// Register a new client on `board_id`.
    ///
    /// The opening payload (history replay or `FEN:` line) is already queued
    /// when this returns, ahead of any move published afterwards.
    pub async fn subscribe(
        &self,
        board_id: u32,
        kind: ChannelKind,
    ) -> Result<Subscription, BoardError> {
        let client = ClientId::new();
        let (tx, receiver) = mpsc::channel(self.client_queue_capacity);

        // A reset may displace the board between lookup and attach; the
        // replacement is already installed by then, so look it up again.
        let mut attempts = 0;
        let board = loop {
            let board = self.registry.lookup(board_id)?;
            if board.attach(client, kind, tx.clone()) {
                break board;
            }
            attempts += 1;
            if !board.is_closed() || attempts >= SUBSCRIBE_ATTEMPTS {
                return Err(BoardError::NotFound { board_id });
            }
        };

        self.emit(ChesscamEvent::ClientSubscribed {
            board_id,
            client_id: client.to_string(),
            channel: kind.to_string(),
        })
        .await;

        Ok(Subscription {
            kind,
            receiver,
            guard: SubscriptionGuard { board, client },
        })
    }

    /// Append `mv` to the board's history, then deliver it to every move
    /// subscriber
    pub async fn publish(&self, board_id: u32, mv: MoveRecord) -> Result<FanoutReport, BoardError> {
        let board = self.registry.lookup(board_id)?;
        let report = board.publish(mv);
        self.report_drops(board_id, &report).await;
        Ok(report)
    }

    /// Idempotent. Returns whether the client was still registered.
    pub fn unsubscribe(&self, board_id: u32, client: ClientId) -> bool {
        self.registry
            .lookup(board_id)
            .map(|board| board.detach(client))
            .unwrap_or(false)
    }

    /// Turn fan-out removals into events
    pub async fn report_drops(&self, board_id: u32, report: &FanoutReport) {
        for client in &report.dropped {
            warn!("Removed client {} from board {}", client, board_id);
            self.emit(ChesscamEvent::ClientDropped {
                board_id,
                client_id: client.to_string(),
                reason: "delivery failed".to_string(),
            })
            .await;
        }
    }

    async fn emit(&self, event: ChesscamEvent) {
        if let Err(e) = self.event_bus.publish(event).await {
            debug!("Hub event not delivered: {}", e);
        }
    }
}
