use crate::error::EventBusError;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Everything the service reports about boards, clients and its own lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChesscamEvent {
    /// Boards were created and their workers started
    SessionStarted {
        board_count: usize,
        initial_fen: String,
        timestamp: SystemTime,
    },
    /// A move was appended to a board's history
    MoveReconciled {
        board_id: u32,
        uci: String,
        ply: usize,
        timestamp: SystemTime,
    },
    /// A frame differed from the baseline but did not read as a single move
    ReconciliationWithheld {
        board_id: u32,
        changed_squares: usize,
        timestamp: SystemTime,
    },
    /// A frame could not be analysed and was skipped
    FrameSkipped {
        board_id: u32,
        frame_id: u64,
        reason: String,
    },
    /// A viewer joined a board's move or FEN channel
    ClientSubscribed {
        board_id: u32,
        client_id: String,
        channel: String,
    },
    /// A viewer left or was removed from a board
    ClientDropped {
        board_id: u32,
        client_id: String,
        reason: String,
    },
    /// Some or all boards were replaced with fresh ones
    BoardsReset {
        board_ids: Vec<u32>,
        initial_fen: String,
        timestamp: SystemTime,
    },
    /// A component failed outside any single board
    SystemError { component: String, error: String },
    /// The process is about to stop
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl ChesscamEvent {
    /// Board the event concerns, if any
    pub fn board_id(&self) -> Option<u32> {
        match self {
            ChesscamEvent::MoveReconciled { board_id, .. }
            | ChesscamEvent::ReconciliationWithheld { board_id, .. }
            | ChesscamEvent::FrameSkipped { board_id, .. }
            | ChesscamEvent::ClientSubscribed { board_id, .. }
            | ChesscamEvent::ClientDropped { board_id, .. } => Some(*board_id),
            _ => None,
        }
    }

    /// One-line summary for logs
    pub fn description(&self) -> String {
        match self {
            ChesscamEvent::SessionStarted {
                board_count,
                initial_fen,
                ..
            } => {
                format!("Session started with {} boards at {}", board_count, initial_fen)
            }
            ChesscamEvent::MoveReconciled {
                board_id, uci, ply, ..
            } => {
                format!("Board {} move {}: {}", board_id, ply, uci)
            }
            ChesscamEvent::ReconciliationWithheld {
                board_id,
                changed_squares,
                ..
            } => {
                format!(
                    "Board {} withheld a {}-square change",
                    board_id, changed_squares
                )
            }
            ChesscamEvent::FrameSkipped {
                board_id,
                frame_id,
                reason,
            } => {
                format!("Board {} skipped frame {}: {}", board_id, frame_id, reason)
            }
            ChesscamEvent::ClientSubscribed {
                board_id,
                client_id,
                channel,
            } => {
                format!(
                    "Client {} subscribed to board {} {} channel",
                    client_id, board_id, channel
                )
            }
            ChesscamEvent::ClientDropped {
                board_id,
                client_id,
                reason,
            } => {
                format!(
                    "Client {} dropped from board {}: {}",
                    client_id, board_id, reason
                )
            }
            ChesscamEvent::BoardsReset {
                board_ids,
                initial_fen,
                ..
            } => {
                format!("Boards {:?} reset to {}", board_ids, initial_fen)
            }
            ChesscamEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            ChesscamEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Stable snake_case name, used as the `kind` log field
    pub fn event_type(&self) -> &'static str {
        match self {
            ChesscamEvent::SessionStarted { .. } => "session_started",
            ChesscamEvent::MoveReconciled { .. } => "move_reconciled",
            ChesscamEvent::ReconciliationWithheld { .. } => "reconciliation_withheld",
            ChesscamEvent::FrameSkipped { .. } => "frame_skipped",
            ChesscamEvent::ClientSubscribed { .. } => "client_subscribed",
            ChesscamEvent::ClientDropped { .. } => "client_dropped",
            ChesscamEvent::BoardsReset { .. } => "boards_reset",
            ChesscamEvent::SystemError { .. } => "system_error",
            ChesscamEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Process-wide fan-out of [`ChesscamEvent`]s over a tokio broadcast channel.
///
/// Every published event is also logged, at a level chosen by its kind, so
/// the bus doubles as the service's activity log.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ChesscamEvent>,
}

impl EventBus {
    /// `capacity` bounds how far a slow receiver may fall behind before it lags
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChesscamEvent> {
        self.sender.subscribe()
    }

    /// Log `event` and hand it to every receiver.
    ///
    /// Returns the number of receivers reached. Having none is not an error.
    pub async fn publish(&self, event: ChesscamEvent) -> Result<usize, EventBusError> {
        let kind = event.event_type();
        let board = event.board_id();
        match &event {
            ChesscamEvent::SessionStarted { .. }
            | ChesscamEvent::MoveReconciled { .. }
            | ChesscamEvent::BoardsReset { .. }
            | ChesscamEvent::ShutdownRequested { .. } => {
                info!(kind, board, "{}", event.description());
            }
            ChesscamEvent::SystemError { .. } => {
                error!(kind, "{}", event.description());
            }
            _ => {
                debug!(kind, board, "{}", event.description());
            }
        }

        if self.sender.receiver_count() == 0 {
            debug!("No receivers for {} event", kind);
            return Ok(0);
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
