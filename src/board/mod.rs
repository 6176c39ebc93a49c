//! Authoritative per-board state and the registry that owns it

mod registry;
mod subscribers;
#[cfg(test)]
mod tests;

pub use registry::{BoardMap, BoardRegistry};
pub use subscribers::{
    ChannelKind, ClientId, FanoutReport, Outbound, SubscriberSet, RESET_MESSAGE,
};

use crate::chess::{MoveRecord, Position, Snapshot};
use crate::error::BoardError;
use crate::reconciler::{ReconcileOutcome, Reconciler};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

/// Everything a reconciliation reads or writes. Guarded by one lock so a
/// board has a single writer.
struct BoardState {
    position: Position,
    history: Vec<MoveRecord>,
    last_occupancy: Snapshot,
    reconciler: Reconciler,
    /// Set once the board has been displaced; no client may attach after
    closed: bool,
}

/// Result of offering a snapshot to a board
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub outcome: ReconcileOutcome,
    /// Fan-out of the emitted move; empty when nothing was emitted
    pub fanout: FanoutReport,
    /// History length after this call
    pub history_len: usize,
}

/// JSON view of a board for the status route
#[derive(Debug, Clone, Serialize)]
pub struct BoardStatus {
    pub id: u32,
    pub initial_fen: String,
    pub current_fen: String,
    pub moves: Vec<String>,
    pub move_subscribers: usize,
    pub fen_subscribers: usize,
    pub pending: bool,
}

/// One tracked chessboard.
///
/// Lock order is `state` then `subscribers`. Holding `state` across the
/// append and the fan-out is what keeps a new subscriber's replay and its
/// live feed free of gaps and duplicates.
pub struct Board {
    id: u32,
    initial_position: Position,
    initial_fen: String,
    state: Mutex<BoardState>,
    subscribers: Mutex<SubscriberSet>,
}

impl Board {
    /// Build board `id` at `fen`. The text is kept verbatim as the board's
    /// starting position.
    pub fn new(id: u32, fen: &str, confirmation_frames: u32) -> Result<Self, BoardError> {
        let initial_position = Position::parse(fen)?;
        let initial_fen = fen.trim().to_string();
        let state = BoardState {
            position: initial_position.clone(),
            history: Vec::new(),
            last_occupancy: initial_position.occupancy(),
            reconciler: Reconciler::new(confirmation_frames),
            closed: false,
        };

        Ok(Self {
            id,
            initial_position,
            initial_fen,
            state: Mutex::new(state),
            subscribers: Mutex::new(SubscriberSet::new()),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn initial_position(&self) -> &Position {
        &self.initial_position
    }

    pub fn initial_fen(&self) -> &str {
        &self.initial_fen
    }

    pub fn current_position(&self) -> Position {
        self.state.lock().position.clone()
    }

    pub fn current_fen(&self) -> String {
        self.state.lock().position.to_string()
    }

    pub fn history(&self) -> Vec<MoveRecord> {
        self.state.lock().history.clone()
    }

    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    /// UCI text of every move so far, oldest first
    pub fn move_texts(&self) -> Vec<String> {
        self.state.lock().history.iter().map(MoveRecord::uci).collect()
    }

    pub fn last_occupancy(&self) -> Snapshot {
        self.state.lock().last_occupancy.clone()
    }

    /// True once the board has been displaced from the registry
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Offer a detection snapshot. At most one move is appended per call.
    pub fn reconcile(&self, snapshot: Snapshot) -> Reconciled {
        let mut state = self.state.lock();
        let baseline = std::mem::take(&mut state.last_occupancy);
        let outcome = state.reconciler.observe(&baseline, &snapshot);

        let fanout = match &outcome {
            ReconcileOutcome::Emitted(mv) => {
                state.last_occupancy = snapshot;
                self.commit(&mut state, mv.clone())
            }
            _ => {
                state.last_occupancy = baseline;
                FanoutReport::default()
            }
        };

        trace!("Board {} reconcile: {}", self.id, outcome.label());

        Reconciled {
            outcome,
            fanout,
            history_len: state.history.len(),
        }
    }

    /// Append a move that did not come from detection, then fan it out.
    /// The reconciliation baseline follows the resulting position.
    pub fn publish(&self, mv: MoveRecord) -> FanoutReport {
        let mut state = self.state.lock();
        let report = self.commit(&mut state, mv);
        state.last_occupancy = state.position.occupancy();
        state.reconciler.reset();
        report
    }

    /// Apply, append, then fan out, all under the state lock
    fn commit(&self, state: &mut BoardState, mv: MoveRecord) -> FanoutReport {
        state.position.apply(&mv);
        let text = mv.uci();
        state.history.push(mv);

        info!(
            "Board {} move {}: {} -> {}",
            self.id,
            state.history.len(),
            text,
            state.position
        );

        self.subscribers
            .lock()
            .fanout(ChannelKind::Moves, &Outbound::Move(text))
    }

    /// Register a client and queue its opening payload: the move history for
    /// the move channel, `FEN:<initial>` for the FEN channel.
    ///
    /// Returns false when the board has been closed or the client's queue
    /// could not take the payload.
    pub fn attach(
        &self,
        client: ClientId,
        kind: ChannelKind,
        tx: mpsc::Sender<Outbound>,
    ) -> bool {
        let state = self.state.lock();
        if state.closed {
            debug!("Client {} refused: board {} was replaced", client, self.id);
            return false;
        }
        let (opening, replayed) = match kind {
            ChannelKind::Moves if state.history.is_empty() => (None, 0),
            ChannelKind::Moves => (
                Some(Outbound::Replay(
                    state.history.iter().map(MoveRecord::uci).collect(),
                )),
                state.history.len(),
            ),
            ChannelKind::Fen => (
                Some(Outbound::Fen(format!("FEN:{}", self.initial_fen))),
                0,
            ),
        };

        let attached = self.subscribers.lock().insert(client, kind, tx, opening);
        if attached {
            debug!(
                "Client {} attached to board {} {} channel ({} moves replayed)",
                client, self.id, kind, replayed
            );
        }
        attached
    }

    /// Idempotent
    pub fn detach(&self, client: ClientId) -> bool {
        let removed = self.subscribers.lock().remove(client);
        if removed {
            debug!("Client {} detached from board {}", client, self.id);
        }
        removed
    }

    /// Notify and release every subscriber, and refuse any later attach.
    /// Used when the board is replaced.
    pub fn close_all(&self) -> usize {
        let mut state = self.state.lock();
        state.closed = true;
        let closed = self.subscribers.lock().close_all();
        if closed > 0 {
            info!("Board {} closed {} subscriber connections", self.id, closed);
        }
        closed
    }

    pub fn status(&self) -> BoardStatus {
        let state = self.state.lock();
        let subscribers = self.subscribers.lock();
        BoardStatus {
            id: self.id,
            initial_fen: self.initial_fen.clone(),
            current_fen: state.position.to_string(),
            moves: state.history.iter().map(MoveRecord::uci).collect(),
            move_subscribers: subscribers.count(ChannelKind::Moves),
            fen_subscribers: subscribers.count(ChannelKind::Fen),
            pending: state.reconciler.is_pending(),
        }
    }
}

impl std::fmt::Debug for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Board")
            .field("id", &self.id)
            .field("initial_fen", &self.initial_fen)
            .finish_non_exhaustive()
    }
}
