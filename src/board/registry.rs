use super::Board;
use crate::chess::Position;
use crate::error::BoardError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Board id to board. Always replaced whole, never edited in place.
pub type BoardMap = HashMap<u32, Arc<Board>>;

/// The single creation and lookup authority for boards.
///
/// Readers take a cheap clone of the current map; writers build a complete
/// new map and swap it in, so a reader never sees a half-populated registry.
pub struct BoardRegistry {
    boards: RwLock<Arc<BoardMap>>,
    confirmation_frames: u32,
}

impl BoardRegistry {
    pub fn new(confirmation_frames: u32) -> Self {
        Self {
            boards: RwLock::new(Arc::new(HashMap::new())),
            confirmation_frames,
        }
    }

    /// Build boards `1..=count` at `initial_fen` without installing them
    pub fn build(&self, count: usize, initial_fen: &str) -> Result<BoardMap, BoardError> {
        if count == 0 {
            return Err(BoardError::InvalidConfiguration {
                details: "board count must be at least 1".to_string(),
            });
        }
        let count = u32::try_from(count).map_err(|_| BoardError::InvalidConfiguration {
            details: format!("board count {} is too large", count),
        })?;
        Position::parse(initial_fen)?;

        (1..=count)
            .map(|id| {
                Board::new(id, initial_fen, self.confirmation_frames)
                    .map(|board| (id, Arc::new(board)))
            })
            .collect()
    }

    /// Swap `boards` in as the whole registry. Boards that were displaced send
    /// `RESET` to their subscribers and release them.
    pub fn install(&self, boards: BoardMap) -> Arc<BoardMap> {
        let installed = Arc::new(boards);
        let previous = std::mem::replace(&mut *self.boards.write(), Arc::clone(&installed));

        for (id, board) in previous.iter() {
            let kept = installed
                .get(id)
                .is_some_and(|current| Arc::ptr_eq(current, board));
            if !kept {
                board.close_all();
            }
        }

        debug!(
            "Registry now holds {} boards (was {})",
            installed.len(),
            previous.len()
        );
        installed
    }

    /// Create `count` boards at `initial_fen` and make them the registry's
    /// contents. Nothing is installed on error.
    pub fn create(&self, count: usize, initial_fen: &str) -> Result<Arc<BoardMap>, BoardError> {
        let boards = self.build(count, initial_fen)?;
        let installed = self.install(boards);
        info!("Created {} boards at {}", installed.len(), initial_fen.trim());
        Ok(installed)
    }

    pub fn lookup(&self, board_id: u32) -> Result<Arc<Board>, BoardError> {
        self.boards
            .read()
            .get(&board_id)
            .cloned()
            .ok_or(BoardError::NotFound { board_id })
    }

    /// The current map; later swaps do not affect it
    pub fn snapshot(&self) -> Arc<BoardMap> {
        self.boards.read().clone()
    }

    /// Ids in ascending order
    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.boards.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.boards.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.boards.read().is_empty()
    }

    /// Replace every board with a fresh one at `initial_fen`, keeping the count
    pub fn reset_all(&self, initial_fen: &str) -> Result<Arc<BoardMap>, BoardError> {
        let count = self.len();
        let boards = self.build(count, initial_fen)?;
        let installed = self.install(boards);
        info!("Reset all {} boards to {}", count, initial_fen.trim());
        Ok(installed)
    }

    /// Replace one board with a fresh one at its own starting position. Every
    /// other board carries over untouched.
    pub fn reset_board(&self, board_id: u32) -> Result<Arc<Board>, BoardError> {
        let (fresh, displaced) = {
            let mut guard = self.boards.write();
            let old = guard
                .get(&board_id)
                .cloned()
                .ok_or(BoardError::NotFound { board_id })?;

            let fresh = Arc::new(Board::new(
                board_id,
                old.initial_fen(),
                self.confirmation_frames,
            )?);
            let mut boards: BoardMap = (**guard).clone();
            boards.insert(board_id, Arc::clone(&fresh));
            *guard = Arc::new(boards);
            (fresh, old)
        };

        displaced.close_all();
        info!("Reset board {} to {}", board_id, fresh.initial_fen());
        Ok(fresh)
    }

    /// Drop every board
    pub fn clear(&self) {
        self.install(HashMap::new());
    }
}
