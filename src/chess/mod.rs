mod moves;
mod position;
mod snapshot;
mod square;

pub use moves::{MoveRecord, SpecialMove};
pub use position::{Position, STARTING_FEN};
pub use snapshot::{Snapshot, SnapshotDiff, MAX_PIECES};
pub use square::{Color, PieceClass, PieceKind, Square};
