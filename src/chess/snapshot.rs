use super::square::{PieceClass, Square};
use serde::Serialize;
use std::collections::BTreeMap;

/// Maximum number of pieces a snapshot may hold
pub const MAX_PIECES: usize = 32;

/// Square-to-piece occupancy observed at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    squares: BTreeMap<Square, PieceClass>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, square: Square, piece: PieceClass) -> Option<PieceClass> {
        self.squares.insert(square, piece)
    }

    pub fn remove(&mut self, square: Square) -> Option<PieceClass> {
        self.squares.remove(&square)
    }

    pub fn get(&self, square: Square) -> Option<PieceClass> {
        self.squares.get(&square).copied()
    }

    pub fn len(&self) -> usize {
        self.squares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.squares.is_empty()
    }

    /// Occupied squares in ascending square order
    pub fn iter(&self) -> impl Iterator<Item = (Square, PieceClass)> + '_ {
        self.squares.iter().map(|(square, piece)| (*square, *piece))
    }

    /// Squares whose contents differ between `self` (before) and `next` (after)
    pub fn diff(&self, next: &Snapshot) -> SnapshotDiff {
        let mut diff = SnapshotDiff::default();

        for (square, before) in self.iter() {
            match next.get(square) {
                None => diff.vacated.push((square, before)),
                Some(after) if after != before => diff.replaced.push((square, before, after)),
                Some(_) => {}
            }
        }

        for (square, after) in next.iter() {
            if self.get(square).is_none() {
                diff.appeared.push((square, after));
            }
        }

        diff
    }
}

impl FromIterator<(Square, PieceClass)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (Square, PieceClass)>>(iter: I) -> Self {
        Self {
            squares: iter.into_iter().collect(),
        }
    }
}

/// Symmetric difference between two snapshots, split by kind of change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    /// Squares that were occupied and are now empty
    pub vacated: Vec<(Square, PieceClass)>,
    /// Squares that were empty and are now occupied
    pub appeared: Vec<(Square, PieceClass)>,
    /// Squares occupied in both, by different pieces (before, after)
    pub replaced: Vec<(Square, PieceClass, PieceClass)>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.vacated.is_empty() && self.appeared.is_empty() && self.replaced.is_empty()
    }

    pub fn changed_squares(&self) -> usize {
        self.vacated.len() + self.appeared.len() + self.replaced.len()
    }
}
