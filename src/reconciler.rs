//! Occupancy diffing: turns successive snapshots into at most one move per frame

use crate::chess::{
    Color, MoveRecord, PieceClass, PieceKind, Snapshot, SnapshotDiff, SpecialMove, Square,
};
use tracing::{debug, trace};

/// Result of offering one snapshot to the reconciler
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    /// Snapshot matches the baseline
    NoChange,
    /// A single move was confirmed; the caller records it and adopts the snapshot
    Emitted(MoveRecord),
    /// A difference is being held until a later frame confirms or reverts it
    Pending {
        changed_squares: usize,
        /// Whether the difference reads as one clean move awaiting confirmation
        clean: bool,
    },
    /// A pending difference disappeared and was discarded as noise
    Reverted,
}

impl ReconcileOutcome {
    pub fn emitted(&self) -> Option<&MoveRecord> {
        match self {
            ReconcileOutcome::Emitted(mv) => Some(mv),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::NoChange => "no_change",
            ReconcileOutcome::Emitted(_) => "emitted",
            ReconcileOutcome::Pending { .. } => "pending",
            ReconcileOutcome::Reverted => "reverted",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ReconcileState {
    Stable,
    PendingChange { candidate: Snapshot, seen: u32 },
}

/// Per-board `Stable -> PendingChange -> Stable` state machine.
///
/// The reconciler never touches the baseline itself. On `Emitted` the owner
/// applies the move and replaces its baseline with the offered snapshot; on
/// every other outcome the baseline stays as it was.
#[derive(Debug, Clone)]
pub struct Reconciler {
    confirmation_frames: u32,
    state: ReconcileState,
}

impl Reconciler {
    pub fn new(confirmation_frames: u32) -> Self {
        Self {
            confirmation_frames: confirmation_frames.max(1),
            state: ReconcileState::Stable,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, ReconcileState::PendingChange { .. })
    }

    /// Compare `next` against `baseline` and advance the state machine
    pub fn observe(&mut self, baseline: &Snapshot, next: &Snapshot) -> ReconcileOutcome {
        let diff = baseline.diff(next);

        if diff.is_empty() {
            return if self.is_pending() {
                debug!("Pending change reverted to baseline, discarding as noise");
                self.state = ReconcileState::Stable;
                ReconcileOutcome::Reverted
            } else {
                ReconcileOutcome::NoChange
            };
        }

        let changed_squares = diff.changed_squares();
        let Some(mv) = infer_move(&diff) else {
            trace!(
                "Ambiguous difference over {} squares, withholding",
                changed_squares
            );
            self.state = ReconcileState::PendingChange {
                candidate: next.clone(),
                seen: 0,
            };
            return ReconcileOutcome::Pending {
                changed_squares,
                clean: false,
            };
        };

        let seen = match &self.state {
            ReconcileState::PendingChange { candidate, seen } if candidate == next => seen + 1,
            _ => 1,
        };

        if seen >= self.confirmation_frames {
            self.state = ReconcileState::Stable;
            ReconcileOutcome::Emitted(mv)
        } else {
            trace!(
                "Move {} seen {}/{} frames",
                mv,
                seen,
                self.confirmation_frames
            );
            self.state = ReconcileState::PendingChange {
                candidate: next.clone(),
                seen,
            };
            ReconcileOutcome::Pending {
                changed_squares,
                clean: true,
            }
        }
    }

    /// Drop any pending difference
    pub fn reset(&mut self) {
        self.state = ReconcileState::Stable;
    }
}

/// Read a difference as exactly one move, or `None` when it is ambiguous
pub fn infer_move(diff: &SnapshotDiff) -> Option<MoveRecord> {
    match (
        diff.vacated.as_slice(),
        diff.appeared.as_slice(),
        diff.replaced.as_slice(),
    ) {
        ([(from, piece)], [(to, landed)], []) => arrival(*from, *piece, *to, *landed),
        ([(from, piece)], [], [(to, before, landed)]) => {
            if before.color == piece.color {
                return None;
            }
            arrival(*from, *piece, *to, *landed).map(MoveRecord::with_capture)
        }
        (vacated @ [_, _], [(to, landed)], []) => en_passant(vacated, *to, *landed),
        (vacated @ [_, _], appeared @ [_, _], []) => castle(vacated, appeared),
        _ => None,
    }
}

/// `piece` left `from` and `landed` now stands on `to`
fn arrival(from: Square, piece: PieceClass, to: Square, landed: PieceClass) -> Option<MoveRecord> {
    if landed == piece {
        return Some(MoveRecord::new(from, to, piece));
    }

    let promotes = piece.is_pawn()
        && landed.color == piece.color
        && !landed.is_pawn()
        && !landed.is_king()
        && to.rank() == piece.color.last_rank();

    promotes.then(|| MoveRecord::new(from, to, piece).with_promotion(landed))
}

fn en_passant(
    vacated: &[(Square, PieceClass)],
    to: Square,
    landed: PieceClass,
) -> Option<MoveRecord> {
    if !landed.is_pawn() {
        return None;
    }

    let (from, captured) = match (vacated[0], vacated[1]) {
        ((a, pa), (b, pb)) if pa == landed && pb.is_pawn() && pb.color != landed.color => (a, b),
        ((a, pa), (b, pb)) if pb == landed && pa.is_pawn() && pa.color != landed.color => (b, a),
        _ => return None,
    };

    let forward = match landed.color {
        Color::White => 1i16,
        Color::Black => -1,
    };
    let diagonal = from.file().abs_diff(to.file()) == 1
        && to.rank() as i16 - from.rank() as i16 == forward;
    let beside = captured.rank() == from.rank() && captured.file() == to.file();

    (diagonal && beside).then(|| {
        MoveRecord::new(from, to, landed).with_special(SpecialMove::EnPassant { captured })
    })
}

fn castle(
    vacated: &[(Square, PieceClass)],
    appeared: &[(Square, PieceClass)],
) -> Option<MoveRecord> {
    let find = |set: &[(Square, PieceClass)], kind: PieceKind| {
        set.iter().find(|(_, piece)| piece.kind == kind).copied()
    };

    let (king_from, king) = find(vacated, PieceKind::King)?;
    let (king_to, king_landed) = find(appeared, PieceKind::King)?;
    let (rook_from, rook) = find(vacated, PieceKind::Rook)?;
    let (rook_to, rook_landed) = find(appeared, PieceKind::Rook)?;

    let color = king.color;
    if king_landed != king
        || rook != PieceClass::new(color, PieceKind::Rook)
        || rook_landed != rook
    {
        return None;
    }

    let home = color.home_rank();
    if [king_from, king_to, rook_from, rook_to]
        .iter()
        .any(|sq| sq.rank() != home)
        || king_from.file() != 4
    {
        return None;
    }

    // Rook origin and destination files for each king destination
    let expected = match king_to.file() {
        6 => (7, 5),
        2 => (0, 3),
        _ => return None,
    };
    if (rook_from.file(), rook_to.file()) != expected {
        return None;
    }

    Some(
        MoveRecord::new(king_from, king_to, king)
            .with_special(SpecialMove::Castle { rook_from, rook_to }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chess::{Position, STARTING_FEN};

    fn sq(name: &str) -> Square {
        name.parse().unwrap()
    }

    fn start() -> Snapshot {
        Position::parse(STARTING_FEN).unwrap().occupancy()
    }

    fn moved(base: &Snapshot, from: &str, to: &str) -> Snapshot {
        let mut next = base.clone();
        let piece = next.remove(sq(from)).unwrap();
        next.insert(sq(to), piece);
        next
    }

    #[test]
    fn test_quiet_move_emits_immediately() {
        let base = start();
        let next = moved(&base, "e2", "e4");
        let mut reconciler = Reconciler::new(1);

        let outcome = reconciler.observe(&base, &next);
        let mv = outcome.emitted().unwrap();
        assert_eq!(mv.uci(), "e2e4");
        assert!(!mv.capture);
        assert!(!reconciler.is_pending());
    }

    #[test]
    fn test_identical_snapshot_is_no_change() {
        let base = start();
        let mut reconciler = Reconciler::new(1);
        assert!(matches!(
            reconciler.observe(&base, &base),
            ReconcileOutcome::NoChange
        ));
    }

    #[test]
    fn test_capture_detected_from_replacement() {
        let base = Position::parse("4k3/8/8/3p4/4P3/8/8/4K3 w - - 0 1")
            .unwrap()
            .occupancy();
        let next = moved(&base, "e4", "d5");

        let mv = infer_move(&base.diff(&next)).unwrap();
        assert_eq!(mv.uci(), "e4d5");
        assert!(mv.capture);
    }

    #[test]
    fn test_same_colour_replacement_is_ambiguous() {
        let base = Position::parse("4k3/8/8/3P4/4P3/8/8/4K3 w - - 0 1")
            .unwrap()
            .occupancy();
        let next = moved(&base, "e4", "d5");
        assert!(infer_move(&base.diff(&next)).is_none());
    }

    #[test]
    fn test_promotion() {
        let base = Position::parse("4k3/P7/8/8/8/8/8/4K3 w - - 0 1")
            .unwrap()
            .occupancy();
        let mut next = base.clone();
        next.remove(sq("a7"));
        next.insert(sq("a8"), PieceClass::new(Color::White, PieceKind::Queen));

        let mv = infer_move(&base.diff(&next)).unwrap();
        assert_eq!(mv.uci(), "a7a8q");
        assert!(!mv.capture);
    }

    #[test]
    fn test_piece_changing_class_mid_board_is_ambiguous() {
        let base = start();
        let mut next = base.clone();
        next.remove(sq("e2"));
        next.insert(sq("e4"), PieceClass::new(Color::White, PieceKind::Queen));
        assert!(infer_move(&base.diff(&next)).is_none());
    }

    #[test]
    fn test_kingside_castle() {
        let base = Position::parse("4k3/8/8/8/8/8/8/4K2R w K - 0 1")
            .unwrap()
            .occupancy();
        let next = moved(&moved(&base, "e1", "g1"), "h1", "f1");

        let mv = infer_move(&base.diff(&next)).unwrap();
        assert_eq!(mv.uci(), "e1g1");
        assert_eq!(
            mv.special,
            SpecialMove::Castle {
                rook_from: sq("h1"),
                rook_to: sq("f1")
            }
        );
    }

    #[test]
    fn test_queenside_castle_black() {
        let base = Position::parse("r3k3/8/8/8/8/8/8/4K3 b q - 0 1")
            .unwrap()
            .occupancy();
        let next = moved(&moved(&base, "e8", "c8"), "a8", "d8");

        let mv = infer_move(&base.diff(&next)).unwrap();
        assert_eq!(mv.uci(), "e8c8");
    }

    #[test]
    fn test_en_passant() {
        let base = Position::parse("4k3/8/8/3pP3/8/8/8/4K3 w - d6 0 1")
            .unwrap()
            .occupancy();
        let mut next = moved(&base, "e5", "d6");
        next.remove(sq("d5"));

        let mv = infer_move(&base.diff(&next)).unwrap();
        assert_eq!(mv.uci(), "e5d6");
        assert!(mv.capture);
        assert_eq!(mv.special, SpecialMove::EnPassant { captured: sq("d5") });
    }

    #[test]
    fn test_two_unrelated_moves_withheld_then_reverted() {
        let base = start();
        let next = moved(&moved(&base, "e2", "e4"), "d7", "d5");
        let mut reconciler = Reconciler::new(1);

        assert!(matches!(
            reconciler.observe(&base, &next),
            ReconcileOutcome::Pending { changed_squares: 4, clean: false }
        ));
        assert!(reconciler.is_pending());

        assert!(matches!(
            reconciler.observe(&base, &base),
            ReconcileOutcome::Reverted
        ));
        assert!(!reconciler.is_pending());
    }

    #[test]
    fn test_noisy_frame_then_clean_move() {
        let base = start();
        let mut noisy = moved(&base, "e2", "e4");
        noisy.remove(sq("a2"));
        let clean = moved(&base, "e2", "e4");
        let mut reconciler = Reconciler::new(1);

        assert!(reconciler.observe(&base, &noisy).emitted().is_none());
        let outcome = reconciler.observe(&base, &clean);
        assert_eq!(outcome.emitted().map(|mv| mv.uci()), Some("e2e4".to_string()));
    }

    #[test]
    fn test_confirmation_frames() {
        let base = start();
        let next = moved(&base, "g1", "f3");
        let mut reconciler = Reconciler::new(2);

        assert!(matches!(
            reconciler.observe(&base, &next),
            ReconcileOutcome::Pending { clean: true, .. }
        ));
        assert_eq!(
            reconciler.observe(&base, &next).emitted().map(|mv| mv.uci()),
            Some("g1f3".to_string())
        );
    }

    #[test]
    fn test_confirmation_restarts_when_candidate_changes() {
        let base = start();
        let mut reconciler = Reconciler::new(2);

        reconciler.observe(&base, &moved(&base, "g1", "f3"));
        assert!(matches!(
            reconciler.observe(&base, &moved(&base, "g1", "h3")),
            ReconcileOutcome::Pending { clean: true, .. }
        ));
        assert!(reconciler
            .observe(&base, &moved(&base, "g1", "h3"))
            .emitted()
            .is_some());
    }
}
