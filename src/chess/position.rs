use super::moves::{MoveRecord, SpecialMove};
use super::snapshot::Snapshot;
use super::square::{Color, PieceClass, PieceKind, Square};
use crate::error::BoardError;
use shakmaty::fen::{Fen, LossyFenError};
use shakmaty::{Bitboard, Piece, Rank, Role, Setup};
use std::fmt;

/// Standard starting position
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// A FEN-described position. Pieces are moved without legality checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    setup: Setup,
}

impl Position {
    /// Parse a FEN string. Trailing fields may be omitted and take their
    /// usual defaults (`w - - 0 1`).
    pub fn parse(fen: &str) -> Result<Self, BoardError> {
        let fen = fen.trim();
        let parsed = Fen::from_ascii(fen.as_bytes()).map_err(|e| BoardError::InvalidConfiguration {
            details: format!("invalid FEN '{}': {}", fen, e),
        })?;
        Ok(Self {
            setup: parsed.into_setup(),
        })
    }

    pub fn piece_at(&self, square: Square) -> Option<PieceClass> {
        self.setup
            .board
            .piece_at(board_square(square))
            .map(piece_class)
    }

    pub fn side_to_move(&self) -> Color {
        match self.setup.turn {
            shakmaty::Color::White => Color::White,
            shakmaty::Color::Black => Color::Black,
        }
    }

    /// Occupancy snapshot implied by the piece placement
    pub fn occupancy(&self) -> Snapshot {
        self.setup
            .board
            .iter()
            .filter_map(|(square, piece)| {
                Square::from_index(square.to_usize()).map(|sq| (sq, piece_class(piece)))
            })
            .collect()
    }

    /// Play `mv` on the placement and advance the bookkeeping fields.
    /// Counters saturate instead of overflowing.
    pub fn apply(&mut self, mv: &MoveRecord) {
        let setup = &mut self.setup;
        let from = board_square(mv.from);
        let to = board_square(mv.to);

        let moving = setup
            .board
            .remove_piece_at(from)
            .map(piece_class)
            .unwrap_or(mv.piece);
        let is_capture = setup.board.piece_at(to).is_some() || mv.capture;

        match mv.special {
            SpecialMove::Castle { rook_from, rook_to } => {
                if let Some(rook) = setup.board.remove_piece_at(board_square(rook_from)) {
                    setup.board.set_piece_at(board_square(rook_to), rook);
                }
            }
            SpecialMove::EnPassant { captured } => {
                setup.board.discard_piece_at(board_square(captured));
            }
            SpecialMove::Normal => {}
        }

        setup
            .board
            .set_piece_at(to, board_piece(mv.promotion.unwrap_or(moving)));

        setup.halfmoves = if moving.is_pawn() || is_capture {
            0
        } else {
            setup.halfmoves.saturating_add(1)
        };

        // Castling rights are tracked by rook square
        if moving.is_king() {
            let home = Rank::new(u32::from(moving.color.home_rank()));
            setup.castling_rights.discard(Bitboard::from_rank(home));
        }
        setup.castling_rights.discard(from);
        setup.castling_rights.discard(to);

        setup.ep_square = if moving.is_pawn() && mv.from.rank().abs_diff(mv.to.rank()) == 2 {
            Square::new(mv.from.file(), (mv.from.rank() + mv.to.rank()) / 2).map(board_square)
        } else {
            None
        };

        if moving.color == Color::Black {
            setup.fullmoves = setup.fullmoves.saturating_add(1);
        }
        setup.turn = board_color(moving.color.opposite());
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fen = Fen::try_from_setup(self.setup.clone()).unwrap_or_else(LossyFenError::ignore);
        write!(f, "{}", fen)
    }
}

fn board_square(square: Square) -> shakmaty::Square {
    shakmaty::Square::new(square.index() as u32)
}

fn board_color(color: Color) -> shakmaty::Color {
    match color {
        Color::White => shakmaty::Color::White,
        Color::Black => shakmaty::Color::Black,
    }
}

fn board_piece(piece: PieceClass) -> Piece {
    let role = match piece.kind {
        PieceKind::Pawn => Role::Pawn,
        PieceKind::Knight => Role::Knight,
        PieceKind::Bishop => Role::Bishop,
        PieceKind::Rook => Role::Rook,
        PieceKind::Queen => Role::Queen,
        PieceKind::King => Role::King,
    };
    Piece {
        color: board_color(piece.color),
        role,
    }
}

fn piece_class(piece: Piece) -> PieceClass {
    let color = match piece.color {
        shakmaty::Color::White => Color::White,
        shakmaty::Color::Black => Color::Black,
    };
    let kind = match piece.role {
        Role::Pawn => PieceKind::Pawn,
        Role::Knight => PieceKind::Knight,
        Role::Bishop => PieceKind::Bishop,
        Role::Rook => PieceKind::Rook,
        Role::Queen => PieceKind::Queen,
        Role::King => PieceKind::King,
    };
    PieceClass::new(color, kind)
}
