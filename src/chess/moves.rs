use super::square::{PieceClass, Square};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Extra board changes a move carries beyond `from` and `to`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpecialMove {
    Normal,
    Castle { rook_from: Square, rook_to: Square },
    EnPassant { captured: Square },
}

/// A reconciled move, appended to a board's history
#[derive(Debug, Clone, Serialize)]
pub struct MoveRecord {
    pub from: Square,
    pub to: Square,
    pub piece: PieceClass,
    pub capture: bool,
    pub promotion: Option<PieceClass>,
    pub special: SpecialMove,
    pub recorded_at: DateTime<Utc>,
}

impl MoveRecord {
    pub fn new(from: Square, to: Square, piece: PieceClass) -> Self {
        Self {
            from,
            to,
            piece,
            capture: false,
            promotion: None,
            special: SpecialMove::Normal,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_capture(mut self) -> Self {
        self.capture = true;
        self
    }

    pub fn with_promotion(mut self, piece: PieceClass) -> Self {
        self.promotion = Some(piece);
        self
    }

    pub fn with_special(mut self, special: SpecialMove) -> Self {
        if matches!(special, SpecialMove::EnPassant { .. }) {
            self.capture = true;
        }
        self.special = special;
        self
    }

    /// UCI text, e.g. `e2e4`, `e7e8q`, `e1g1`
    pub fn uci(&self) -> String {
        let mut text = format!("{}{}", self.from, self.to);
        if let Some(promotion) = self.promotion {
            text.push(promotion.fen_char().to_ascii_lowercase());
        }
        text
    }
}

impl fmt::Display for MoveRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uci())
    }
}
