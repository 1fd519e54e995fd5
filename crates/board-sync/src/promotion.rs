//! Promotion piece selection.

use board_protocol::BoardError;
use shakmaty::Role;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PromotionPiece {
    #[default]
    Queen,
    Rook,
    Bishop,
    Knight,
}

impl PromotionPiece {
    /// Accepts full names or UCI letters, case-insensitively.
    pub fn from_name(name: &str) -> Result<Self, BoardError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "queen" | "q" => Ok(Self::Queen),
            "rook" | "r" => Ok(Self::Rook),
            "bishop" | "b" => Ok(Self::Bishop),
            "knight" | "n" => Ok(Self::Knight),
            _ => Err(BoardError::InvalidPromotionSelection {
                piece: name.to_string(),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queen => "queen",
            Self::Rook => "rook",
            Self::Bishop => "bishop",
            Self::Knight => "knight",
        }
    }

    /// Suffix of a promoting UCI move.
    pub fn uci_char(self) -> char {
        match self {
            Self::Queen => 'q',
            Self::Rook => 'r',
            Self::Bishop => 'b',
            Self::Knight => 'n',
        }
    }

    pub fn role(self) -> Role {
        match self {
            Self::Queen => Role::Queen,
            Self::Rook => Role::Rook,
            Self::Bishop => Role::Bishop,
            Self::Knight => Role::Knight,
        }
    }
}

impl std::str::FromStr for PromotionPiece {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

impl std::fmt::Display for PromotionPiece {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The piece a pawn becomes when no explicit choice comes with the move.
/// One per board; defaults to queen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromotionChoice {
    piece: PromotionPiece,
}

impl PromotionChoice {
    pub fn new(piece: PromotionPiece) -> Self {
        Self { piece }
    }

    pub fn piece(&self) -> PromotionPiece {
        self.piece
    }

    pub fn select(&mut self, piece: PromotionPiece) {
        self.piece = piece;
    }

    /// Select by name. An invalid name leaves the current choice in place.
    pub fn select_name(&mut self, name: &str) -> Result<PromotionPiece, BoardError> {
        let piece = PromotionPiece::from_name(name)?;
        self.piece = piece;
        Ok(piece)
    }
}
