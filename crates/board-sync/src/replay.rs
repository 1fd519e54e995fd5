//! Position building on top of the `shakmaty` rules engine.

use board_protocol::{BoardError, Color, STARTPOS, VariantKey};
use shakmaty::fen::Fen;
use shakmaty::uci::Uci;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Move, Position, PositionError};

/// Castling notation for a variant. Only variants playable with standard
/// rules are supported.
pub fn castling_mode(variant: VariantKey) -> Result<CastlingMode, BoardError> {
    match variant {
        VariantKey::Standard | VariantKey::FromPosition => Ok(CastlingMode::Standard),
        VariantKey::Chess960 => Ok(CastlingMode::Chess960),
        other => Err(BoardError::InvalidPosition(format!(
            "unsupported variant {other:?}"
        ))),
    }
}

/// Position described by `initialFen` (`"startpos"` or a FEN).
///
/// FENs that parse but carry impossible material are still accepted, since
/// the server has already validated them.
pub fn initial_position(initial_fen: &str, mode: CastlingMode) -> Result<Chess, BoardError> {
    let initial_fen = initial_fen.trim();
    if initial_fen.is_empty() || initial_fen == STARTPOS {
        return Ok(Chess::default());
    }
    let fen: Fen = initial_fen
        .parse()
        .map_err(|e| BoardError::InvalidPosition(format!("{initial_fen}: {e}")))?;
    fen.into_position::<Chess>(mode)
        .or_else(PositionError::ignore_too_much_material)
        .map_err(|e| BoardError::InvalidPosition(format!("{initial_fen}: {e}")))
}

/// Play one UCI move. `ply` is the move's 1-based number in the game.
pub fn apply_uci(position: &mut Chess, ply: usize, uci: &str) -> Result<Move, BoardError> {
    let illegal = || BoardError::IllegalMove {
        index: ply,
        uci: uci.to_string(),
    };
    let parsed: Uci = uci.parse().map_err(|_| illegal())?;
    let m = parsed.to_move(position).map_err(|_| illegal())?;
    position.play_unchecked(&m);
    Ok(m)
}

/// Replay `moves` from `initial_fen`. Fails on the first illegal move.
pub fn replay(initial_fen: &str, mode: CastlingMode, moves: &[&str]) -> Result<Chess, BoardError> {
    let mut position = initial_position(initial_fen, mode)?;
    for (i, uci) in moves.iter().enumerate() {
        apply_uci(&mut position, i + 1, uci)?;
    }
    Ok(position)
}

pub fn fen_of(position: &Chess) -> String {
    Fen::from_position(position.clone(), EnPassantMode::Legal).to_string()
}

pub fn to_uci(m: &Move, mode: CastlingMode) -> String {
    Uci::from_move(m, mode).to_string()
}

pub fn side_to_move(position: &Chess) -> Color {
    match position.turn() {
        shakmaty::Color::White => Color::White,
        shakmaty::Color::Black => Color::Black,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startpos_and_empty_are_the_initial_position() {
        let a = initial_position("startpos", CastlingMode::Standard).unwrap();
        let b = initial_position("", CastlingMode::Standard).unwrap();
        assert_eq!(fen_of(&a), fen_of(&b));
        assert_eq!(
            fen_of(&a),
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"
        );
    }

    #[test]
    fn replay_from_fen() {
        let fen = "4k3/8/8/8/8/8/4P3/4K3 w - - 0 1";
        let position = replay(fen, CastlingMode::Standard, &["e2e4", "e8d7"]).unwrap();
        assert_eq!(fen_of(&position), "8/3k4/8/8/4P3/8/8/4K3 w - - 1 2");
        assert_eq!(side_to_move(&position), Color::White);
    }

    #[test]
    fn illegal_move_reports_its_number() {
        let err = replay("startpos", CastlingMode::Standard, &["e2e4", "e2e4"]).unwrap_err();
        match err {
            BoardError::IllegalMove { index, uci } => {
                assert_eq!(index, 2);
                assert_eq!(uci, "e2e4");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(replay("startpos", CastlingMode::Standard, &["zz99"]).is_err());
        assert!(matches!(
            initial_position("not a fen", CastlingMode::Standard),
            Err(BoardError::InvalidPosition(_))
        ));
    }

    #[test]
    fn castling_is_written_king_to_destination_in_standard_mode() {
        let mut position = replay(
            "startpos",
            CastlingMode::Standard,
            &["e2e4", "e7e5", "g1f3", "b8c6", "f1c4", "g8f6"],
        )
        .unwrap();
        let m = apply_uci(&mut position, 7, "e1g1").unwrap();
        assert!(m.is_castle());
        assert_eq!(to_uci(&m, CastlingMode::Standard), "e1g1");
    }

    #[test]
    fn unsupported_variants_are_rejected() {
        assert!(castling_mode(VariantKey::Standard).is_ok());
        assert!(castling_mode(VariantKey::Chess960).is_ok());
        assert!(castling_mode(VariantKey::FromPosition).is_ok());
        assert!(castling_mode(VariantKey::Crazyhouse).is_err());
    }
}
