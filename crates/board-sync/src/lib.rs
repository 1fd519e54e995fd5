//! Lichess board synchronization
//!
//! Turns the event stream of one remote game into a local chess position:
//! - `game`: the reconciler, its transitions, and the stream handler
//! - `replay`: building positions from FENs and UCI move lists
//! - `promotion`: the promotion piece selection

pub mod game;
pub mod promotion;
pub mod replay;

pub use game::{
    GameStreamHandler, GameUpdate, LichessGame, SharedGame, StreamEndHook, SyncState,
    TrackedGame, Transition, TransitionKind, UpdateHook, close_stream,
};
pub use promotion::{PromotionChoice, PromotionPiece};
