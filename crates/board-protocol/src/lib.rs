//! Lichess board API protocol types
//!
//! Wire types for the OAuth2 PKCE exchange, the account and board REST calls,
//! and the newline-delimited game stream. This crate is the single source of
//! truth for endpoint paths, event kinds, and the error taxonomy.

pub mod account;
pub mod auth;
pub mod board;
pub mod endpoints;
pub mod error;
pub mod events;

pub use account::{ActiveGame, NowPlaying, UNKNOWN_GAME_ID, UserInfo};
pub use auth::{TokenRequest, TokenResponse};
pub use board::{BotColor, BotGameOptions, ChallengeGame, MoveAck};
pub use endpoints::{DEFAULT_HOST, DEFAULT_SCOPE, Endpoints};
pub use error::{BoardError, BoardErrorCode, RemoteErrorBody};
pub use events::{
    ByColor, ChatLine, ChatRoom, Color, EventKinds, GameEvent, GameFull, GamePlayer,
    GameStateEvent, GameStatus, OpponentGone, STARTPOS, VariantKey,
};
