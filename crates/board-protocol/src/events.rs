//! Board game stream events.
//!
//! `GET /api/board/game/stream/{id}` emits one JSON object per line, tagged by
//! `type`. The first line is always a `gameFull` snapshot; later lines are
//! `gameState` updates, chat lines and opponent presence changes.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::BoardError;

/// Wire values of the `type` discriminator.
pub struct EventKinds;

impl EventKinds {
    pub const GAME_FULL: &str = "gameFull";
    pub const GAME_STATE: &str = "gameState";
    pub const CHAT_LINE: &str = "chatLine";
    pub const OPPONENT_GONE: &str = "opponentGone";
}

/// `initialFen` value meaning the standard starting position.
pub const STARTPOS: &str = "startpos";

// ─────────────────────────────────────────────────────────────────────────────
// Colors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opposite(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Black => "black",
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Color {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "white" => Ok(Self::White),
            "black" => Ok(Self::Black),
            other => Err(BoardError::InvalidColor(other.to_string())),
        }
    }
}

/// A value held once per side (draw offers, takeback proposals).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByColor<T> {
    pub white: T,
    pub black: T,
}

impl<T: Copy> ByColor<T> {
    pub fn get(&self, color: Color) -> T {
        match color {
            Color::White => self.white,
            Color::Black => self.black,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Game metadata
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GameStatus {
    Created,
    Started,
    Aborted,
    Mate,
    Resign,
    Stalemate,
    Timeout,
    Draw,
    Outoftime,
    Cheat,
    NoStart,
    UnknownFinish,
    VariantEnd,
    /// A status this client does not know yet.
    #[serde(other)]
    Unknown,
}

impl GameStatus {
    /// Whether the game is over. Unrecognised statuses count as ongoing.
    pub fn is_finished(self) -> bool {
        !matches!(self, Self::Created | Self::Started | Self::Unknown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Speed {
    UltraBullet,
    Bullet,
    Blitz,
    Rapid,
    Classical,
    Correspondence,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VariantKey {
    #[default]
    Standard,
    Chess960,
    Crazyhouse,
    Antichess,
    Atomic,
    Horde,
    KingOfTheHill,
    RacingKings,
    ThreeCheck,
    FromPosition,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    #[serde(default)]
    pub key: VariantKey,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Perf {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GamePlayer {
    /// Empty for AI opponents.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisional: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_level: Option<u8>,
}

impl GamePlayer {
    pub fn is_ai(&self) -> bool {
        self.ai_level.is_some()
    }
}

/// Clock settings in milliseconds. Absent for correspondence games.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clock {
    pub initial: u64,
    pub increment: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Incremental game state (`type: "gameState"`), also embedded in `gameFull`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStateEvent {
    /// All moves so far in UCI, space separated.
    #[serde(default)]
    pub moves: String,
    #[serde(default)]
    pub wtime: u64,
    #[serde(default)]
    pub btime: u64,
    #[serde(default)]
    pub winc: u64,
    #[serde(default)]
    pub binc: u64,
    pub status: GameStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Color>,
    #[serde(default)]
    pub wdraw: bool,
    #[serde(default)]
    pub bdraw: bool,
    #[serde(default)]
    pub wtakeback: bool,
    #[serde(default)]
    pub btakeback: bool,
}

impl GameStateEvent {
    pub fn move_list(&self) -> Vec<&str> {
        self.moves.split_whitespace().collect()
    }

    pub fn move_count(&self) -> usize {
        self.moves.split_whitespace().count()
    }

    pub fn last_move(&self) -> Option<&str> {
        self.moves.split_whitespace().last()
    }

    /// Remaining clock in milliseconds.
    pub fn time_ms(&self, color: Color) -> u64 {
        match color {
            Color::White => self.wtime,
            Color::Black => self.btime,
        }
    }

    pub fn increment_ms(&self, color: Color) -> u64 {
        match color {
            Color::White => self.winc,
            Color::Black => self.binc,
        }
    }

    pub fn draw_offers(&self) -> ByColor<bool> {
        ByColor {
            white: self.wdraw,
            black: self.bdraw,
        }
    }

    pub fn takeback_proposals(&self) -> ByColor<bool> {
        ByColor {
            white: self.wtakeback,
            black: self.btakeback,
        }
    }
}

/// Initial snapshot (`type: "gameFull"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameFull {
    pub id: String,
    #[serde(default)]
    pub variant: Variant,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<Speed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perf: Option<Perf>,
    #[serde(default)]
    pub rated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
    pub white: GamePlayer,
    pub black: GamePlayer,
    #[serde(default = "startpos")]
    pub initial_fen: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock: Option<Clock>,
    pub state: GameStateEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tournament_id: Option<String>,
}

fn startpos() -> String {
    STARTPOS.to_string()
}

impl GameFull {
    pub fn starts_from_startpos(&self) -> bool {
        self.initial_fen == STARTPOS
    }

    /// Color of the given user in this game. Anyone who is not white plays black.
    pub fn color_of(&self, user_id: &str) -> Color {
        if !self.white.id.is_empty() && self.white.id.eq_ignore_ascii_case(user_id) {
            Color::White
        } else {
            Color::Black
        }
    }

    pub fn player(&self, color: Color) -> &GamePlayer {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRoom {
    Player,
    Spectator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatLine {
    pub username: String,
    pub text: String,
    pub room: ChatRoom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpponentGone {
    pub gone: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_win_in_seconds: Option<u64>,
}

/// One line of the board game stream.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    GameFull(Box<GameFull>),
    GameState(GameStateEvent),
    ChatLine(ChatLine),
    OpponentGone(OpponentGone),
    /// A `type` this client does not recognise. Kept instead of failing the line.
    Unknown { kind: String, payload: Value },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum KnownEvent {
    GameFull(Box<GameFull>),
    GameState(GameStateEvent),
    ChatLine(ChatLine),
    OpponentGone(OpponentGone),
}

impl From<KnownEvent> for GameEvent {
    fn from(event: KnownEvent) -> Self {
        match event {
            KnownEvent::GameFull(full) => Self::GameFull(full),
            KnownEvent::GameState(state) => Self::GameState(state),
            KnownEvent::ChatLine(chat) => Self::ChatLine(chat),
            KnownEvent::OpponentGone(gone) => Self::OpponentGone(gone),
        }
    }
}

impl<'de> Deserialize<'de> for GameEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let kind = match value.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            Some(_) => return Err(D::Error::custom("event `type` must be a string")),
            None => return Err(D::Error::missing_field("type")),
        };
        match kind.as_str() {
            EventKinds::GAME_FULL
            | EventKinds::GAME_STATE
            | EventKinds::CHAT_LINE
            | EventKinds::OPPONENT_GONE => KnownEvent::deserialize(value)
                .map(Into::into)
                .map_err(D::Error::custom),
            _ => Ok(Self::Unknown {
                kind,
                payload: value,
            }),
        }
    }
}

impl GameEvent {
    /// Decode a single stream line.
    pub fn from_line(line: &str) -> Result<Self, BoardError> {
        serde_json::from_str(line).map_err(|e| BoardError::malformed_line(line, e))
    }

    /// Wire value of the `type` discriminator.
    pub fn kind(&self) -> &str {
        match self {
            Self::GameFull(_) => EventKinds::GAME_FULL,
            Self::GameState(_) => EventKinds::GAME_STATE,
            Self::ChatLine(_) => EventKinds::CHAT_LINE,
            Self::OpponentGone(_) => EventKinds::OPPONENT_GONE,
            Self::Unknown { kind, .. } => kind,
        }
    }

    /// The game state carried by this event, if it carries one.
    pub fn state(&self) -> Option<&GameStateEvent> {
        match self {
            Self::GameFull(full) => Some(&full.state),
            Self::GameState(state) => Some(state),
            _ => None,
        }
    }
}
