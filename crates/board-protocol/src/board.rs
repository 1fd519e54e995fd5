//! Board API request and response bodies (moves, AI challenges).

use serde::{Deserialize, Serialize};

use crate::error::BoardError;
use crate::events::{Color, Variant};

/// `POST /api/board/game/{id}/move/{uci}` success body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveAck {
    #[serde(default)]
    pub ok: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotColor {
    White,
    Black,
    #[default]
    Random,
}

/// Form body of `POST /api/challenge/ai`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotGameOptions {
    /// Engine strength, 1 to 8.
    pub level: u8,
    pub color: BotColor,
    /// Initial clock in seconds.
    #[serde(rename = "clock.limit")]
    pub clock_limit: u32,
    /// Increment per move in seconds.
    #[serde(rename = "clock.increment")]
    pub clock_increment: u32,
}

impl Default for BotGameOptions {
    fn default() -> Self {
        Self {
            level: 3,
            color: BotColor::Random,
            clock_limit: 300,
            clock_increment: 0,
        }
    }
}

impl BotGameOptions {
    pub fn validate(&self) -> Result<(), BoardError> {
        if !(1..=8).contains(&self.level) {
            return Err(BoardError::Config(format!(
                "AI level must be between 1 and 8, got {}",
                self.level
            )));
        }
        if self.clock_increment > 180 {
            return Err(BoardError::Config(format!(
                "clock increment must be at most 180s, got {}",
                self.clock_increment
            )));
        }
        Ok(())
    }
}

/// Game created by an AI challenge.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeGame {
    pub id: String,
    #[serde(default)]
    pub rated: bool,
    #[serde(default)]
    pub variant: Option<Variant>,
    #[serde(default)]
    pub speed: Option<String>,
    #[serde(default)]
    pub fen: Option<String>,
    /// Side to move.
    #[serde(default)]
    pub player: Option<Color>,
    #[serde(default)]
    pub turns: u32,
    #[serde(default)]
    pub source: Option<String>,
}
