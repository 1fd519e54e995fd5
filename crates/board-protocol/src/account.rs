//! Account payloads: user profile and the list of games in progress.

use serde::{Deserialize, Serialize};

use crate::events::{Color, Variant};

/// Id given to an in-progress game the server listed without a `gameId`.
pub const UNKNOWN_GAME_ID: &str = "unknown";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// `GET /api/account`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
}

impl UserInfo {
    pub fn country(&self) -> Option<&str> {
        self.profile.as_ref()?.country.as_deref()
    }

    /// Username with the title prefix, e.g. `GM Magnus`.
    pub fn display_name(&self) -> String {
        match &self.title {
            Some(title) => format!("{title} {}", self.username),
            None => self.username.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Opponent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai: Option<u8>,
}

/// One entry of `nowPlaying`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveGame {
    /// Always non-empty once listed by the API client.
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fen: Option<String>,
    #[serde(default)]
    pub has_moved: bool,
    #[serde(default)]
    pub is_my_turn: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_move: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponent: Option<Opponent>,
    #[serde(default)]
    pub rated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds_left: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<Variant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ActiveGame {
    /// Fill `id` from `gameId`, falling back to [`UNKNOWN_GAME_ID`].
    ///
    /// Returns `false` when the sentinel had to be used.
    pub fn normalize_id(&mut self) -> bool {
        match self.game_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => {
                self.id = id.to_string();
                true
            }
            None if !self.id.is_empty() => true,
            None => {
                self.id = UNKNOWN_GAME_ID.to_string();
                false
            }
        }
    }

    pub fn has_known_id(&self) -> bool {
        self.id != UNKNOWN_GAME_ID && !self.id.is_empty()
    }
}

/// `GET /api/account/playing`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlaying {
    #[serde(default)]
    pub now_playing: Vec<ActiveGame>,
}
