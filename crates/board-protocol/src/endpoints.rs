//! Lichess endpoint paths, relative to the configured host.

/// Default server.
pub const DEFAULT_HOST: &str = "https://lichess.org";

/// Scope required to read board streams and play moves.
pub const DEFAULT_SCOPE: &str = "board:play";

/// All endpoint paths the client talks to.
pub struct Endpoints;

impl Endpoints {
    // ── OAuth ───────────────────────────────────────────────────────────
    pub const OAUTH_AUTHORIZE: &str = "/oauth";
    pub const OAUTH_TOKEN: &str = "/api/token";

    // ── Account ─────────────────────────────────────────────────────────
    pub const ACCOUNT: &str = "/api/account";
    pub const ACCOUNT_PLAYING: &str = "/api/account/playing";

    // ── Challenges ──────────────────────────────────────────────────────
    pub const CHALLENGE_AI: &str = "/api/challenge/ai";

    // ── Board ───────────────────────────────────────────────────────────
    pub fn board_move(game_id: &str, uci: &str) -> String {
        format!("/api/board/game/{game_id}/move/{uci}")
    }

    pub fn board_stream(game_id: &str) -> String {
        format!("/api/board/game/stream/{game_id}")
    }
}
