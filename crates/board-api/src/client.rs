//! REST and streaming client for the Lichess board API.
//!
//! Every authenticated call reads the bearer token from the shared
//! [`SessionStore`] and fails with `AuthenticationRequired` before touching
//! the network when there is none. Non-2xx responses become
//! `RemoteRequestFailed` carrying the status and the classified body.

use std::sync::Arc;

use board_protocol::{
    ActiveGame, BoardError, BotGameOptions, ChallengeGame, Endpoints, MoveAck, NowPlaying,
    RemoteErrorBody, TokenRequest, TokenResponse, UserInfo,
};
use board_transport::{EventHandler, StreamHandle, StreamReader};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::ApiConfig;
use crate::session::SessionStore;

/// Thin typed wrapper over `reqwest`.
#[derive(Debug, Clone)]
pub struct LichessClient {
    config: ApiConfig,
    http: reqwest::Client,
    session: Arc<SessionStore>,
}

impl LichessClient {
    pub fn new(config: ApiConfig, session: Arc<SessionStore>) -> Result<Self, BoardError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| BoardError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            http,
            session,
        })
    }

    /// Use a preconfigured `reqwest::Client` (proxies, custom TLS roots).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    // ── OAuth ───────────────────────────────────────────────────────────

    /// Trade an authorization code for an access token.
    ///
    /// Does not touch the session; [`crate::AuthFlow::complete`] stores the result.
    pub async fn exchange_token(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, BoardError> {
        const OP: &str = "exchange_token";
        let url = self.config.endpoint(Endpoints::OAUTH_TOKEN)?;
        let form = TokenRequest::authorization_code(code, client_id, redirect_uri, code_verifier);

        let response = self
            .http
            .post(url)
            .form(&form)
            .send()
            .await
            .map_err(|e| network(OP, e))?;
        let response = ensure_success(response, OP).await?;
        let token: TokenResponse = decode(response, OP).await?;
        debug!(
            "Token exchange succeeded (type={:?}, expires_in={:?})",
            token.token_type, token.expires_in
        );
        Ok(token)
    }

    // ── Account ─────────────────────────────────────────────────────────

    pub async fn fetch_user_info(&self) -> Result<UserInfo, BoardError> {
        const OP: &str = "fetch_user_info";
        let response = self.get(OP, Endpoints::ACCOUNT).await?;
        decode(response, OP).await
    }

    /// Profile behind a token that is not in the session yet.
    pub async fn fetch_user_info_with(&self, token: &str) -> Result<UserInfo, BoardError> {
        const OP: &str = "fetch_user_info";
        let response = self.get_with_token(OP, Endpoints::ACCOUNT, token).await?;
        decode(response, OP).await
    }

    /// Games in progress. Entries the server sent without a `gameId` get
    /// the id `"unknown"`.
    pub async fn fetch_active_games(&self) -> Result<Vec<ActiveGame>, BoardError> {
        const OP: &str = "fetch_active_games";
        let response = self.get(OP, Endpoints::ACCOUNT_PLAYING).await?;
        let playing: NowPlaying = decode(response, OP).await?;

        let mut games = playing.now_playing;
        for game in &mut games {
            if !game.normalize_id() {
                warn!("Active game listed without an id: {game:?}");
            }
        }
        debug!("{} active game(s)", games.len());
        Ok(games)
    }

    // ── Board ───────────────────────────────────────────────────────────

    /// Play `uci` in `game_id`.
    pub async fn submit_move(&self, game_id: &str, uci: &str) -> Result<MoveAck, BoardError> {
        const OP: &str = "submit_move";
        let token = self.session.bearer(OP)?;
        check_segment("game id", game_id)?;
        check_segment("move", uci)?;

        info!("Submitting move {uci} in game {game_id}");
        let url = self.config.endpoint(&Endpoints::board_move(game_id, uci))?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| network(OP, e))?;
        let response = ensure_success(response, OP).await?;
        decode(response, OP).await
    }

    /// Challenge the Lichess AI. The game then shows up in the active games list.
    pub async fn start_bot_game(&self, options: &BotGameOptions) -> Result<ChallengeGame, BoardError> {
        const OP: &str = "start_bot_game";
        let token = self.session.bearer(OP)?;
        options.validate()?;

        let url = self.config.endpoint(Endpoints::CHALLENGE_AI)?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token.expose_secret())
            .form(options)
            .send()
            .await
            .map_err(|e| network(OP, e))?;
        let response = ensure_success(response, OP).await?;
        let game: ChallengeGame = decode(response, OP).await?;
        info!("Started game {} against AI level {}", game.id, options.level);
        Ok(game)
    }

    /// Open the game's event stream and start feeding `handler`.
    ///
    /// Returns once the response headers arrived. Failures after that point
    /// reach the handler's `on_end`.
    pub async fn open_game_stream<H: EventHandler>(
        &self,
        game_id: &str,
        handler: H,
    ) -> Result<StreamHandle, BoardError> {
        const OP: &str = "open_game_stream";
        let token = self.session.bearer(OP)?;
        check_segment("game id", game_id)?;

        let url = self.config.endpoint(&Endpoints::board_stream(game_id))?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| BoardError::stream(format!("failed to connect: {e}")))?;
        let response = ensure_success(response, OP).await?;

        info!("Streaming game {game_id}");
        let reader = StreamReader::new(format!("game/{game_id}"), handler, self.config.stream.clone());
        Ok(reader.spawn(response.bytes_stream()))
    }

    async fn get(&self, operation: &'static str, path: &str) -> Result<reqwest::Response, BoardError> {
        let token = self.session.bearer(operation)?;
        self.get_with_token(operation, path, token.expose_secret()).await
    }

    async fn get_with_token(
        &self,
        operation: &'static str,
        path: &str,
        token: &str,
    ) -> Result<reqwest::Response, BoardError> {
        let url = self.config.endpoint(path)?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| network(operation, e))?;
        ensure_success(response, operation).await
    }
}

fn network(operation: &'static str, e: reqwest::Error) -> BoardError {
    BoardError::Network {
        operation,
        message: e.to_string(),
    }
}

/// Path segments are interpolated into the URL, so only plain ids are allowed.
fn check_segment(what: &str, value: &str) -> Result<(), BoardError> {
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(BoardError::Config(format!("invalid {what}: {value:?}")));
    }
    Ok(())
}

async fn ensure_success(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, BoardError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let body = RemoteErrorBody::from_text(&text);
    warn!("{operation} failed with HTTP {status}: {body}");
    Err(BoardError::RemoteRequestFailed {
        operation,
        status,
        body,
    })
}

async fn decode<T: DeserializeOwned>(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<T, BoardError> {
    let status = response.status().as_u16();
    let text = response.text().await.map_err(|e| network(operation, e))?;
    serde_json::from_str(&text).map_err(|e| {
        warn!("{operation}: unexpected response body: {e}");
        BoardError::RemoteRequestFailed {
            operation,
            status,
            body: RemoteErrorBody::from_text(&text),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_segments_must_be_plain() {
        assert!(check_segment("game id", "abcd1234").is_ok());
        assert!(check_segment("move", "e7e8q").is_ok());
        assert!(check_segment("game id", "").is_err());
        assert!(check_segment("game id", "../account").is_err());
        assert!(check_segment("move", "e2 e4").is_err());
    }

    #[tokio::test]
    async fn authenticated_calls_fail_fast_without_token() {
        // Unroutable host: any request would fail with Network, not AuthenticationRequired.
        let config = ApiConfig::new("http://127.0.0.1:1".parse().unwrap());
        let client = LichessClient::new(config, Arc::new(SessionStore::new())).unwrap();

        let err = client.fetch_user_info().await.unwrap_err();
        assert!(matches!(
            err,
            BoardError::AuthenticationRequired { operation: "fetch_user_info" }
        ));
        let err = client.submit_move("abcd1234", "e2e4").await.unwrap_err();
        assert!(matches!(err, BoardError::AuthenticationRequired { .. }));
        let err = client
            .start_bot_game(&BotGameOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::AuthenticationRequired { .. }));
    }
}
