//! OAuth2 authorization-code flow with PKCE.
//!
//! Flow:
//!   1. [`AuthFlow::begin`] stores one pending attempt and returns the URL
//!   2. The user approves in a browser and gets redirected with `code` + `state`
//!   3. [`AuthFlow::complete`] consumes the attempt, exchanges the code,
//!      stores the token and loads the profile
//!
//! Starting a new login replaces any earlier pending attempt.

use board_protocol::{BoardError, UserInfo};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::client::LichessClient;
use crate::config::OAuthConfig;
use crate::pkce;
use crate::session::SessionStore;

/// The single in-flight login attempt.
#[derive(Debug, Clone)]
pub struct PendingAuth {
    pub code_verifier: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
}

impl PendingAuth {
    fn is_expired(&self, ttl: std::time::Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now - self.created_at > ttl,
            Err(_) => false,
        }
    }
}

/// What to send the user to.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: Url,
    pub state: String,
}

/// Query parameters of the redirect back from the authorization page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    pub fn from_url(url: &Url) -> Self {
        Self::from_pairs(url.query_pairs())
    }

    /// Accepts a full redirect URL or a bare query string (with or without `?`).
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if let Ok(url) = Url::parse(input) {
            return Self::from_url(&url);
        }
        let query = input.rsplit_once('?').map_or(input, |(_, q)| q);
        Self::from_pairs(url::form_urlencoded::parse(query.as_bytes()))
    }

    fn from_pairs<'a>(
        pairs: impl Iterator<Item = (std::borrow::Cow<'a, str>, std::borrow::Cow<'a, str>)>,
    ) -> Self {
        let mut params = Self::default();
        for (key, value) in pairs {
            let value = Some(value.into_owned());
            match key.as_ref() {
                "code" => params.code = value,
                "state" => params.state = value,
                "error" => params.error = value,
                "error_description" => params.error_description = value,
                _ => {}
            }
        }
        params
    }
}

/// Holds the pending attempt and drives both legs of the flow.
#[derive(Debug)]
pub struct AuthFlow {
    config: OAuthConfig,
    host: Url,
    pending: Mutex<Option<PendingAuth>>,
}

impl AuthFlow {
    pub fn new(config: OAuthConfig, host: Url) -> Self {
        Self {
            config,
            host,
            pending: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Create a fresh attempt and the URL to authorize it. No network access.
    pub fn begin(&self) -> Result<AuthorizationRequest, BoardError> {
        let code_verifier = pkce::generate_code_verifier()?;
        let state = pkce::generate_state()?;
        let challenge = pkce::code_challenge(&code_verifier);

        let mut url = pkce::build_authorization_url(
            &self.host,
            self.config.client_id(),
            self.config.redirect_uri().as_str(),
            self.config.scope(),
            &challenge,
        )?;
        url.query_pairs_mut().append_pair("state", &state);

        let replaced = self.pending.lock().replace(PendingAuth {
            code_verifier,
            state: state.clone(),
            created_at: Utc::now(),
        });
        if replaced.is_some() {
            debug!("Replaced an earlier pending login");
        }
        info!("Login started; waiting for authorization callback");
        Ok(AuthorizationRequest { url, state })
    }

    pub fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Drop the pending attempt, if any.
    pub fn abandon(&self) {
        if self.pending.lock().take().is_some() {
            debug!("Pending login abandoned");
        }
    }

    /// Clear the pending attempt and the session.
    pub fn logout(&self, session: &SessionStore) -> Result<(), BoardError> {
        self.abandon();
        session.logout()
    }

    /// Consume the pending attempt and validate the callback against it.
    ///
    /// The attempt is gone after this call whatever the outcome, so a
    /// replayed callback gets `NoPendingAuth`.
    pub fn take_pending(&self, callback: &CallbackParams) -> Result<(PendingAuth, String), BoardError> {
        let pending = self.pending.lock().take().ok_or(BoardError::NoPendingAuth)?;

        if let Some(error) = &callback.error {
            let detail = match &callback.error_description {
                Some(description) => format!("{error}: {description}"),
                None => error.clone(),
            };
            warn!("Authorization denied: {detail}");
            return Err(BoardError::AuthorizationDenied(detail));
        }
        if callback.state.as_deref() != Some(pending.state.as_str()) {
            warn!("Authorization callback state does not match the pending login");
            return Err(BoardError::AuthStateMismatch);
        }
        if pending.is_expired(self.config.pending_ttl(), Utc::now()) {
            warn!("Pending login expired before the callback arrived");
            return Err(BoardError::NoPendingAuth);
        }
        let code = callback
            .code
            .clone()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| BoardError::AuthorizationDenied("callback carried no code".into()))?;
        Ok((pending, code))
    }

    /// Finish the login: exchange the code, load the profile with the new
    /// token, then store both. Nothing is stored if either request fails.
    pub async fn complete(
        &self,
        client: &LichessClient,
        callback: &CallbackParams,
    ) -> Result<UserInfo, BoardError> {
        let (pending, code) = self.take_pending(callback)?;
        let token = client
            .exchange_token(
                &code,
                self.config.client_id(),
                self.config.redirect_uri().as_str(),
                &pending.code_verifier,
            )
            .await?;

        let user = client.fetch_user_info_with(&token.access_token).await?;
        let session = client.session();
        session.set_token(token.access_token)?;
        session.set_user(user.clone());
        info!("Logged in as {}", user.username);
        Ok(user)
    }
}
