//! Client and OAuth configuration.

use std::time::Duration;

use board_protocol::{BoardError, DEFAULT_HOST, DEFAULT_SCOPE};
use board_transport::ReaderConfig;
use url::Url;

/// Where and how to reach the server.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server root, e.g. `https://lichess.org`.
    pub host: Url,
    pub user_agent: String,
    /// Applies to establishing connections only; streams stay open indefinitely.
    pub connect_timeout: Duration,
    /// Game stream reader settings.
    pub stream: ReaderConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.parse().expect("valid default URL"),
            user_agent: concat!("lichess-board/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout: Duration::from_secs(10),
            stream: ReaderConfig::default(),
        }
    }
}

impl ApiConfig {
    pub fn new(host: Url) -> Self {
        Self {
            host,
            ..Default::default()
        }
    }

    pub fn with_stream_config(mut self, stream: ReaderConfig) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Absolute URL for an endpoint path.
    pub fn endpoint(&self, path: &str) -> Result<Url, BoardError> {
        join_endpoint(&self.host, path)
    }
}

/// Resolve an endpoint path under `host`, keeping any path prefix the host
/// carries (`https://proxy.example/lichess` + `/api/account` lands on
/// `/lichess/api/account`).
pub fn join_endpoint(host: &Url, path: &str) -> Result<Url, BoardError> {
    let mut base = host.clone();
    if !base.path().ends_with('/') {
        let prefixed = format!("{}/", base.path());
        base.set_path(&prefixed);
    }
    base.join(path.trim_start_matches('/'))
        .map_err(|e| BoardError::Config(format!("invalid endpoint {path} under {host}: {e}")))
}

/// OAuth2 PKCE client registration.
///
/// Lichess does not require registering a client; any stable `client_id`
/// works as long as the redirect URI matches between both legs of the flow.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    client_id: String,
    redirect_uri: Url,
    scope: String,
    pending_ttl: Duration,
}

impl OAuthConfig {
    pub fn new(client_id: impl Into<String>, redirect_uri: Url) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri,
            scope: DEFAULT_SCOPE.to_string(),
            pending_ttl: Duration::from_secs(10 * 60),
        }
    }

    /// Override the requested scope (default: `board:play`).
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// How long a started login stays valid.
    pub fn with_pending_ttl(mut self, ttl: Duration) -> Self {
        self.pending_ttl = ttl;
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn pending_ttl(&self) -> Duration {
        self.pending_ttl
    }
}
