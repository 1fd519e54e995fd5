//! OAuth2 PKCE token exchange payloads.
//!
//! Protocol flow:
//!   1. Client redirects the user to `{host}/oauth` with a S256 code challenge
//!   2. The server redirects back with `?code=...&state=...`
//!   3. Client posts the code and the original verifier to `{host}/api/token`
//!   4. The server answers with a bearer token

use serde::{Deserialize, Serialize};

/// Grant type sent with every token exchange.
pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";

/// Challenge method advertised in the authorization URL.
pub const CHALLENGE_METHOD_S256: &str = "S256";

/// Form body of `POST /api/token`.
#[derive(Debug, Clone, Serialize)]
pub struct TokenRequest<'a> {
    pub grant_type: &'a str,
    pub code: &'a str,
    pub redirect_uri: &'a str,
    pub client_id: &'a str,
    pub code_verifier: &'a str,
}

impl<'a> TokenRequest<'a> {
    pub fn authorization_code(
        code: &'a str,
        client_id: &'a str,
        redirect_uri: &'a str,
        code_verifier: &'a str,
    ) -> Self {
        Self {
            grant_type: GRANT_AUTHORIZATION_CODE,
            code,
            redirect_uri,
            client_id,
            code_verifier,
        }
    }
}

/// Successful `POST /api/token` response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Seconds until the token expires.
    #[serde(default)]
    pub expires_in: Option<u64>,
}
