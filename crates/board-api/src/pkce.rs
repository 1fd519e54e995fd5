//! PKCE (RFC 7636) helpers. No network access.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use board_protocol::auth::CHALLENGE_METHOD_S256;
use board_protocol::{BoardError, Endpoints};
use rand::TryRngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::join_endpoint;

/// Fill a buffer from the operating system's secure random source.
fn secure_random<const N: usize>() -> Result<[u8; N], BoardError> {
    let mut bytes = [0u8; N];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| BoardError::Config(format!("secure random source unavailable: {e}")))?;
    Ok(bytes)
}

/// Generates a cryptographically random code verifier.
///
/// Returns a 64-character URL-safe string (RFC 7636 allows 43-128).
pub fn generate_code_verifier() -> Result<String, BoardError> {
    let bytes: [u8; 48] = secure_random()?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Computes the S256 code challenge from a code verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Generates the `state` value tying a callback to its login attempt.
///
/// Returns a 22-character URL-safe string (16 random bytes).
pub fn generate_state() -> Result<String, BoardError> {
    let bytes: [u8; 16] = secure_random()?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Authorization request URL. Deterministic given its inputs.
pub fn build_authorization_url(
    host: &Url,
    client_id: &str,
    redirect_uri: &str,
    scope: &str,
    challenge: &str,
) -> Result<Url, BoardError> {
    let mut url = join_endpoint(host, Endpoints::OAUTH_AUTHORIZE)?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", scope)
        .append_pair("code_challenge", challenge)
        .append_pair("code_challenge_method", CHALLENGE_METHOD_S256);
    Ok(url)
}
