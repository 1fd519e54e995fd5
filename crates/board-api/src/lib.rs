//! Lichess board API client
//!
//! Everything that talks to the server or holds credentials:
//! - `pkce`: verifier/challenge generation and the authorization URL
//! - `auth_flow`: the single pending login attempt and its completion
//! - `session`: the current token and user, with a pluggable token store
//! - `client`: typed REST calls and game stream opening

pub mod auth_flow;
pub mod client;
pub mod config;
pub mod pkce;
pub mod session;

pub use auth_flow::{AuthFlow, AuthorizationRequest, CallbackParams, PendingAuth};
pub use client::LichessClient;
pub use config::{ApiConfig, OAuthConfig};
pub use session::{FileTokenStore, MemoryTokenStore, SessionStore, TokenStore};
