//! Error taxonomy shared by every layer of the board client.
//!
//! Transport- and parse-level errors are contained where they happen (logged
//! and skipped). Authentication and request failures propagate to callers.

use serde_json::Value;

/// Stable identifier for each [`BoardError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoardErrorCode {
    AuthenticationRequired,
    RemoteRequestFailed,
    Network,
    StreamTransport,
    MalformedEventLine,
    UnknownEventKind,
    InvalidPromotionSelection,
    InvalidColor,
    InvalidPosition,
    IllegalMove,
    NotYourTurn,
    GameNotStarted,
    NoPendingAuth,
    AuthStateMismatch,
    AuthorizationDenied,
    Config,
    TokenStore,
}

impl BoardErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationRequired => "authentication_required",
            Self::RemoteRequestFailed => "remote_request_failed",
            Self::Network => "network",
            Self::StreamTransport => "stream_transport",
            Self::MalformedEventLine => "malformed_event_line",
            Self::UnknownEventKind => "unknown_event_kind",
            Self::InvalidPromotionSelection => "invalid_promotion_selection",
            Self::InvalidColor => "invalid_color",
            Self::InvalidPosition => "invalid_position",
            Self::IllegalMove => "illegal_move",
            Self::NotYourTurn => "not_your_turn",
            Self::GameNotStarted => "game_not_started",
            Self::NoPendingAuth => "no_pending_auth",
            Self::AuthStateMismatch => "auth_state_mismatch",
            Self::AuthorizationDenied => "authorization_denied",
            Self::Config => "config",
            Self::TokenStore => "token_store",
        }
    }
}

/// Body of a non-success HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteErrorBody {
    /// The server answered with a JSON document (usually `{"error": "..."}`).
    Structured(Value),
    /// The body was not JSON.
    Raw(String),
    Empty,
}

impl RemoteErrorBody {
    /// Classify a response body: JSON when it parses, raw text otherwise.
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => Self::Structured(value),
            Err(_) => Self::Raw(trimmed.to_string()),
        }
    }

    /// Human-readable message carried by the body, if any.
    ///
    /// Lichess reports failures as `{"error": "..."}`; the OAuth endpoints use
    /// `error_description` alongside `error`.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Structured(value) => value
                .get("error_description")
                .and_then(Value::as_str)
                .or_else(|| value.get("error").and_then(Value::as_str)),
            Self::Raw(text) => Some(text),
            Self::Empty => None,
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Structured(_))
    }
}

impl std::fmt::Display for RemoteErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Structured(value) => write!(f, "{value}"),
            Self::Raw(text) => f.write_str(text),
            Self::Empty => f.write_str("<empty body>"),
        }
    }
}

/// Every failure the board client can report.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BoardError {
    #[error("not authenticated: log in before calling {operation}")]
    AuthenticationRequired { operation: &'static str },

    #[error("{operation} failed with HTTP {status}: {body}")]
    RemoteRequestFailed {
        operation: &'static str,
        status: u16,
        body: RemoteErrorBody,
    },

    #[error("{operation} could not reach the server: {message}")]
    Network {
        operation: &'static str,
        message: String,
    },

    #[error("stream transport error: {message}")]
    StreamTransport { message: String },

    #[error("malformed event line ({reason}): {line}")]
    MalformedEventLine { line: String, reason: String },

    #[error("unknown event kind: {kind}")]
    UnknownEventKind { kind: String },

    #[error("invalid promotion piece: {piece} (expected queen, rook, bishop or knight)")]
    InvalidPromotionSelection { piece: String },

    #[error("invalid color: {0}")]
    InvalidColor(String),

    #[error("invalid position: {0}")]
    InvalidPosition(String),

    #[error("illegal move #{index}: {uci}")]
    IllegalMove { index: usize, uci: String },

    #[error("it is not your turn")]
    NotYourTurn,

    #[error("no game snapshot received yet")]
    GameNotStarted,

    #[error("no login in progress")]
    NoPendingAuth,

    #[error("authorization callback state does not match the pending login")]
    AuthStateMismatch,

    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("token store error: {0}")]
    TokenStore(String),
}

impl BoardError {
    pub fn code(&self) -> BoardErrorCode {
        match self {
            Self::AuthenticationRequired { .. } => BoardErrorCode::AuthenticationRequired,
            Self::RemoteRequestFailed { .. } => BoardErrorCode::RemoteRequestFailed,
            Self::Network { .. } => BoardErrorCode::Network,
            Self::StreamTransport { .. } => BoardErrorCode::StreamTransport,
            Self::MalformedEventLine { .. } => BoardErrorCode::MalformedEventLine,
            Self::UnknownEventKind { .. } => BoardErrorCode::UnknownEventKind,
            Self::InvalidPromotionSelection { .. } => BoardErrorCode::InvalidPromotionSelection,
            Self::InvalidColor(_) => BoardErrorCode::InvalidColor,
            Self::InvalidPosition(_) => BoardErrorCode::InvalidPosition,
            Self::IllegalMove { .. } => BoardErrorCode::IllegalMove,
            Self::NotYourTurn => BoardErrorCode::NotYourTurn,
            Self::GameNotStarted => BoardErrorCode::GameNotStarted,
            Self::NoPendingAuth => BoardErrorCode::NoPendingAuth,
            Self::AuthStateMismatch => BoardErrorCode::AuthStateMismatch,
            Self::AuthorizationDenied(_) => BoardErrorCode::AuthorizationDenied,
            Self::Config(_) => BoardErrorCode::Config,
            Self::TokenStore(_) => BoardErrorCode::TokenStore,
        }
    }

    pub fn stream(message: impl Into<String>) -> Self {
        Self::StreamTransport {
            message: message.into(),
        }
    }

    pub fn malformed_line(line: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::MalformedEventLine {
            line: line.into(),
            reason: reason.to_string(),
        }
    }

    /// HTTP status carried by a remote failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RemoteRequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Errors the caller should answer by sending the user back to login.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationRequired { .. } | Self::RemoteRequestFailed { status: 401, .. }
        )
    }
}
