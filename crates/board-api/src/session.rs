//! Session and token store.
//!
//! Holds at most one access token plus the cached user. Every mutation goes
//! through a single lock, and token changes are written through to the
//! configured [`TokenStore`] before the call returns.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use board_protocol::{BoardError, UserInfo};
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

/// Durable storage for the access token.
pub trait TokenStore: Send + Sync {
    fn load_token(&self) -> Result<Option<String>, BoardError>;
    /// `None` removes the stored token.
    fn save_token(&self, token: Option<&str>) -> Result<(), BoardError>;
}

/// Keeps the token in memory only. Useful for tests and `--no-persist` runs.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load_token(&self) -> Result<Option<String>, BoardError> {
        Ok(self.token.read().clone())
    }

    fn save_token(&self, token: Option<&str>) -> Result<(), BoardError> {
        *self.token.write() = token.map(str::to_string);
        Ok(())
    }
}

/// Single-file token storage, owner-only permissions on unix.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.lichess-board/token`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".lichess-board")
            .join("token")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, action: &str, e: std::io::Error) -> BoardError {
        BoardError::TokenStore(format!("failed to {action} {}: {e}", self.path.display()))
    }
}

impl TokenStore for FileTokenStore {
    fn load_token(&self) -> Result<Option<String>, BoardError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let trimmed = content.trim();
                Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error("read", e)),
        }
    }

    fn save_token(&self, token: Option<&str>) -> Result<(), BoardError> {
        let Some(token) = token else {
            return match std::fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(self.io_error("remove", e)),
            };
        };

        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| self.io_error("create directory for", e))?;
        }
        std::fs::write(&self.path, token).map_err(|e| self.io_error("write", e))?;

        // Restrict file permissions (owner-only read/write)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| self.io_error("restrict permissions on", e))?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct Session {
    access_token: Option<SecretString>,
    user: Option<UserInfo>,
}

/// Process-wide authentication state, shared behind an `Arc`.
pub struct SessionStore {
    state: RwLock<Session>,
    persistence: Option<Arc<dyn TokenStore>>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("SessionStore")
            .field("authenticated", &state.access_token.is_some())
            .field("user", &state.user.as_ref().map(|u| u.id.as_str()))
            .field("persistent", &self.persistence.is_some())
            .finish()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// In-memory only.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(Session::default()),
            persistence: None,
        }
    }

    pub fn with_token_store(store: Arc<dyn TokenStore>) -> Self {
        Self {
            state: RwLock::new(Session::default()),
            persistence: Some(store),
        }
    }

    /// Restore the token from the backing store. Returns whether one was found.
    pub fn load(&self) -> Result<bool, BoardError> {
        let Some(store) = &self.persistence else {
            return Ok(false);
        };
        let token = store.load_token()?;
        let found = token.is_some();
        let mut state = self.state.write();
        state.access_token = token.map(SecretString::from);
        state.user = None;
        if found {
            debug!("Restored access token from storage");
        }
        Ok(found)
    }

    /// Replace the token. The cached user belongs to the old token and is dropped.
    ///
    /// Persistence happens first; on failure the in-memory session is untouched.
    pub fn set_token(&self, token: impl Into<String>) -> Result<(), BoardError> {
        let token: String = token.into();
        let mut state = self.state.write();
        if let Some(store) = &self.persistence {
            store.save_token(Some(&token))?;
        }
        state.access_token = Some(SecretString::from(token));
        state.user = None;
        info!("Access token stored");
        Ok(())
    }

    /// Token for an authenticated call, or `AuthenticationRequired`.
    pub fn bearer(&self, operation: &'static str) -> Result<SecretString, BoardError> {
        self.state
            .read()
            .access_token
            .as_ref()
            .map(|t| SecretString::from(t.expose_secret().to_string()))
            .ok_or(BoardError::AuthenticationRequired { operation })
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.read().access_token.is_some()
    }

    pub fn set_user(&self, user: UserInfo) {
        self.state.write().user = Some(user);
    }

    pub fn user(&self) -> Option<UserInfo> {
        self.state.read().user.clone()
    }

    pub fn user_id(&self) -> Option<String> {
        self.state.read().user.as_ref().map(|u| u.id.clone())
    }

    /// Clear token and user, in memory and in storage.
    ///
    /// The in-memory session is cleared even when storage fails; the error
    /// is still returned so the caller can report it.
    pub fn logout(&self) -> Result<(), BoardError> {
        let mut state = self.state.write();
        state.access_token = None;
        state.user = None;
        drop(state);
        info!("Logged out");
        if let Some(store) = &self.persistence {
            if let Err(e) = store.save_token(None) {
                warn!("Failed to clear stored token: {e}");
                return Err(e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use board_protocol::BoardErrorCode;

    fn user(id: &str) -> UserInfo {
        serde_json::from_value(serde_json::json!({ "id": id, "username": id })).unwrap()
    }

    #[test]
    fn bearer_requires_token() {
        let session = SessionStore::new();
        let err = session.bearer("fetch_user_info").unwrap_err();
        assert_eq!(err.code(), BoardErrorCode::AuthenticationRequired);
        assert!(err.requires_login());

        session.set_token("lip_abc").unwrap();
        assert!(session.is_authenticated());
        assert_eq!(session.bearer("x").unwrap().expose_secret(), "lip_abc");
    }

    #[test]
    fn new_token_drops_cached_user() {
        let session = SessionStore::new();
        session.set_token("one").unwrap();
        session.set_user(user("alice"));
        assert_eq!(session.user_id().as_deref(), Some("alice"));

        session.set_token("two").unwrap();
        assert!(session.user().is_none());
    }

    #[test]
    fn memory_store_write_through() {
        let store = Arc::new(MemoryTokenStore::new());
        let session = SessionStore::with_token_store(store.clone());
        session.set_token("lip_mem").unwrap();
        assert_eq!(store.load_token().unwrap().as_deref(), Some("lip_mem"));

        session.logout().unwrap();
        assert_eq!(store.load_token().unwrap(), None);
        assert!(!session.is_authenticated());
    }

    #[test]
    fn file_store_round_trip_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("token");
        let store = Arc::new(FileTokenStore::new(&path));

        let session = SessionStore::with_token_store(store.clone());
        assert!(!session.load().unwrap());
        session.set_token("lip_file").unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        let restored = SessionStore::with_token_store(store.clone());
        assert!(restored.load().unwrap());
        assert_eq!(restored.bearer("x").unwrap().expose_secret(), "lip_file");

        restored.logout().unwrap();
        assert!(!path.exists());
        // Removing an absent file is fine.
        store.save_token(None).unwrap();
    }

    #[test]
    fn blank_token_file_is_no_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "  \n").unwrap();
        assert_eq!(FileTokenStore::new(&path).load_token().unwrap(), None);
    }

    #[test]
    fn failed_persist_leaves_session_untouched() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes the write fail.
        let path = dir.path().join("token");
        std::fs::create_dir_all(&path).unwrap();
        let session = SessionStore::with_token_store(Arc::new(FileTokenStore::new(&path)));

        let err = session.set_token("lip_x").unwrap_err();
        assert_eq!(err.code(), BoardErrorCode::TokenStore);
        assert!(!session.is_authenticated());
    }
}
