//! Backend credentials
//!
//! The persisted session file is the source of truth for the signed-in user.
//! [`CredentialCache`] mirrors its token in memory so synchronous callers
//! (request builders, handlers) never have to touch the disk. The cache is
//! filled on sign-in or restore and emptied on sign-out.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info, warn};

use crate::backend::models::LoginResponse;

const SESSION_FILE: &str = "session.json";

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("no session token available, sign in again")]
    Missing,

    #[error("session storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt session file: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Persisted sign-in state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSession {
    #[serde(default)]
    pub logged_in: bool,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "crate::backend::models::default_role")]
    pub role: String,
    #[serde(default)]
    pub remember_me: bool,
}

impl SavedSession {
    /// Signed in, asked to be remembered, and a token is on file.
    pub fn can_auto_login(&self) -> bool {
        self.logged_in && self.remember_me && self.token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

impl Default for SavedSession {
    fn default() -> Self {
        Self {
            logged_in: false,
            token: None,
            user_id: None,
            username: None,
            role: crate::backend::models::default_role(),
            remember_me: false,
        }
    }
}

/// JSON file store for [`SavedSession`]
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(SESSION_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file reads as a signed-out session.
    pub async fn load(&self) -> Result<SavedSession, CredentialError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SavedSession::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, session: &SavedSession) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(session)?;
        tokio::fs::write(&self.path, json).await?;
        debug!(path = %self.path.display(), "session saved");
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), CredentialError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn should_auto_login(&self) -> bool {
        self.load().await.is_ok_and(|s| s.can_auto_login())
    }
}

/// In-memory copy of the current token.
#[derive(Debug, Default)]
pub struct CredentialCache {
    token: RwLock<Option<String>>,
}

impl CredentialCache {
    pub fn set(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }

    pub fn get(&self) -> Option<String> {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.set(None);
    }
}

/// Cache + store with the sign-in lifecycle on top.
#[derive(Debug)]
pub struct Credentials {
    cache: CredentialCache,
    store: SessionStore,
}

impl Credentials {
    pub fn new(store: SessionStore) -> Self {
        Self {
            cache: CredentialCache::default(),
            store,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn cached_token(&self) -> Option<String> {
        self.cache.get()
    }

    pub async fn sign_in(
        &self,
        login: &LoginResponse,
        remember_me: bool,
    ) -> Result<(), CredentialError> {
        let saved = SavedSession {
            logged_in: true,
            token: Some(login.token.clone()),
            user_id: Some(login.user.id.clone()),
            username: Some(login.user.username.clone()),
            role: login.user.role.clone(),
            remember_me,
        };
        self.store.save(&saved).await?;
        self.cache.set(Some(login.token.clone()));
        info!(username = %login.user.username, "signed in");
        Ok(())
    }

    pub async fn sign_out(&self) -> Result<(), CredentialError> {
        self.cache.clear();
        self.store.clear().await?;
        info!("signed out");
        Ok(())
    }

    /// Warm the cache from disk at startup when the user asked to be remembered.
    pub async fn restore(&self) -> bool {
        let saved = match self.store.load().await {
            Ok(saved) if saved.can_auto_login() => saved,
            Ok(_) => return false,
            Err(e) => {
                warn!("could not read saved session: {}", e);
                return false;
            }
        };
        self.cache.set(saved.token);
        info!("restored remembered session");
        true
    }

    /// Current bearer token: cached value first, else the persisted one.
    /// A stored `"Bearer "` prefix is stripped.
    pub async fn resolve_token(&self) -> Result<String, CredentialError> {
        let raw = match self.cache.get() {
            Some(token) => Some(token),
            None => {
                let token = self.store.load().await?.token;
                if token.is_some() {
                    self.cache.set(token.clone());
                }
                token
            }
        };

        let token = raw
            .as_deref()
            .map(|t| t.strip_prefix("Bearer ").unwrap_or(t).trim())
            .unwrap_or_default();
        if token.is_empty() {
            return Err(CredentialError::Missing);
        }
        Ok(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::models::LoginUser;

    fn login(token: &str) -> LoginResponse {
        LoginResponse {
            token: token.to_string(),
            user: LoginUser {
                id: "u-1".into(),
                email: "coach@example.test".into(),
                username: "coach".into(),
                role: "broadcaster".into(),
            },
        }
    }

    #[tokio::test]
    async fn missing_everything_is_missing_credential() {
        let dir = tempfile::tempdir().unwrap();
        let credentials = Credentials::new(SessionStore::new(dir.path()));

        let err = credentials.resolve_token().await.unwrap_err();
        assert!(matches!(err, CredentialError::Missing));
        assert!(err.to_string().contains("sign in again"));
    }

    #[tokio::test]
    async fn sign_in_persists_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let credentials = Credentials::new(SessionStore::new(dir.path()));

        credentials.sign_in(&login("abc"), true).await.unwrap();

        assert_eq!(credentials.cached_token().as_deref(), Some("abc"));
        let saved = credentials.store().load().await.unwrap();
        assert!(saved.logged_in);
        assert_eq!(saved.role, "broadcaster");
        assert_eq!(saved.username.as_deref(), Some("coach"));
        assert!(credentials.store().should_auto_login().await);
    }

    #[tokio::test]
    async fn resolve_falls_back_to_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store
            .save(&SavedSession {
                logged_in: true,
                token: Some("Bearer  xyz ".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        let credentials = Credentials::new(store);
        assert!(credentials.cached_token().is_none());
        assert_eq!(credentials.resolve_token().await.unwrap(), "xyz");
        // reloaded value is now cached
        assert!(credentials.cached_token().is_some());
    }

    #[tokio::test]
    async fn cache_wins_over_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store
            .save(&SavedSession {
                token: Some("stale".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        let credentials = Credentials::new(store);
        credentials.cache.set(Some("fresh".into()));
        assert_eq!(credentials.resolve_token().await.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn blank_token_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let credentials = Credentials::new(SessionStore::new(dir.path()));
        credentials.cache.set(Some("Bearer   ".into()));

        assert!(matches!(
            credentials.resolve_token().await,
            Err(CredentialError::Missing)
        ));
    }

    #[tokio::test]
    async fn sign_out_clears_both() {
        let dir = tempfile::tempdir().unwrap();
        let credentials = Credentials::new(SessionStore::new(dir.path()));
        credentials.sign_in(&login("abc"), false).await.unwrap();

        credentials.sign_out().await.unwrap();

        assert!(credentials.cached_token().is_none());
        assert!(!credentials.store().path().exists());
        assert!(matches!(
            credentials.resolve_token().await,
            Err(CredentialError::Missing)
        ));
    }

    #[tokio::test]
    async fn restore_requires_remember_me() {
        let dir = tempfile::tempdir().unwrap();
        let credentials = Credentials::new(SessionStore::new(dir.path()));
        credentials.sign_in(&login("abc"), false).await.unwrap();
        credentials.cache.clear();

        assert!(!credentials.restore().await);
        assert!(credentials.cached_token().is_none());

        credentials.sign_in(&login("abc"), true).await.unwrap();
        credentials.cache.clear();
        assert!(credentials.restore().await);
        assert_eq!(credentials.cached_token().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn restore_skips_blank_or_corrupt_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store
            .save(&SavedSession {
                logged_in: true,
                remember_me: true,
                token: Some(String::new()),
                ..Default::default()
            })
            .await
            .unwrap();
        let credentials = Credentials::new(store.clone());
        assert!(!credentials.restore().await);
        assert!(credentials.cached_token().is_none());

        tokio::fs::write(store.path(), "{ not json").await.unwrap();
        assert!(!credentials.restore().await);
        assert!(!store.should_auto_login().await);
    }
}
