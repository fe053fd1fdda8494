//! On-disk OAuth2 credential cache
//!
//! The first successful authorization writes a [`Credential`] to the token
//! cache file; every later run reads it back and skips the browser flow.
//! Deleting the file forces a fresh authorization.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use google_gmail1::yup_oauth2::storage::{TokenInfo, TokenStorage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{OrganizerError, Result};

/// Access/refresh token pair with its expiry, as persisted to disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Scopes the token was granted for
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Credential {
    /// Whether this credential was granted every scope in `requested`
    pub fn covers(&self, requested: &[&str]) -> bool {
        requested
            .iter()
            .all(|scope| self.scopes.iter().any(|granted| granted == scope))
    }

    /// Build a credential from a freshly exchanged or refreshed token
    pub fn from_token_info(token: TokenInfo, scopes: &[&str]) -> Self {
        Self {
            access_token: token.access_token.unwrap_or_default(),
            refresh_token: token.refresh_token,
            expires_at: token
                .expires_at
                .and_then(|at| DateTime::from_timestamp(at.unix_timestamp(), 0)),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn to_token_info(&self) -> TokenInfo {
        TokenInfo {
            access_token: Some(self.access_token.clone()),
            refresh_token: self.refresh_token.clone(),
            expires_at: self
                .expires_at
                .and_then(|at| time::OffsetDateTime::from_unix_timestamp(at.timestamp()).ok()),
            id_token: None,
        }
    }
}

/// Reads and writes the credential at a well-known path
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted credential
    ///
    /// A missing file and an unparseable file both map to `NotFound`: either
    /// way the caller has to run the authorization flow again.
    pub async fn load(&self) -> Result<Credential> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OrganizerError::NotFound(format!(
                    "No cached token at {:?}",
                    self.path
                )));
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content).map_err(|e| {
            tracing::warn!("Ignoring unreadable token cache {:?}: {}", self.path, e);
            OrganizerError::NotFound(format!("Token cache {:?} is not valid JSON", self.path))
        })
    }

    /// Write the credential, replacing any previous content
    pub async fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(credential)?;
        write_owner_only(&self.path, json.as_bytes()).await?;
        tracing::info!("Saved credential to {:?}", self.path);
        Ok(())
    }
}

/// Create or truncate `path` with mode 0600 before any byte is written
#[cfg(unix)]
async fn write_owner_only(path: &Path, contents: &[u8]) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .await?;
    file.write_all(contents).await?;
    file.flush().await?;

    // mode() only applies on creation; tighten a pre-existing file too
    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Windows uses ACLs; the file inherits the profile directory's ACL
#[cfg(not(unix))]
async fn write_owner_only(path: &Path, contents: &[u8]) -> Result<()> {
    tokio::fs::write(path, contents).await?;
    Ok(())
}

/// Lets yup-oauth2 read and refresh tokens through our cache file
#[async_trait]
impl TokenStorage for TokenStore {
    async fn set(&self, scopes: &[&str], token: TokenInfo) -> anyhow::Result<()> {
        let mut credential = Credential::from_token_info(token, scopes);

        // Refresh responses usually omit the refresh token; keep the old one
        if credential.refresh_token.is_none() {
            if let Ok(previous) = self.load().await {
                credential.refresh_token = previous.refresh_token;
            }
        }

        self.save(&credential).await?;
        Ok(())
    }

    async fn get(&self, scopes: &[&str]) -> Option<TokenInfo> {
        match self.load().await {
            Ok(credential) if credential.covers(scopes) => Some(credential.to_token_info()),
            Ok(_) => {
                tracing::info!(
                    "Cached token at {:?} lacks the requested scopes, re-authorizing",
                    self.path
                );
                None
            }
            Err(e) => {
                tracing::debug!("No usable cached token: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

    fn sample_credential() -> Credential {
        Credential {
            access_token: "ya29.access".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expires_at: DateTime::from_timestamp(1_767_225_600, 0),
            scopes: vec![SCOPE.to_string()],
        }
    }

    #[tokio::test]
    async fn test_save_then_load_returns_same_credential() {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));

        let credential = sample_credential();
        store.save(&credential).await.unwrap();

        assert_eq!(store.load().await.unwrap(), credential);
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_credential() {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));

        store.save(&sample_credential()).await.unwrap();
        let replacement = Credential {
            access_token: "ya29.second".to_string(),
            refresh_token: None,
            expires_at: None,
            scopes: vec![],
        };
        store.save(&replacement).await.unwrap();

        assert_eq!(store.load().await.unwrap(), replacement);
    }

    #[tokio::test]
    async fn test_load_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("absent.json"));

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, OrganizerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_load_garbage_is_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        tokio::fs::write(&path, "not json at all").await.unwrap();

        let err = TokenStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, OrganizerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("nested/cache/token.json"));

        store.save(&sample_credential()).await.unwrap();
        assert!(store.path().exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        tokio::fs::write(&path, "{}").await.unwrap();
        let mut perms = tokio::fs::metadata(&path).await.unwrap().permissions();
        perms.set_mode(0o644);
        tokio::fs::set_permissions(&path, perms).await.unwrap();

        TokenStore::new(&path).save(&sample_credential()).await.unwrap();

        let mode = tokio::fs::metadata(&path).await.unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_covers_scopes() {
        let credential = sample_credential();
        assert!(credential.covers(&[SCOPE]));
        assert!(credential.covers(&[]));
        assert!(!credential.covers(&["https://www.googleapis.com/auth/gmail.modify"]));
    }

    #[test]
    fn test_token_info_conversion_keeps_fields() {
        let credential = sample_credential();
        let back = Credential::from_token_info(credential.to_token_info(), &[SCOPE]);
        assert_eq!(back, credential);
    }

    #[tokio::test]
    async fn test_token_storage_get_respects_scopes() {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        store.save(&sample_credential()).await.unwrap();

        let token = store.get(&[SCOPE]).await.unwrap();
        assert_eq!(token.access_token.as_deref(), Some("ya29.access"));

        assert!(store
            .get(&["https://www.googleapis.com/auth/gmail.modify"])
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_token_storage_set_keeps_refresh_token() {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        store.save(&sample_credential()).await.unwrap();

        let refreshed = TokenInfo {
            access_token: Some("ya29.refreshed".to_string()),
            refresh_token: None,
            expires_at: None,
            id_token: None,
        };
        store.set(&[SCOPE], refreshed).await.unwrap();

        let credential = store.load().await.unwrap();
        assert_eq!(credential.access_token, "ya29.refreshed");
        assert_eq!(credential.refresh_token.as_deref(), Some("1//refresh"));
    }
}
