//! Credential persistence
//!
//! The store is injected into the lifecycle as a capability so tests can
//! substitute an in-memory double. The durable format is a single JSON
//! document holding either `{}` or a fully populated [`Credentials`] record,
//! read on first use and overwritten wholesale on every update.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::credentials::Credentials;

/// Errors from a credential store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem access failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The record could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable key-value blob holding the current token set.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the stored record. A missing or unreadable blob loads as the
    /// empty record rather than an error; authentication can proceed from
    /// scratch either way.
    async fn load(&self) -> Result<Credentials, StoreError>;

    /// Overwrite the stored record wholesale.
    async fn save(&self, credentials: &Credentials) -> Result<(), StoreError>;

    /// Reset the stored record to empty.
    async fn clear(&self) -> Result<(), StoreError>;
}

/// File-backed store: one JSON document at a configurable path.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Create a store persisting to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the session blob.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Credentials, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no session blob yet");
                return Ok(Credentials::default());
            }
            Err(err) => return Err(err.into()),
        };

        match serde_json::from_str(&content) {
            Ok(credentials) => Ok(credentials),
            Err(err) => {
                // A corrupt blob is discarded, not fatal: the lifecycle falls
                // back to a fresh authorization.
                warn!(path = %self.path.display(), error = %err, "discarding unparseable session blob");
                Ok(Credentials::default())
            }
        }
    }

    async fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
        let json = serde_json::to_string(credentials)?;
        tokio::fs::write(&self.path, json).await?;
        debug!(path = %self.path.display(), "session blob written");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        tokio::fs::write(&self.path, "{}").await?;
        Ok(())
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: RwLock<Credentials>,
}

impl MemoryCredentialStore {
    /// Create an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with a record.
    #[must_use]
    pub fn seeded(credentials: Credentials) -> Self {
        Self { inner: RwLock::new(credentials) }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Credentials, StoreError> {
        Ok(self.inner.read().await.clone())
    }

    async fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
        *self.inner.write().await = credentials.clone();
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self.inner.write().await = Credentials::default();
        Ok(())
    }
}
