//! Delivery of scene archives to the remote viewer.
//!
//! The transport is a host collaborator behind [`SceneUploader`]; with the
//! `upload` feature, [`NanomeUploader`] implements it over HTTPS.
//! [`SceneDelivery`] adds what every transport needs: a cached login token
//! and the [`ArchiveRetention`] policy for the local archive.
//!
//! ## Retention
//!
//! | Policy | Upload ok | Upload failed | Login failed |
//! |--------|-----------|---------------|--------------|
//! | `KeepOnFailure` | deleted | kept | kept |
//! | `DeleteAfterAttempt` | deleted | deleted | kept |
//!
//! A failed login never reaches the upload, so the archive is always kept.

#[cfg(feature = "upload")]
pub mod http;

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ArchiveRetention;
use crate::packager::ArchiveReceipt;

#[cfg(feature = "upload")]
pub use http::NanomeUploader;

/// Form field asking the viewer to open the workspace immediately.
pub const FORM_LOAD_IN_HEADSET: (&str, &str) = ("load-in-headset", "true");

/// Form field naming the archive format.
pub const FORM_FORMAT: (&str, &str) = ("format", "molz");

/// Multipart part name carrying the archive bytes.
pub const FORM_FILE_PART: &str = "file";

/// Client identifier sent with login requests.
pub const LOGIN_SOURCE: &str = "api:pymol-plugin";

/// Error type for login and upload.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The login endpoint refused the credentials.
    #[error("Failed to login: {reason} ({status})")]
    LoginRejected {
        /// HTTP status code.
        status: u16,
        /// Reason phrase.
        reason: String,
    },
    /// The upload endpoint refused the archive.
    #[error("Could not send the session: {reason} ({status})")]
    UploadRejected {
        /// HTTP status code.
        status: u16,
        /// Reason phrase.
        reason: String,
    },
    /// Network or client failure.
    #[error("Transport error: {0}")]
    Transport(String),
    /// The service answered with an unexpected body.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// The archive could not be read.
    #[error("Archive error: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// Whether the error means the token is no longer accepted.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::UploadRejected { status: 401 | 403, .. })
    }
}

/// Login credentials. The password is never printed.
#[derive(Clone)]
pub struct Credentials {
    login: String,
    password: String,
}

impl Credentials {
    /// Create new credentials.
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }

    /// Login name.
    pub fn login(&self) -> &str {
        &self.login
    }

    /// Password.
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Bearer token returned by login.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wrap a token value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Token value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

/// Host collaborator: authenticate and upload archives.
#[async_trait]
pub trait SceneUploader: Send + Sync {
    /// Exchange credentials for a token.
    async fn login(&self, credentials: &Credentials) -> Result<AuthToken, UploadError>;

    /// Upload the archive at `archive`.
    async fn upload(&self, archive: &Path, token: &AuthToken) -> Result<(), UploadError>;
}

/// Outcome of a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    /// Archive that was uploaded.
    pub archive: PathBuf,
    /// Whether the local archive was deleted afterwards.
    pub archive_deleted: bool,
}

/// Uploads archives with a cached token and a retention policy.
pub struct SceneDelivery<U> {
    uploader: U,
    credentials: Credentials,
    retention: ArchiveRetention,
    token: Mutex<Option<AuthToken>>,
}

impl<U: SceneUploader> SceneDelivery<U> {
    /// Create a new delivery over `uploader`.
    pub fn new(uploader: U, credentials: Credentials) -> Self {
        Self {
            uploader,
            credentials,
            retention: ArchiveRetention::default(),
            token: Mutex::new(None),
        }
    }

    /// Set the retention policy.
    pub fn with_retention(mut self, retention: ArchiveRetention) -> Self {
        self.retention = retention;
        self
    }

    /// Get the uploader.
    pub fn uploader(&self) -> &U {
        &self.uploader
    }

    /// Whether a token is cached.
    pub fn has_token(&self) -> bool {
        self.token.lock().is_some()
    }

    /// Drop the cached token; the next delivery logs in again.
    pub fn forget_token(&self) {
        *self.token.lock() = None;
    }

    async fn token(&self) -> Result<AuthToken, UploadError> {
        let cached = self.token.lock().clone();
        if let Some(token) = cached {
            return Ok(token);
        }
        let token = self.uploader.login(&self.credentials).await?;
        *self.token.lock() = Some(token.clone());
        Ok(token)
    }

    /// Upload `receipt`'s archive and apply the retention policy.
    ///
    /// No retry: a rejected upload is returned as is. A token the service
    /// no longer accepts is forgotten.
    pub async fn deliver(&self, receipt: &ArchiveReceipt) -> Result<DeliveryReport, UploadError> {
        let token = self.token().await?;
        let result = self.uploader.upload(&receipt.path, &token).await;

        if let Err(e) = &result {
            if e.is_unauthorized() {
                self.forget_token();
            }
        }

        let archive_deleted = self.retention.deletes(result.is_ok()) && remove_archive(&receipt.path);
        match result {
            Ok(()) => {
                info!(
                    path = %receipt.path.display(),
                    size_bytes = receipt.size_bytes,
                    archive_deleted,
                    "Scene archive delivered"
                );
                Ok(DeliveryReport {
                    archive: receipt.path.clone(),
                    archive_deleted,
                })
            }
            Err(e) => {
                warn!(
                    path = %receipt.path.display(),
                    error = %e,
                    archive_deleted,
                    "Scene archive upload failed"
                );
                Err(e)
            }
        }
    }
}

fn remove_archive(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove archive");
            false
        }
    }
}
