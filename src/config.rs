//! Export configuration.
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `MOLZ_OUTPUT_DIR`: Directory archives are published into (default: current directory)
//! - `MOLZ_STAGING_DIR`: Parent of staging directories (default: system temp dir)
//! - `MOLZ_SMALL_MOLECULE_THRESHOLD`: Present-atom count from which mmCIF is used (default: 150)
//! - `MOLZ_COLOR_CACHE_SIZE`: Cached color conversions, 0 disables (default: 4096)
//! - `MOLZ_ARCHIVE_RETENTION`: `keep-on-failure` or `delete` (default: keep-on-failure)
//! - `NANOME_LOGIN_URL`: Login endpoint
//! - `NANOME_LOAD_URL`: Workspace upload endpoint
//! - `NANOME_TIMEOUT_SECS`: Login/upload request timeout (default: 5)
//!
//! Unparseable values fall back to the default with a warning.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::palette::CacheConfig;
use crate::DEFAULT_SMALL_MOLECULE_THRESHOLD;

/// Default login endpoint of the viewer service.
pub const DEFAULT_LOGIN_URL: &str = "https://api.nanome.ai/user/login";

/// Default workspace upload endpoint of the viewer service.
pub const DEFAULT_LOAD_URL: &str = "https://api.nanome.ai/load/workspace";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// What happens to the local archive after an upload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveRetention {
    /// Delete after a successful upload, keep it when the upload fails.
    #[default]
    KeepOnFailure,
    /// Delete after every attempt, successful or not.
    DeleteAfterAttempt,
}

impl ArchiveRetention {
    /// Whether the archive is deleted after an attempt with this outcome.
    pub fn deletes(&self, upload_succeeded: bool) -> bool {
        match self {
            Self::KeepOnFailure => upload_succeeded,
            Self::DeleteAfterAttempt => true,
        }
    }
}

impl FromStr for ArchiveRetention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep-on-failure" | "keep" => Ok(Self::KeepOnFailure),
            "delete" | "delete-after-attempt" => Ok(Self::DeleteAfterAttempt),
            other => Err(format!("unknown archive retention '{other}'")),
        }
    }
}

impl fmt::Display for ArchiveRetention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::KeepOnFailure => "keep-on-failure",
            Self::DeleteAfterAttempt => "delete",
        })
    }
}

/// Configuration of an [`Exporter`](crate::Exporter) and its uploader.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Directory archives are published into.
    pub output_dir: PathBuf,
    /// Parent of staging directories; `None` uses the system temp dir.
    pub staging_dir: Option<PathBuf>,
    /// Present-atom count from which molecules are written as mmCIF.
    pub small_molecule_threshold: usize,
    /// Color conversion cache.
    pub color_cache: CacheConfig,
    /// Archive handling after upload.
    pub retention: ArchiveRetention,
    /// Login endpoint.
    pub login_url: String,
    /// Workspace upload endpoint.
    pub load_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            staging_dir: None,
            small_molecule_threshold: DEFAULT_SMALL_MOLECULE_THRESHOLD,
            color_cache: CacheConfig::default(),
            retention: ArchiveRetention::default(),
            login_url: DEFAULT_LOGIN_URL.to_string(),
            load_url: DEFAULT_LOAD_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ExportConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let cache_size = parsed(&lookup, "MOLZ_COLOR_CACHE_SIZE", defaults.color_cache.max_entries);
        let color_cache = CacheConfig {
            max_entries: cache_size,
            enabled: cache_size > 0,
        };

        let threshold = parsed(
            &lookup,
            "MOLZ_SMALL_MOLECULE_THRESHOLD",
            defaults.small_molecule_threshold,
        );

        Self {
            output_dir: lookup("MOLZ_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            staging_dir: lookup("MOLZ_STAGING_DIR").map(PathBuf::from),
            small_molecule_threshold: threshold,
            color_cache,
            retention: parsed(&lookup, "MOLZ_ARCHIVE_RETENTION", defaults.retention),
            login_url: lookup("NANOME_LOGIN_URL").unwrap_or(defaults.login_url),
            load_url: lookup("NANOME_LOAD_URL").unwrap_or(defaults.load_url),
            timeout_secs: parsed(&lookup, "NANOME_TIMEOUT_SECS", defaults.timeout_secs),
        }
    }

    /// Set the output directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the staging parent directory.
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    /// Set the small-molecule threshold.
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.small_molecule_threshold = threshold;
        self
    }

    /// Set the archive retention policy.
    pub fn with_retention(mut self, retention: ArchiveRetention) -> Self {
        self.retention = retention;
        self
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + fmt::Display,
    T::Err: fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.parse() {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, value = %raw, error = %e, fallback = %default, "Invalid config value, using default");
                default
            }
        },
    }
}
