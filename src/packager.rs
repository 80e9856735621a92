//! Scene archive packaging.
//!
//! [`ArchivePackager`] stages the manifest and structure assets in a private
//! temporary directory, compresses it into a zip archive and publishes the
//! result as `<output_dir>/<name>.molz`.
//!
//! ## Layout
//!
//! ```text
//! <name>.molz
//! ├── assets/
//! │   ├── <identifier>.sdf
//! │   └── <identifier>.cif
//! └── state.json
//! ```
//!
//! ## Guarantees
//!
//! - The staging directory is unique per call and removed on every exit path
//! - The archive is written to a temporary file next to its final path and
//!   renamed into place only once complete
//! - Entries are sorted by path and carry a fixed timestamp, so equal inputs
//!   give byte-identical archives

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::canonical::to_canonical_bytes;
use crate::types::SceneManifest;
use crate::ARCHIVE_EXTENSION;

/// Manifest file name at the archive root.
pub const MANIFEST_FILE: &str = "state.json";

/// Asset directory at the archive root.
pub const ASSETS_DIR: &str = "assets";

/// Error type for archive packaging.
#[derive(Debug, Error)]
pub enum PackageError {
    /// The archive name is empty or contains path components.
    #[error("Invalid archive name: '{0}'")]
    InvalidName(String),
    /// An asset path has no file name or does not exist.
    #[error("Missing asset file: {}", .0.display())]
    MissingAsset(PathBuf),
    /// Two assets share a file name.
    #[error("Duplicate asset name: {0}")]
    DuplicateAsset(String),
    /// The manifest could not be serialized.
    #[error("Failed to serialize manifest: {0}")]
    Manifest(#[from] serde_json::Error),
    /// Zip encoding failed.
    #[error("Failed to compress archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    /// The finished archive could not be moved into place.
    #[error("Failed to publish archive to {}: {source}", path.display())]
    Persist {
        /// Final archive path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// Filesystem failure while staging.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A published scene archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveReceipt {
    /// Final archive path.
    pub path: PathBuf,
    /// Archive size in bytes.
    pub size_bytes: u64,
    /// Hex SHA-256 of the archive bytes.
    pub sha256: String,
}

/// Stages, compresses and publishes scene archives.
#[derive(Debug, Clone)]
pub struct ArchivePackager {
    output_dir: PathBuf,
    staging_dir: Option<PathBuf>,
}

impl ArchivePackager {
    /// Create a packager publishing into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            staging_dir: None,
        }
    }

    /// Stage under `dir` instead of the system temporary directory.
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    /// Directory archives are published into.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Final path of the archive called `name`.
    pub fn archive_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(format!("{name}.{ARCHIVE_EXTENSION}"))
    }

    /// Package `manifest` and `assets` as `<name>.molz`.
    ///
    /// Asset files are copied into `assets/` under their file names, which
    /// must match the manifest identifiers.
    pub fn package(
        &self,
        name: &str,
        manifest: &SceneManifest,
        assets: &[PathBuf],
    ) -> Result<ArchiveReceipt, PackageError> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(|c: char| c == '/' || c == '\\')
        {
            return Err(PackageError::InvalidName(name.to_string()));
        }

        fs::create_dir_all(&self.output_dir)?;

        let staging = self.staging_tempdir()?;
        let root = staging.path().join(name);
        let assets_dir = root.join(ASSETS_DIR);
        fs::create_dir_all(&assets_dir)?;

        let mut seen = BTreeSet::new();
        for asset in assets {
            let file_name = asset
                .file_name()
                .filter(|_| asset.is_file())
                .ok_or_else(|| PackageError::MissingAsset(asset.clone()))?;
            let file_name = file_name.to_string_lossy().into_owned();
            if !seen.insert(file_name.to_ascii_lowercase()) {
                return Err(PackageError::DuplicateAsset(file_name));
            }
            fs::copy(asset, assets_dir.join(&file_name))?;
        }

        fs::write(root.join(MANIFEST_FILE), to_canonical_bytes(manifest)?)?;

        let mut partial = tempfile::Builder::new()
            .prefix(".molz-")
            .suffix(".partial")
            .tempfile_in(&self.output_dir)?;
        write_zip(&root, partial.as_file_mut())?;
        let size_bytes = partial.as_file().metadata()?.len();
        let sha256 = sha256_file(partial.path())?;

        // Nothing fallible may run after the archive takes its final name
        let path = self.archive_path(name);
        partial.persist(&path).map_err(|e| PackageError::Persist {
            path: path.clone(),
            source: e.error,
        })?;

        let staging_path = staging.path().to_path_buf();
        if let Err(e) = staging.close() {
            warn!(path = %staging_path.display(), error = %e, "Failed to remove staging directory");
        }

        debug!(
            path = %path.display(),
            size_bytes,
            assets = assets.len(),
            "Published scene archive"
        );

        Ok(ArchiveReceipt {
            path,
            size_bytes,
            sha256,
        })
    }

    fn staging_tempdir(&self) -> io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("molz-staging-");
        match &self.staging_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                builder.tempdir_in(dir)
            }
            None => builder.tempdir(),
        }
    }
}

/// Relative paths of every file and directory under `root`, sorted.
fn collect_entries(root: &Path) -> io::Result<Vec<(String, bool)>> {
    let mut entries = Vec::new();
    let mut pending = vec![(root.to_path_buf(), String::new())];

    while let Some((dir, prefix)) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = format!("{prefix}{}", entry.file_name().to_string_lossy());
            if entry.file_type()?.is_dir() {
                pending.push((entry.path(), format!("{name}/")));
                entries.push((format!("{name}/"), true));
            } else {
                entries.push((name, false));
            }
        }
    }

    entries.sort();
    Ok(entries)
}

fn write_zip(root: &Path, out: &mut File) -> Result<(), PackageError> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);
    let dir_options = options.unix_permissions(0o755);

    let mut zip = ZipWriter::new(out);
    let mut buffer = Vec::new();
    for (name, is_dir) in collect_entries(root)? {
        if is_dir {
            zip.add_directory(name, dir_options)?;
        } else {
            buffer.clear();
            File::open(root.join(&name))?.read_to_end(&mut buffer)?;
            zip.start_file(name, options)?;
            zip.write_all(&buffer)?;
        }
    }
    zip.finish()?.flush()?;
    Ok(())
}

fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = file.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        hasher.update(&chunk[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
