//! Export orchestration.
//!
//! [`Exporter`] is the application context of the export engine. It owns the
//! configuration, the host collaborators, the cached color lookup and the
//! single-export guard, and is created and dropped with the host plugin.
//!
//! ## Lifecycle of one export
//!
//! ```text
//! caller thread                     background thread
//! ─────────────                     ─────────────────
//! acquire guard
//! source.snapshot()  ──owned copy──▶ normalize → build → package
//! ExportHandle       ◀──oneshot──── Result<ExportReport, ExportError>
//!                                   release guard
//! ```
//!
//! The snapshot is taken before the background work starts, so the live
//! session is never read concurrently. Only one export runs at a time; a
//! second request fails with [`ExportError::ExportInProgress`].

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{error, info};
use uuid::Uuid;

use crate::builder::{BuildError, SceneBuilder, StructureWriter};
use crate::canonical::canonical_hash_hex;
use crate::config::ExportConfig;
use crate::io::SiteStructureWriter;
use crate::packager::{ArchivePackager, ArchiveReceipt, PackageError};
use crate::palette::{CacheStats, CachedColorLookup, ChainedColorLookup, ColorLookup, PaletteColorLookup};
use crate::types::{SessionSnapshot, SessionSource, SnapshotError};

/// Error type for exports.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Another export holds the guard.
    #[error("Export {0} is already in progress")]
    ExportInProgress(Uuid),
    /// The snapshot could not be taken or failed validation.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    /// Scene building failed.
    #[error(transparent)]
    Build(#[from] BuildError),
    /// Packaging failed.
    #[error(transparent)]
    Package(#[from] PackageError),
    /// The manifest fingerprint could not be computed.
    #[error("Failed to fingerprint manifest: {0}")]
    Fingerprint(#[from] serde_json::Error),
    /// Filesystem or thread spawn failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The background worker ended without reporting.
    #[error("Export worker terminated without a result")]
    WorkerLost,
}

/// Outcome of a successful export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportReport {
    /// Export identifier.
    pub export_id: Uuid,
    /// Archive name (file stem).
    pub name: String,
    /// The published archive.
    pub archive: ArchiveReceipt,
    /// Number of exported structures.
    pub structure_count: usize,
    /// Number of manifest components.
    pub component_count: usize,
    /// Hex xxh64 of the canonical manifest bytes.
    pub manifest_fingerprint: String,
    /// Completion time.
    pub completed_at: DateTime<Utc>,
    /// Wall time of the pipeline in milliseconds.
    pub duration_ms: u64,
}

type ExportResult = Result<ExportReport, ExportError>;

/// Completion handle of a background export.
///
/// The outcome is delivered exactly once.
#[derive(Debug)]
pub struct ExportHandle {
    id: Uuid,
    receiver: oneshot::Receiver<ExportResult>,
}

impl ExportHandle {
    /// Export identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the outcome.
    pub async fn wait(self) -> ExportResult {
        self.receiver.await.unwrap_or(Err(ExportError::WorkerLost))
    }

    /// Block the current thread until the outcome arrives.
    ///
    /// Must not be called from within an async runtime.
    pub fn wait_blocking(self) -> ExportResult {
        self.receiver
            .blocking_recv()
            .unwrap_or(Err(ExportError::WorkerLost))
    }

    /// Poll for the outcome without blocking.
    ///
    /// Returns `None` while the export is running. Once an outcome has been
    /// returned, further calls report [`ExportError::WorkerLost`].
    pub fn try_wait(&mut self) -> Option<ExportResult> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(ExportError::WorkerLost)),
        }
    }
}

struct ExporterInner<W, L> {
    config: ExportConfig,
    writer: W,
    colors: CachedColorLookup<L>,
    in_flight: Mutex<Option<Uuid>>,
}

/// Holds the single-export guard; releases it on drop, including unwinding.
struct ExportPermit<W, L> {
    inner: Arc<ExporterInner<W, L>>,
}

impl<W, L> Drop for ExportPermit<W, L> {
    fn drop(&mut self) {
        *self.inner.in_flight.lock() = None;
    }
}

/// The export engine's application context.
pub struct Exporter<W, L> {
    inner: Arc<ExporterInner<W, L>>,
}

impl Exporter<SiteStructureWriter, PaletteColorLookup> {
    /// Exporter using the built-in structure writer and only the colors
    /// carried in session snapshots.
    pub fn with_site_writer(config: ExportConfig) -> Self {
        Self::new(config, SiteStructureWriter::new(), PaletteColorLookup::new())
    }
}

impl<W, L> Exporter<W, L>
where
    W: StructureWriter + 'static,
    L: ColorLookup + 'static,
{
    /// Create a new exporter over the host collaborators.
    pub fn new(config: ExportConfig, writer: W, colors: L) -> Self {
        let colors = CachedColorLookup::new(colors, &config.color_cache);
        Self {
            inner: Arc::new(ExporterInner {
                config,
                writer,
                colors,
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &ExportConfig {
        &self.inner.config
    }

    /// Identifier of the export currently running, if any.
    pub fn in_flight(&self) -> Option<Uuid> {
        *self.inner.in_flight.lock()
    }

    /// Statistics of the host color cache.
    pub fn color_cache_stats(&self) -> Option<CacheStats> {
        self.inner.colors.cache_stats()
    }

    /// Drop cached host colors, e.g. after the host redefined its palette.
    pub fn clear_color_cache(&self) {
        self.inner.colors.clear_cache();
    }

    /// Run an export on the calling thread.
    pub fn export<S>(&self, source: &S, name: &str) -> ExportResult
    where
        S: SessionSource + ?Sized,
    {
        let id = Uuid::new_v4();
        let _permit = self.acquire(id)?;
        let snapshot = source.snapshot()?;
        self.inner.run_logged(id, snapshot, name)
    }

    /// Start an export on a background thread.
    ///
    /// The snapshot is taken before this returns. Errors acquiring the guard
    /// or taking the snapshot are returned directly; everything after that is
    /// delivered through the handle.
    pub fn spawn_export<S>(&self, source: &S, name: &str) -> Result<ExportHandle, ExportError>
    where
        S: SessionSource + ?Sized,
    {
        let id = Uuid::new_v4();
        let permit = self.acquire(id)?;
        let snapshot = source.snapshot()?;

        let (tx, rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        let name = name.to_string();

        std::thread::Builder::new()
            .name(format!("molz-export-{}", &id.simple().to_string()[..8]))
            .spawn(move || {
                let tx = tx;
                let permit = permit;
                let result = inner.run_logged(id, snapshot, &name);
                drop(permit);
                // The caller may have dropped its handle
                let _ = tx.send(result);
            })?;

        Ok(ExportHandle { id, receiver: rx })
    }

    fn acquire(&self, id: Uuid) -> Result<ExportPermit<W, L>, ExportError> {
        let mut slot = self.inner.in_flight.lock();
        if let Some(current) = *slot {
            return Err(ExportError::ExportInProgress(current));
        }
        *slot = Some(id);
        Ok(ExportPermit {
            inner: Arc::clone(&self.inner),
        })
    }
}

impl<W, L> ExporterInner<W, L>
where
    W: StructureWriter,
    L: ColorLookup,
{
    fn run_logged(&self, id: Uuid, snapshot: SessionSnapshot, name: &str) -> ExportResult {
        let result = self.run(id, snapshot, name);
        match &result {
            Ok(report) => info!(
                export_id = %id,
                name,
                path = %report.archive.path.display(),
                size_bytes = report.archive.size_bytes,
                structures = report.structure_count,
                components = report.component_count,
                fingerprint = %report.manifest_fingerprint,
                duration_ms = report.duration_ms,
                "Export completed"
            ),
            Err(e) => error!(export_id = %id, name, error = %e, "Export failed"),
        }
        result
    }

    fn run(&self, id: Uuid, snapshot: SessionSnapshot, name: &str) -> ExportResult {
        let started = Instant::now();
        let session = snapshot.normalize()?;

        info!(
            export_id = %id,
            name,
            objects = session.molecules.len(),
            "Export started"
        );

        let session_colors = PaletteColorLookup::from_entries(&session.palette);
        let colors = ChainedColorLookup::new(&session_colors, &self.colors);

        let mut scratch = tempfile::Builder::new();
        scratch.prefix("molz-assets-");
        let written = match &self.config.staging_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                scratch.tempdir_in(dir)?
            }
            None => scratch.tempdir()?,
        };

        let build = SceneBuilder::new(&self.writer, &colors)
            .with_threshold(self.config.small_molecule_threshold)
            .build(&session, written.path())?;
        let manifest_fingerprint = canonical_hash_hex(&build.manifest)?;

        let mut packager = ArchivePackager::new(&self.config.output_dir);
        if let Some(dir) = &self.config.staging_dir {
            packager = packager.with_staging_dir(dir);
        }
        let archive = packager.package(name, &build.manifest, &build.assets)?;

        Ok(ExportReport {
            export_id: id,
            name: name.to_string(),
            archive,
            structure_count: build.manifest.structures.len(),
            component_count: build.manifest.components.len(),
            manifest_fingerprint,
            completed_at: Utc::now(),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}
