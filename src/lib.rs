//! # molz-export
//!
//! Export of molecular-visualization sessions into `.molz` scene archives.
//!
//! The export engine answers one question:
//!
//! > Given a snapshot of the session, what does the remote viewer need to show the same scene?
//!
//! ## Core Contract
//!
//! 1. Decode each atom's style bitmask into mutually exclusive representation kinds
//! 2. Resolve every (atom, kind) color through the unique → bond → molecule → workspace chain
//! 3. Group atoms into components per molecule, frame and kind, addressed by atom ordinal
//! 4. Package the manifest (`state.json`) and structure assets into one zip archive
//!
//! ## Architecture
//!
//! ```text
//! SessionSource → SessionSnapshot → Session → SceneBuilder → ArchivePackager → .molz
//!                                                 ↓
//!                              decode / ColorResolver / StructureWriter / ColorLookup
//! ```
//!
//! [`Exporter`] owns the pieces, runs them on a background thread and admits
//! one export at a time. With the `upload` feature the archive can be pushed
//! to the viewer service through [`upload::SceneUploader`].
//!
//! ## Determinism Guarantees
//!
//! - Same session + same threshold → byte-identical `state.json`
//! - Components ordered by molecule, frame ascending, kind name
//! - Archive entries sorted, with fixed timestamps

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod palette;
pub mod resolver;
pub mod builder;
pub mod io;
pub mod canonical;
pub mod packager;
pub mod config;
pub mod exporter;
pub mod upload;

// Re-exports
pub use types::{
    decode, Atom, AtomSite, Bond, ColorId, ColorScheme, HostColor, MoleculeObject, ObjectKind,
    Representation, RepresentationComponent, RepresentationKind, RepresentationMask,
    RepresentationSet, Rgba, SceneManifest, Session, SessionSnapshot, SessionSource,
    SettingKey, SettingList, SizeScheme, SnapshotError, StructureEntry, StructureFormat,
    UniqueSettings, WorkspaceSettings, SNAPSHOT_SCHEMA_VERSION,
};
pub use palette::{CacheConfig, CacheStats, CachedColorLookup, ColorLookup, PaletteColorLookup};
pub use resolver::{BondIndex, ColorResolver, ColorSource};
pub use builder::{BuildError, ColorLibrary, SceneBuild, SceneBuilder, StructureWriter};
pub use io::SiteStructureWriter;
pub use canonical::{canonical_hash, canonical_hash_hex, to_canonical_bytes};
pub use packager::{ArchivePackager, ArchiveReceipt, PackageError};
pub use config::{ArchiveRetention, ExportConfig};
pub use exporter::{ExportError, ExportHandle, ExportReport, Exporter};

/// Version written into every scene manifest.
pub const MANIFEST_VERSION: &str = "0.0.1";

/// Present-atom count from which a molecule is exported as a macromolecule.
pub const DEFAULT_SMALL_MOLECULE_THRESHOLD: usize = 150;

/// File extension of scene archives.
pub const ARCHIVE_EXTENSION: &str = "molz";
