//! Core types for the export engine.

pub mod representation;
pub mod color;
pub mod settings;
pub mod molecule;
pub mod manifest;
pub mod snapshot;

pub use representation::{decode, RepresentationKind, RepresentationMask, RepresentationSet};
pub use color::{ColorId, HostColor, Rgba};
pub use settings::{SettingKey, SettingList, UniqueSettingId, UniqueSettings, WorkspaceSettings};
pub use molecule::{Atom, AtomSite, Bond, MoleculeObject, ObjectKind};
pub use manifest::{
    ColorScheme, Representation, RepresentationComponent, SceneManifest, SizeScheme,
    StructureEntry, StructureFormat,
};
pub use snapshot::{
    PaletteEntry, RawSetting, Session, SessionSnapshot, SessionSource, SnapshotError,
    SNAPSHOT_SCHEMA_VERSION,
};
