//! Versioned session snapshot schema.
//!
//! A [`SessionSnapshot`] is the self-contained, serializable copy of the host
//! session taken when an export starts. It is validated and normalized into a
//! [`Session`] before any decoding happens, so later stages never index into
//! unchecked data.
//!
//! ## Validation
//!
//! - `schema_version` must equal [`SNAPSHOT_SCHEMA_VERSION`]
//! - unknown fields are rejected
//! - object names are non-empty and unique
//! - bond endpoints reference atoms of the same object
//! - frame indices are 1-based
//!
//! Unknown setting ids are not an error; they are dropped.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::color::ColorId;
use super::molecule::{Atom, AtomSite, Bond, MoleculeObject, ObjectKind};
use super::representation::RepresentationMask;
use super::settings::{SettingKey, SettingList, UniqueSettingId, UniqueSettings, WorkspaceSettings};

/// Schema version accepted by [`SessionSnapshot::normalize`].
pub const SNAPSHOT_SCHEMA_VERSION: &str = "molz-session/1";

/// Error type for snapshot decoding and validation.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The snapshot is not valid JSON for this schema.
    #[error("Malformed session snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Schema version mismatch.
    #[error("Unsupported snapshot schema '{found}' (expected '{expected}')")]
    UnsupportedVersion {
        /// Version found in the snapshot.
        found: String,
        /// Version this crate reads.
        expected: &'static str,
    },
    /// An object has an empty name.
    #[error("Object #{0} has an empty name")]
    EmptyObjectName(usize),
    /// Two objects share a name.
    #[error("Duplicate object name: {0}")]
    DuplicateObject(String),
    /// A bond references an atom outside its object.
    #[error("Bond #{bond} of '{object}' references atom {atom}, but the object has {atom_count} atoms")]
    BondOutOfRange {
        /// Object name.
        object: String,
        /// Bond position.
        bond: usize,
        /// Offending atom ordinal.
        atom: usize,
        /// Atoms in the object.
        atom_count: usize,
    },
    /// An atom has frame index 0.
    #[error("Atom #{atom} of '{object}' has frame index 0 (frames are 1-based)")]
    InvalidFrame {
        /// Object name.
        object: String,
        /// Atom ordinal.
        atom: usize,
    },
    /// The host could not produce a snapshot.
    #[error("Session unavailable: {0}")]
    Unavailable(String),
}

/// Raw `(setting id, value)` pair as stored by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSetting {
    /// Host setting index.
    pub setting: u32,
    /// Color value; negative means unset.
    pub value: i32,
}

/// Atom record of the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotAtom {
    /// Style bitmask.
    pub reps: u32,
    /// Base color.
    pub color: i32,
    /// Unique settings id, `-1` for none.
    #[serde(default = "no_unique_id")]
    pub unique_id: i32,
    /// Frame index, 1-based.
    #[serde(default = "first_frame")]
    pub state: u32,
    /// Whether the atom is present in the deposited structure.
    #[serde(default = "default_true")]
    pub present: bool,
    /// Element symbol.
    #[serde(default)]
    pub element: Option<String>,
    /// Atom name.
    #[serde(default)]
    pub name: String,
    /// Residue name.
    #[serde(default)]
    pub resn: String,
    /// Residue number.
    #[serde(default)]
    pub resi: i32,
    /// Chain identifier.
    #[serde(default)]
    pub chain: String,
    /// Cartesian coordinates.
    #[serde(default)]
    pub coord: [f64; 3],
}

/// Bond record of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotBond {
    /// First atom ordinal.
    pub atom_a: usize,
    /// Second atom ordinal.
    pub atom_b: usize,
    /// Bond order.
    #[serde(default = "single_bond")]
    pub order: u8,
    /// Whether the bond has its own color settings.
    #[serde(default)]
    pub custom_color: bool,
    /// Unique settings id of the bond, `-1` for none.
    #[serde(default = "no_unique_id")]
    pub unique_id: i32,
}

/// Object record of the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotObject {
    /// Object name.
    pub name: String,
    /// Object kind.
    #[serde(default)]
    pub kind: ObjectKind,
    /// Whether the object is shown.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Atoms.
    #[serde(default)]
    pub atoms: Vec<SnapshotAtom>,
    /// Bonds.
    #[serde(default)]
    pub bonds: Vec<SnapshotBond>,
    /// Complex-level settings.
    #[serde(default)]
    pub settings: Vec<RawSetting>,
}

/// Host color table entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaletteEntry {
    /// Color identifier.
    pub id: i32,
    /// Normalized RGB.
    pub rgb: [f32; 3],
}

/// Serializable copy of a host session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionSnapshot {
    /// Schema version.
    pub schema_version: String,
    /// Session objects in host order.
    #[serde(default)]
    pub objects: Vec<SnapshotObject>,
    /// Unique settings lists by id.
    #[serde(default)]
    pub unique_settings: BTreeMap<i32, Vec<RawSetting>>,
    /// Workspace-level settings.
    #[serde(default)]
    pub workspace_settings: Vec<RawSetting>,
    /// Host color table.
    #[serde(default)]
    pub palette: Vec<PaletteEntry>,
}

fn no_unique_id() -> i32 {
    -1
}

fn first_frame() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn single_bond() -> u8 {
    1
}

fn optional_id(raw: i32) -> Option<UniqueSettingId> {
    (raw >= 0).then_some(raw)
}

fn known_settings(raw: &[RawSetting], scope: &str) -> Vec<(SettingKey, ColorId)> {
    raw.iter()
        .filter_map(|s| match SettingKey::from_id(s.setting) {
            Some(key) => Some((key, ColorId(s.value))),
            None => {
                tracing::trace!(setting = s.setting, scope, "Ignoring unknown setting key");
                None
            }
        })
        .collect()
}

impl SessionSnapshot {
    /// Create an empty snapshot of the current schema version.
    pub fn new() -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION.to_string(),
            objects: Vec::new(),
            unique_settings: BTreeMap::new(),
            workspace_settings: Vec::new(),
            palette: Vec::new(),
        }
    }

    /// Parse a snapshot from JSON bytes.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serialize to JSON bytes.
    pub fn to_json_vec(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Check shape and references without converting.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: self.schema_version.clone(),
                expected: SNAPSHOT_SCHEMA_VERSION,
            });
        }

        let mut names = BTreeSet::new();
        for (index, object) in self.objects.iter().enumerate() {
            if object.name.is_empty() {
                return Err(SnapshotError::EmptyObjectName(index));
            }
            if !names.insert(object.name.as_str()) {
                return Err(SnapshotError::DuplicateObject(object.name.clone()));
            }

            if let Some(atom) = object.atoms.iter().position(|a| a.state == 0) {
                return Err(SnapshotError::InvalidFrame {
                    object: object.name.clone(),
                    atom,
                });
            }

            let atom_count = object.atoms.len();
            for (bond_index, bond) in object.bonds.iter().enumerate() {
                for atom in [bond.atom_a, bond.atom_b] {
                    if atom >= atom_count {
                        return Err(SnapshotError::BondOutOfRange {
                            object: object.name.clone(),
                            bond: bond_index,
                            atom,
                            atom_count,
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Validate and convert into the typed [`Session`] model.
    pub fn normalize(self) -> Result<Session, SnapshotError> {
        self.validate()?;

        let molecules = self
            .objects
            .into_iter()
            .map(|object| {
                let settings: SettingList = known_settings(&object.settings, &object.name)
                    .into_iter()
                    .collect();
                let atoms = object
                    .atoms
                    .into_iter()
                    .map(|a| Atom {
                        representation_mask: RepresentationMask::new(a.reps),
                        color: ColorId(a.color),
                        unique_setting_id: optional_id(a.unique_id),
                        frame: a.state,
                        present: a.present,
                        site: AtomSite {
                            element: a.element.unwrap_or_else(|| AtomSite::default().element),
                            name: a.name,
                            resn: a.resn,
                            resi: a.resi,
                            chain: a.chain,
                            coord: a.coord,
                        },
                    })
                    .collect();
                let bonds = object
                    .bonds
                    .into_iter()
                    .map(|b| Bond {
                        atom_a: b.atom_a,
                        atom_b: b.atom_b,
                        order: b.order,
                        has_custom_color: b.custom_color,
                        setting_id: optional_id(b.unique_id),
                    })
                    .collect();

                MoleculeObject {
                    name: object.name,
                    kind: object.kind,
                    enabled: object.enabled,
                    atoms,
                    bonds,
                    settings,
                }
            })
            .collect();

        let mut unique_settings = UniqueSettings::new();
        for (id, raw) in &self.unique_settings {
            let scope = format!("unique:{id}");
            unique_settings.insert(*id, known_settings(raw, &scope).into_iter().collect());
        }

        let mut workspace_settings = WorkspaceSettings::new();
        for (key, value) in known_settings(&self.workspace_settings, "workspace") {
            workspace_settings.set(key, value);
        }

        Ok(Session {
            molecules,
            unique_settings,
            workspace_settings,
            palette: self.palette,
        })
    }
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalized, read-only view of a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    /// Objects in host order.
    pub molecules: Vec<MoleculeObject>,
    /// Unique-atom level settings.
    pub unique_settings: UniqueSettings,
    /// Workspace level settings.
    pub workspace_settings: WorkspaceSettings,
    /// Host color table.
    pub palette: Vec<PaletteEntry>,
}

impl Session {
    /// Create a session from molecules with empty settings.
    pub fn new(molecules: Vec<MoleculeObject>) -> Self {
        Self {
            molecules,
            ..Self::default()
        }
    }

    /// Replace the unique settings.
    pub fn with_unique_settings(mut self, unique: UniqueSettings) -> Self {
        self.unique_settings = unique;
        self
    }

    /// Replace the workspace settings.
    pub fn with_workspace_settings(mut self, workspace: WorkspaceSettings) -> Self {
        self.workspace_settings = workspace;
        self
    }
}

/// Host capability: capture the live session as a snapshot.
///
/// Called on the initiating thread before background work starts, so the
/// export never reads the live session concurrently with the host.
pub trait SessionSource {
    /// Take a self-contained copy of the current session.
    fn snapshot(&self) -> Result<SessionSnapshot, SnapshotError>;
}

impl SessionSource for SessionSnapshot {
    fn snapshot(&self) -> Result<SessionSnapshot, SnapshotError> {
        Ok(self.clone())
    }
}
