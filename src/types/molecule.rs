//! Molecule objects of a normalized session.
//!
//! Atom ordinals (positions in [`MoleculeObject::atoms`]) are the selection
//! unit of the scene manifest and stay fixed for one export.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::color::ColorId;
use super::representation::RepresentationMask;
use super::settings::{SettingList, UniqueSettingId};

/// Kind of a session object. Only molecules are exported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// Molecular object with atoms and bonds.
    #[default]
    Molecule,
    /// Anything else (maps, surfaces, CGOs, measurements).
    Other,
}

/// Structural data of an atom, used by structure writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomSite {
    /// Element symbol.
    pub element: String,
    /// Atom name.
    pub name: String,
    /// Residue name.
    pub resn: String,
    /// Residue number.
    pub resi: i32,
    /// Chain identifier.
    pub chain: String,
    /// Cartesian coordinates.
    pub coord: [f64; 3],
}

impl Default for AtomSite {
    fn default() -> Self {
        Self {
            element: "C".to_string(),
            name: String::new(),
            resn: String::new(),
            resi: 0,
            chain: String::new(),
            coord: [0.0; 3],
        }
    }
}

/// One atom of a molecule.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// Style bitmask.
    pub representation_mask: RepresentationMask,
    /// Base color.
    pub color: ColorId,
    /// Unique settings list, if the atom has one.
    pub unique_setting_id: Option<UniqueSettingId>,
    /// Frame (state) index, 1-based.
    pub frame: u32,
    /// Whether the atom exists in the deposited structure.
    pub present: bool,
    /// Structural data.
    pub site: AtomSite,
}

impl Atom {
    /// Create a present atom in frame 1.
    pub fn new(mask: u32, color: ColorId) -> Self {
        Self {
            representation_mask: RepresentationMask::new(mask),
            color,
            unique_setting_id: None,
            frame: 1,
            present: true,
            site: AtomSite::default(),
        }
    }

    /// Set the frame index.
    pub fn in_frame(mut self, frame: u32) -> Self {
        self.frame = frame;
        self
    }

    /// Attach a unique settings list.
    pub fn with_unique(mut self, id: UniqueSettingId) -> Self {
        self.unique_setting_id = Some(id);
        self
    }

    /// Set the structural data.
    pub fn with_site(mut self, site: AtomSite) -> Self {
        self.site = site;
        self
    }
}

/// A bond between two atoms of the same molecule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bond {
    /// First atom ordinal.
    pub atom_a: usize,
    /// Second atom ordinal.
    pub atom_b: usize,
    /// Bond order (1 = single).
    pub order: u8,
    /// Whether the bond carries its own color.
    pub has_custom_color: bool,
    /// Unique settings list of the bond.
    pub setting_id: Option<UniqueSettingId>,
}

impl Bond {
    /// Create a plain single bond.
    pub fn new(atom_a: usize, atom_b: usize) -> Self {
        Self {
            atom_a,
            atom_b,
            order: 1,
            has_custom_color: false,
            setting_id: None,
        }
    }

    /// Mark the bond as custom-colored through a unique settings list.
    pub fn with_custom_color(mut self, setting_id: UniqueSettingId) -> Self {
        self.has_custom_color = true;
        self.setting_id = Some(setting_id);
        self
    }

    /// Check if the bond touches `ordinal`.
    pub fn touches(&self, ordinal: usize) -> bool {
        self.atom_a == ordinal || self.atom_b == ordinal
    }
}

/// A named object of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct MoleculeObject {
    /// Object name.
    pub name: String,
    /// Object kind.
    pub kind: ObjectKind,
    /// Whether the object is shown.
    pub enabled: bool,
    /// Atoms in ordinal order.
    pub atoms: Vec<Atom>,
    /// Bonds referencing atom ordinals.
    pub bonds: Vec<Bond>,
    /// Complex-level color overrides.
    pub settings: SettingList,
}

impl MoleculeObject {
    /// Create an enabled, empty molecule.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ObjectKind::Molecule,
            enabled: true,
            atoms: Vec::new(),
            bonds: Vec::new(),
            settings: SettingList::new(),
        }
    }

    /// Replace the atoms.
    pub fn with_atoms(mut self, atoms: Vec<Atom>) -> Self {
        self.atoms = atoms;
        self
    }

    /// Replace the bonds.
    pub fn with_bonds(mut self, bonds: Vec<Bond>) -> Self {
        self.bonds = bonds;
        self
    }

    /// Replace the complex-level settings.
    pub fn with_settings(mut self, settings: SettingList) -> Self {
        self.settings = settings;
        self
    }

    /// Set the enabled flag.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Number of atoms flagged present.
    pub fn present_atom_count(&self) -> usize {
        self.atoms.iter().filter(|a| a.present).count()
    }

    /// Distinct frame indices, ascending.
    pub fn frames(&self) -> BTreeSet<u32> {
        self.atoms.iter().map(|a| a.frame).collect()
    }

    /// Copy of this molecule holding only present atoms.
    ///
    /// Ordinals are renumbered densely, bonds are remapped, and bonds that
    /// touch a removed atom are dropped. `self` is left untouched.
    pub fn retain_present(&self) -> MoleculeObject {
        let mut remap: Vec<Option<usize>> = Vec::with_capacity(self.atoms.len());
        let mut atoms = Vec::with_capacity(self.atoms.len());
        for atom in &self.atoms {
            if atom.present {
                remap.push(Some(atoms.len()));
                atoms.push(atom.clone());
            } else {
                remap.push(None);
            }
        }

        let lookup = |ordinal: usize| remap.get(ordinal).copied().flatten();
        let bonds = self
            .bonds
            .iter()
            .filter_map(|bond| {
                let atom_a = lookup(bond.atom_a)?;
                let atom_b = lookup(bond.atom_b)?;
                Some(Bond {
                    atom_a,
                    atom_b,
                    ..bond.clone()
                })
            })
            .collect();

        MoleculeObject {
            name: self.name.clone(),
            kind: self.kind,
            enabled: self.enabled,
            atoms,
            bonds,
            settings: self.settings.clone(),
        }
    }
}
