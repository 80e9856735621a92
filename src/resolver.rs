//! Effective color resolution.
//!
//! An atom's display color for one representation kind comes from the first
//! level that defines a set (`>= 0`) override:
//!
//! ```text
//! unique-atom settings → custom bond settings (stick family) → molecule settings
//!         → workspace settings → atom base color
//! ```

use crate::types::{
    Atom, ColorId, MoleculeObject, RepresentationKind, UniqueSettingId, UniqueSettings,
    WorkspaceSettings,
};

/// Level of the precedence chain a resolved color came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSource {
    /// The atom's unique settings list.
    UniqueAtom,
    /// The unique settings list of a custom-colored bond.
    CustomBond,
    /// The molecule's complex-level settings.
    Molecule,
    /// Global workspace settings.
    Workspace,
    /// The atom's base color.
    AtomColor,
}

/// Per-molecule index from atom ordinal to the settings ids of its
/// custom-colored bonds, in bond order.
#[derive(Debug, Clone, Default)]
pub struct BondIndex {
    custom: Vec<Vec<UniqueSettingId>>,
}

impl BondIndex {
    /// Index the custom-colored bonds of `molecule`.
    ///
    /// Bonds without a settings id, or with endpoints outside the atom list,
    /// are skipped.
    pub fn build(molecule: &MoleculeObject) -> Self {
        let mut custom = vec![Vec::new(); molecule.atoms.len()];
        for bond in molecule.bonds.iter().filter(|b| b.has_custom_color) {
            let Some(setting_id) = bond.setting_id else {
                continue;
            };
            for ordinal in [bond.atom_a, bond.atom_b] {
                if let Some(slot) = custom.get_mut(ordinal) {
                    slot.push(setting_id);
                }
            }
        }
        Self { custom }
    }

    /// Settings ids of the custom-colored bonds touching `ordinal`.
    pub fn custom_settings(&self, ordinal: usize) -> &[UniqueSettingId] {
        self.custom.get(ordinal).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Resolves colors against the session-wide settings tables.
#[derive(Debug, Clone, Copy)]
pub struct ColorResolver<'a> {
    unique: &'a UniqueSettings,
    workspace: &'a WorkspaceSettings,
}

impl<'a> ColorResolver<'a> {
    /// Create a resolver over the unique and workspace tables.
    pub fn new(unique: &'a UniqueSettings, workspace: &'a WorkspaceSettings) -> Self {
        Self { unique, workspace }
    }

    /// Effective color of the atom at `ordinal` in `molecule` for `kind`.
    pub fn resolve(
        &self,
        atom: &Atom,
        ordinal: usize,
        kind: RepresentationKind,
        molecule: &MoleculeObject,
        bonds: &BondIndex,
    ) -> ColorId {
        self.resolve_with_source(atom, ordinal, kind, molecule, bonds).0
    }

    /// Like [`resolve`](Self::resolve), also reporting which level answered.
    pub fn resolve_with_source(
        &self,
        atom: &Atom,
        ordinal: usize,
        kind: RepresentationKind,
        molecule: &MoleculeObject,
        bonds: &BondIndex,
    ) -> (ColorId, ColorSource) {
        if let Some(color) = atom
            .unique_setting_id
            .and_then(|id| self.unique.color_for(id, kind))
        {
            return (color, ColorSource::UniqueAtom);
        }

        if kind.is_stick_family() {
            if let Some(color) = bonds
                .custom_settings(ordinal)
                .iter()
                .find_map(|&id| self.unique.color_for(id, kind))
            {
                return (color, ColorSource::CustomBond);
            }
        }

        if let Some(color) = molecule.settings.color_for(kind) {
            return (color, ColorSource::Molecule);
        }

        if let Some(color) = self.workspace.color_for(kind) {
            return (color, ColorSource::Workspace);
        }

        (atom.color, ColorSource::AtomColor)
    }
}
