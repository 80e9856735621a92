//! Color override settings at the unique-atom, molecule and workspace levels.
//!
//! Settings arrive from the host as `(numeric id, value)` pairs. Only the
//! per-representation color keys matter for export; every other id is
//! dropped during normalization.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::color::ColorId;
use super::representation::RepresentationKind;

/// Identifier of a unique-atom (or unique-bond) settings list.
pub type UniqueSettingId = i32;

/// Per-representation color setting key.
///
/// Discriminants are the host's stable setting indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKey {
    /// `surface_color`
    SurfaceColor = 144,
    /// `mesh_color`
    MeshColor = 146,
    /// `ribbon_color`
    RibbonColor = 235,
    /// `cartoon_color`
    CartoonColor = 236,
    /// `stick_color`, shared by stick and ball-and-stick
    StickColor = 376,
    /// `line_color`
    LineColor = 526,
}

impl SettingKey {
    /// Host setting index.
    pub fn id(&self) -> u32 {
        *self as u32
    }

    /// Look up a key by host setting index. Unknown indices return `None`.
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            144 => Some(Self::SurfaceColor),
            146 => Some(Self::MeshColor),
            235 => Some(Self::RibbonColor),
            236 => Some(Self::CartoonColor),
            376 => Some(Self::StickColor),
            526 => Some(Self::LineColor),
            _ => None,
        }
    }

    /// The key that overrides the color of `kind`, if any.
    pub fn for_kind(kind: RepresentationKind) -> Option<Self> {
        match kind {
            RepresentationKind::Surface => Some(Self::SurfaceColor),
            RepresentationKind::Cartoon => Some(Self::CartoonColor),
            RepresentationKind::Line => Some(Self::LineColor),
            RepresentationKind::Stick | RepresentationKind::BallAndStick => Some(Self::StickColor),
            RepresentationKind::Sphere | RepresentationKind::Label => None,
        }
    }

    /// Host setting name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SurfaceColor => "surface_color",
            Self::MeshColor => "mesh_color",
            Self::RibbonColor => "ribbon_color",
            Self::CartoonColor => "cartoon_color",
            Self::StickColor => "stick_color",
            Self::LineColor => "line_color",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered list of color overrides (unique-atom or molecule level).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingList {
    entries: Vec<(SettingKey, ColorId)>,
}

impl SettingList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn push(&mut self, key: SettingKey, value: ColorId) {
        self.entries.push((key, value));
    }

    /// Builder-style append.
    pub fn with(mut self, key: SettingKey, value: ColorId) -> Self {
        self.push(key, value);
        self
    }

    /// First set (`>= 0`) value stored under `key`.
    pub fn get(&self, key: SettingKey) -> Option<ColorId> {
        self.entries
            .iter()
            .find(|(k, v)| *k == key && v.is_set())
            .map(|(_, v)| *v)
    }

    /// Color override for `kind`, if the list defines one.
    pub fn color_for(&self, kind: RepresentationKind) -> Option<ColorId> {
        SettingKey::for_kind(kind).and_then(|key| self.get(key))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(SettingKey, ColorId)> for SettingList {
    fn from_iter<I: IntoIterator<Item = (SettingKey, ColorId)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Unique-atom level: settings lists addressed by unique id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniqueSettings {
    lists: BTreeMap<UniqueSettingId, SettingList>,
}

impl UniqueSettings {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the list for `id`.
    pub fn insert(&mut self, id: UniqueSettingId, list: SettingList) {
        self.lists.insert(id, list);
    }

    /// Color override for `kind` in the list addressed by `id`.
    pub fn color_for(&self, id: UniqueSettingId, kind: RepresentationKind) -> Option<ColorId> {
        self.lists.get(&id).and_then(|list| list.color_for(kind))
    }

    /// Number of lists.
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}

/// Workspace level: one global value per key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceSettings {
    values: BTreeMap<SettingKey, ColorId>,
}

impl WorkspaceSettings {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value. A later definition replaces an earlier one.
    pub fn set(&mut self, key: SettingKey, value: ColorId) {
        self.values.insert(key, value);
    }

    /// Builder-style set.
    pub fn with(mut self, key: SettingKey, value: ColorId) -> Self {
        self.set(key, value);
        self
    }

    /// Color override for `kind`, ignoring unset values.
    pub fn color_for(&self, kind: RepresentationKind) -> Option<ColorId> {
        SettingKey::for_kind(kind)
            .and_then(|key| self.values.get(&key).copied())
            .filter(ColorId::is_set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ids_roundtrip() {
        for key in [
            SettingKey::SurfaceColor,
            SettingKey::MeshColor,
            SettingKey::RibbonColor,
            SettingKey::CartoonColor,
            SettingKey::StickColor,
            SettingKey::LineColor,
        ] {
            assert_eq!(SettingKey::from_id(key.id()), Some(key));
        }
        assert_eq!(SettingKey::from_id(0), None);
        assert_eq!(SettingKey::from_id(173), None);
    }

    #[test]
    fn test_stick_family_shares_key() {
        assert_eq!(SettingKey::for_kind(RepresentationKind::Stick), Some(SettingKey::StickColor));
        assert_eq!(
            SettingKey::for_kind(RepresentationKind::BallAndStick),
            Some(SettingKey::StickColor)
        );
        assert_eq!(SettingKey::for_kind(RepresentationKind::Sphere), None);
    }

    #[test]
    fn test_negative_values_are_unset() {
        let list = SettingList::new()
            .with(SettingKey::CartoonColor, ColorId(-1))
            .with(SettingKey::CartoonColor, ColorId(4));
        assert_eq!(list.color_for(RepresentationKind::Cartoon), Some(ColorId(4)));

        let workspace = WorkspaceSettings::new().with(SettingKey::LineColor, ColorId(-1));
        assert_eq!(workspace.color_for(RepresentationKind::Line), None);
    }

    #[test]
    fn test_first_set_entry_wins() {
        let list = SettingList::new()
            .with(SettingKey::SurfaceColor, ColorId(2))
            .with(SettingKey::SurfaceColor, ColorId(3));
        assert_eq!(list.color_for(RepresentationKind::Surface), Some(ColorId(2)));
    }

    #[test]
    fn test_unique_lookup() {
        let mut unique = UniqueSettings::new();
        unique.insert(9, SettingList::new().with(SettingKey::StickColor, ColorId(11)));
        assert_eq!(unique.color_for(9, RepresentationKind::BallAndStick), Some(ColorId(11)));
        assert_eq!(unique.color_for(9, RepresentationKind::Cartoon), None);
        assert_eq!(unique.color_for(10, RepresentationKind::Stick), None);
    }
}
