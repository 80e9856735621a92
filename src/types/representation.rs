//! Representation kinds and the style bitmask decoder.
//!
//! The host stores an atom's visible styles as a dense bitmask. Decoding
//! turns it into a set of [`RepresentationKind`]s with one exclusivity rule:
//! stick, sphere and ball-and-stick are mutually exclusive.
//!
//! ## Bit Layout
//!
//! | Bit | Meaning |
//! |-----|---------|
//! | 0 | stick |
//! | 1 | sphere |
//! | 2 | surface |
//! | 3 | label |
//! | 4 | non-bonded sphere |
//! | 5 | cartoon |
//! | 7 | line |
//!
//! Bit 6 and everything above bit 7 are ignored.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named visual style derivable from an atom's style bitmask.
///
/// Variants are declared in lexical order of their names, so the derived
/// `Ord` is the fixed ordering used when emitting components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepresentationKind {
    /// Sticks with spheres at the atom centers.
    BallAndStick,
    /// Secondary-structure cartoon.
    Cartoon,
    /// Text label.
    Label,
    /// Wire lines.
    Line,
    /// Van der Waals spheres (emitted as `spacefill`).
    Sphere,
    /// Sticks.
    Stick,
    /// Molecular surface.
    Surface,
}

impl RepresentationKind {
    /// All kinds in their fixed emission order.
    pub const ALL: [RepresentationKind; 7] = [
        Self::BallAndStick,
        Self::Cartoon,
        Self::Label,
        Self::Line,
        Self::Sphere,
        Self::Stick,
        Self::Surface,
    ];

    /// Internal kind name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BallAndStick => "ball-and-stick",
            Self::Cartoon => "cartoon",
            Self::Label => "label",
            Self::Line => "line",
            Self::Sphere => "sphere",
            Self::Stick => "stick",
            Self::Surface => "surface",
        }
    }

    /// Name written to the manifest `Kind` field.
    ///
    /// Identical to [`as_str`](Self::as_str) except that `sphere` is
    /// relabeled `spacefill`.
    pub fn manifest_kind(&self) -> &'static str {
        match self {
            Self::Sphere => "spacefill",
            other => other.as_str(),
        }
    }

    /// Component display name: first character upper-cased, rest lower-cased.
    pub fn display_name(&self) -> String {
        let name = self.as_str();
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
            None => String::new(),
        }
    }

    /// Whether this kind draws bonds as sticks.
    ///
    /// Only these kinds honor per-bond custom colors.
    pub fn is_stick_family(&self) -> bool {
        matches!(self, Self::Stick | Self::BallAndStick)
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl FromStr for RepresentationKind {
    type Err = String;

    /// Parse a kind from its internal name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown representation kind '{s}'"))
    }
}

impl fmt::Display for RepresentationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw style bitmask of one atom.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepresentationMask(pub u32);

impl RepresentationMask {
    /// Stick bit.
    pub const STICK: u32 = 1 << 0;
    /// Sphere bit.
    pub const SPHERE: u32 = 1 << 1;
    /// Surface bit.
    pub const SURFACE: u32 = 1 << 2;
    /// Label bit.
    pub const LABEL: u32 = 1 << 3;
    /// Non-bonded sphere bit.
    pub const NB_SPHERE: u32 = 1 << 4;
    /// Cartoon bit.
    pub const CARTOON: u32 = 1 << 5;
    /// Line bit.
    pub const LINE: u32 = 1 << 7;

    /// Wrap a raw mask.
    pub fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits.
    pub fn bits(&self) -> u32 {
        self.0
    }

    fn has(&self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    /// Decode into representation kinds. See [`decode`].
    pub fn decode(&self) -> RepresentationSet {
        decode(self.0)
    }
}

/// Small ordered set of [`RepresentationKind`]s.
///
/// Iteration always follows [`RepresentationKind::ALL`] order, independent of
/// insertion order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RepresentationSet(u8);

impl RepresentationSet {
    /// The empty set.
    pub fn empty() -> Self {
        Self(0)
    }

    /// Add a kind.
    pub fn insert(&mut self, kind: RepresentationKind) {
        self.0 |= kind.bit();
    }

    /// Check membership.
    pub fn contains(&self, kind: RepresentationKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Number of kinds in the set.
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Iterate kinds in fixed order.
    pub fn iter(&self) -> impl Iterator<Item = RepresentationKind> + '_ {
        RepresentationKind::ALL.into_iter().filter(move |kind| self.contains(*kind))
    }
}

impl FromIterator<RepresentationKind> for RepresentationSet {
    fn from_iter<I: IntoIterator<Item = RepresentationKind>>(iter: I) -> Self {
        let mut set = Self::empty();
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

/// Decode a style bitmask into the set of representation kinds it shows.
///
/// Pure and total over every `u32`. When stick or sphere is set, the
/// non-bonded sphere bit is suppressed, so at most one of stick, sphere and
/// ball-and-stick is ever returned.
pub fn decode(mask: u32) -> RepresentationSet {
    let mut set = RepresentationSet::empty();
    if mask == 0 {
        return set;
    }
    let mask = RepresentationMask(mask);

    let stick = mask.has(RepresentationMask::STICK);
    let sphere = mask.has(RepresentationMask::SPHERE);
    let suppress_nb_sphere = match (stick, sphere) {
        (true, true) => {
            set.insert(RepresentationKind::BallAndStick);
            true
        }
        (true, false) => {
            set.insert(RepresentationKind::Stick);
            true
        }
        (false, true) => {
            set.insert(RepresentationKind::Sphere);
            true
        }
        (false, false) => false,
    };

    if mask.has(RepresentationMask::SURFACE) {
        set.insert(RepresentationKind::Surface);
    }
    if mask.has(RepresentationMask::LABEL) {
        set.insert(RepresentationKind::Label);
    }
    if mask.has(RepresentationMask::NB_SPHERE) && !suppress_nb_sphere {
        set.insert(RepresentationKind::Sphere);
    }
    if mask.has(RepresentationMask::CARTOON) {
        set.insert(RepresentationKind::Cartoon);
    }
    if mask.has(RepresentationMask::LINE) {
        set.insert(RepresentationKind::Line);
    }

    set
}
