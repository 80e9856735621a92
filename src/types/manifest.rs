//! Scene manifest written as `state.json` inside a `.molz` archive.
//!
//! Field names serialize in PascalCase and in declaration order, which is the
//! order the remote viewer expects.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::color::Rgba;

/// Structure file format of an exported molecule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureFormat {
    /// MDL SDF, for small molecules.
    Sdf,
    /// mmCIF, for macromolecules.
    Cif,
}

impl StructureFormat {
    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Sdf => "sdf",
            Self::Cif => "cif",
        }
    }

    /// Pick the format for a molecule with `present_atoms` atoms.
    ///
    /// Molecules below `threshold` atoms are small molecules.
    pub fn for_atom_count(present_atoms: usize, threshold: usize) -> Self {
        if present_atoms < threshold {
            Self::Sdf
        } else {
            Self::Cif
        }
    }
}

impl fmt::Display for StructureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// One exported structure file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StructureEntry {
    /// Molecule name in the session.
    pub name: String,
    /// File format.
    pub extension: StructureFormat,
    /// Asset file name inside `assets/`.
    pub identifier: String,
}

/// Indexed per-atom colors of one representation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ColorScheme {
    /// Distinct colors in first-seen order.
    pub library: Vec<Rgba>,
    /// One library index per selected atom.
    pub colors: Vec<usize>,
}

impl ColorScheme {
    /// Check that every color index points into the library.
    pub fn is_consistent(&self) -> bool {
        self.colors.iter().all(|&i| i < self.library.len())
    }
}

/// Per-atom sizing of one representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SizeScheme {
    /// Sizing mode.
    pub kind: String,
    /// Uniform scale factor.
    pub scale: f64,
    /// B-factor contribution.
    pub b_factor_factor: f64,
}

impl Default for SizeScheme {
    fn default() -> Self {
        Self {
            kind: "uniform".to_string(),
            scale: 1.0,
            b_factor_factor: 0.0,
        }
    }
}

/// One visual style applied to a component's selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Representation {
    /// Viewer representation kind (`cartoon`, `spacefill`, ...).
    pub kind: String,
    /// Colors.
    pub color_scheme: ColorScheme,
    /// Sizes.
    pub size_scheme: SizeScheme,
    /// Free-form parameters; always empty for now.
    pub parameters: BTreeMap<String, serde_json::Value>,
}

/// Atoms of one structure/frame shown with one representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RepresentationComponent {
    /// Identifier of the structure the selection refers to.
    pub structure: String,
    /// Display name.
    pub name: String,
    /// Zero-based model (frame) index.
    pub model: u32,
    /// Molecule-local atom ordinals.
    pub selection: Vec<usize>,
    /// Representations applied to the selection.
    pub representations: Vec<Representation>,
    /// Whether the component starts hidden.
    pub hidden: bool,
}

/// The complete scene manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SceneManifest {
    /// Manifest format version.
    pub version: String,
    /// Exported structures, in write order.
    pub structures: Vec<StructureEntry>,
    /// Components, in emission order.
    pub components: Vec<RepresentationComponent>,
}

impl SceneManifest {
    /// Create an empty manifest of the current version.
    pub fn new() -> Self {
        Self {
            version: crate::MANIFEST_VERSION.to_string(),
            structures: Vec::new(),
            components: Vec::new(),
        }
    }

    /// Find a structure entry by identifier.
    pub fn structure(&self, identifier: &str) -> Option<&StructureEntry> {
        self.structures.iter().find(|s| s.identifier == identifier)
    }
}

impl Default for SceneManifest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_threshold() {
        assert_eq!(StructureFormat::for_atom_count(149, 150), StructureFormat::Sdf);
        assert_eq!(StructureFormat::for_atom_count(150, 150), StructureFormat::Cif);
    }

    #[test]
    fn test_manifest_field_names() {
        let manifest = SceneManifest {
            version: "0.0.1".to_string(),
            structures: vec![StructureEntry {
                name: "Prot".to_string(),
                extension: StructureFormat::Cif,
                identifier: "Prot.cif".to_string(),
            }],
            components: vec![RepresentationComponent {
                structure: "Prot.cif".to_string(),
                name: "Cartoon".to_string(),
                model: 0,
                selection: vec![0, 1],
                representations: vec![Representation {
                    kind: "cartoon".to_string(),
                    color_scheme: ColorScheme {
                        library: vec![Rgba::new(255, 0, 0, 255)],
                        colors: vec![0, 0],
                    },
                    size_scheme: SizeScheme::default(),
                    parameters: BTreeMap::new(),
                }],
                hidden: false,
            }],
        };

        let json = serde_json::to_string(&manifest).unwrap();
        assert_eq!(
            json,
            concat!(
                r#"{"Version":"0.0.1","Structures":[{"Name":"Prot","Extension":"cif","Identifier":"Prot.cif"}],"#,
                r#""Components":[{"Structure":"Prot.cif","Name":"Cartoon","Model":0,"Selection":[0,1],"#,
                r#""Representations":[{"Kind":"cartoon","ColorScheme":{"Library":[[255,0,0,255]],"Colors":[0,0]},"#,
                r#""SizeScheme":{"Kind":"uniform","Scale":1.0,"BFactorFactor":0.0},"Parameters":{}}],"Hidden":false}]}"#,
            )
        );

        let parsed: SceneManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, manifest);
    }
}
