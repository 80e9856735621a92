//! Scene manifest construction.
//!
//! [`SceneBuilder`] walks a normalized [`Session`] and produces the
//! [`SceneManifest`] plus one structure asset per exported molecule.
//!
//! ## Ordering
//!
//! Components are emitted by molecule (session order), then frame ascending,
//! then representation kind in lexical order of kind names. Selections keep
//! the atom order of the molecule. Nothing here depends on hash iteration
//! order, so equal sessions give byte-identical manifests.
//!
//! ## Atom Ordinals
//!
//! Atoms not flagged present are pruned from a copy of the molecule before
//! anything is written. Selection indices are positions in that pruned atom
//! list, which is also the atom order of the written structure file.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex_lite::Regex;
use thiserror::Error;
use tracing::debug;

use crate::palette::ColorLookup;
use crate::resolver::{BondIndex, ColorResolver};
use crate::types::{
    decode, ColorId, ColorScheme, MoleculeObject, ObjectKind, Representation,
    RepresentationComponent, RepresentationKind, Rgba, SceneManifest, Session, SizeScheme,
    StructureEntry, StructureFormat,
};
use crate::DEFAULT_SMALL_MOLECULE_THRESHOLD;

/// Characters allowed in asset file names; everything else becomes `_`.
const ASSET_NAME_PATTERN: &str = r"[^A-Za-z0-9._-]";

/// Host capability: write a molecule's atoms to a structure file.
pub trait StructureWriter: Send + Sync {
    /// Write `molecule` to `path` in `format`.
    ///
    /// Atoms must be written in ordinal order so manifest selections address
    /// the same atoms in the file.
    fn write_structure(
        &self,
        molecule: &MoleculeObject,
        format: StructureFormat,
        path: &Path,
    ) -> std::io::Result<()>;
}

impl<W: StructureWriter + ?Sized> StructureWriter for Arc<W> {
    fn write_structure(
        &self,
        molecule: &MoleculeObject,
        format: StructureFormat,
        path: &Path,
    ) -> std::io::Result<()> {
        (**self).write_structure(molecule, format, path)
    }
}

/// Error type for scene building.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The structure writer failed.
    #[error("Failed to write structure for '{molecule}': {source}")]
    Write {
        /// Molecule name.
        molecule: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The color lookup does not know a resolved color.
    #[error("Unknown color {color} in '{molecule}'")]
    UnknownColor {
        /// Molecule name.
        molecule: String,
        /// Resolved color identifier.
        color: ColorId,
    },
    /// An atom carries frame index 0 (frames are 1-based).
    #[error("Atom #{atom} of '{molecule}' has frame index 0 (frames are 1-based)")]
    InvalidFrame {
        /// Molecule name.
        molecule: String,
        /// Atom ordinal in the session molecule.
        atom: usize,
    },
    /// The asset name pattern failed to compile.
    #[error("Invalid asset name pattern: {0}")]
    AssetPattern(#[from] regex_lite::Error),
}

/// Deduplicated, first-seen-order color library of one representation.
///
/// Entries are keyed by color identifier. Two identifiers that convert to the
/// same RGBA stay two entries.
#[derive(Debug, Clone, Default)]
pub struct ColorLibrary {
    ids: Vec<ColorId>,
    rgba: Vec<Rgba>,
    index: BTreeMap<ColorId, usize>,
}

impl ColorLibrary {
    /// Create an empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Library index of `id`, converting and appending it on first sight.
    ///
    /// Returns `None` if `lookup` cannot convert `id`.
    pub fn index_of<L: ColorLookup + ?Sized>(&mut self, id: ColorId, lookup: &L) -> Option<usize> {
        if let Some(&i) = self.index.get(&id) {
            return Some(i);
        }
        let rgba = lookup.rgba(id)?;
        let i = self.ids.len();
        self.ids.push(id);
        self.rgba.push(rgba);
        self.index.insert(id, i);
        Some(i)
    }

    /// Identifiers in library order.
    pub fn ids(&self) -> &[ColorId] {
        &self.ids
    }

    /// Map library indices back to color identifiers.
    pub fn identifiers(&self, colors: &[usize]) -> Option<Vec<ColorId>> {
        colors.iter().map(|&i| self.ids.get(i).copied()).collect()
    }

    /// Number of distinct colors.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if the library is empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Finish into a color scheme with the given per-atom indices.
    pub fn into_scheme(self, colors: Vec<usize>) -> ColorScheme {
        ColorScheme {
            library: self.rgba,
            colors,
        }
    }
}

/// Output of one build: the manifest and the written asset files.
#[derive(Debug, Clone)]
pub struct SceneBuild {
    /// Scene manifest.
    pub manifest: SceneManifest,
    /// Asset files, in structure order. File names equal the identifiers.
    pub assets: Vec<PathBuf>,
}

/// Assigns unique, file-system safe asset names.
struct AssetNames {
    unsafe_chars: Regex,
    used: BTreeSet<String>,
}

impl AssetNames {
    fn new() -> Result<Self, regex_lite::Error> {
        Ok(Self {
            unsafe_chars: Regex::new(ASSET_NAME_PATTERN)?,
            used: BTreeSet::new(),
        })
    }

    fn assign(&mut self, molecule: &str, format: StructureFormat) -> String {
        let mut stem = self.unsafe_chars.replace_all(molecule, "_").into_owned();
        if stem.is_empty() {
            stem = "molecule".to_string();
        }

        // Unique ignoring ASCII case
        let mut candidate = stem.clone();
        let mut n = 1;
        while self.used.contains(&candidate.to_ascii_lowercase()) {
            candidate = format!("{stem}_{n}");
            n += 1;
        }
        self.used.insert(candidate.to_ascii_lowercase());

        format!("{candidate}.{}", format.extension())
    }
}

/// Builds scene manifests from sessions.
pub struct SceneBuilder<'a, W: ?Sized, L: ?Sized> {
    writer: &'a W,
    colors: &'a L,
    threshold: usize,
}

impl<'a, W, L> SceneBuilder<'a, W, L>
where
    W: StructureWriter + ?Sized,
    L: ColorLookup + ?Sized,
{
    /// Create a builder over the host collaborators.
    pub fn new(writer: &'a W, colors: &'a L) -> Self {
        Self {
            writer,
            colors,
            threshold: DEFAULT_SMALL_MOLECULE_THRESHOLD,
        }
    }

    /// Set the present-atom count from which molecules are written as mmCIF.
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    /// Build the manifest, writing one asset per molecule into `asset_dir`.
    ///
    /// Any writer or color failure aborts the whole build, as does an atom
    /// in frame 0.
    pub fn build(&self, session: &Session, asset_dir: &Path) -> Result<SceneBuild, BuildError> {
        let resolver = ColorResolver::new(&session.unique_settings, &session.workspace_settings);
        let mut names = AssetNames::new()?;
        let mut manifest = SceneManifest::new();
        let mut assets = Vec::new();

        for source in &session.molecules {
            if source.kind != ObjectKind::Molecule {
                debug!(object = %source.name, "Skipping non-molecule object");
                continue;
            }

            if let Some(atom) = source.atoms.iter().position(|a| a.frame == 0) {
                return Err(BuildError::InvalidFrame {
                    molecule: source.name.clone(),
                    atom,
                });
            }

            let molecule = source.retain_present();
            if molecule.atoms.is_empty() {
                debug!(object = %source.name, "Skipping molecule without present atoms");
                continue;
            }

            let format = StructureFormat::for_atom_count(molecule.atoms.len(), self.threshold);
            let identifier = names.assign(&molecule.name, format);
            let path = asset_dir.join(&identifier);
            self.writer
                .write_structure(&molecule, format, &path)
                .map_err(|source| BuildError::Write {
                    molecule: molecule.name.clone(),
                    source,
                })?;

            debug!(
                molecule = %molecule.name,
                atoms = molecule.atoms.len(),
                %format,
                identifier = %identifier,
                "Wrote structure asset"
            );

            let components = self.components(&resolver, &molecule, &identifier)?;
            manifest.components.extend(components);
            manifest.structures.push(StructureEntry {
                name: molecule.name.clone(),
                extension: format,
                identifier,
            });
            assets.push(path);
        }

        Ok(SceneBuild { manifest, assets })
    }

    fn components(
        &self,
        resolver: &ColorResolver<'_>,
        molecule: &MoleculeObject,
        identifier: &str,
    ) -> Result<Vec<RepresentationComponent>, BuildError> {
        let bonds = BondIndex::build(molecule);
        let frames = molecule.frames();
        let single_frame = frames.len() == 1;
        let mut components = Vec::new();

        for frame in frames {
            let mut groups: BTreeMap<RepresentationKind, Vec<usize>> = BTreeMap::new();
            for (ordinal, atom) in molecule.atoms.iter().enumerate() {
                if atom.frame != frame {
                    continue;
                }
                for kind in decode(atom.representation_mask.bits()).iter() {
                    groups.entry(kind).or_default().push(ordinal);
                }
            }

            let model = if single_frame { 0 } else { frame - 1 };

            for (kind, selection) in groups {
                let mut library = ColorLibrary::new();
                let mut colors = Vec::with_capacity(selection.len());
                for &ordinal in &selection {
                    let atom = &molecule.atoms[ordinal];
                    let id = resolver.resolve(atom, ordinal, kind, molecule, &bonds);
                    let index = library.index_of(id, self.colors).ok_or_else(|| {
                        BuildError::UnknownColor {
                            molecule: molecule.name.clone(),
                            color: id,
                        }
                    })?;
                    colors.push(index);
                }

                components.push(RepresentationComponent {
                    structure: identifier.to_string(),
                    name: kind.display_name(),
                    model,
                    selection,
                    representations: vec![Representation {
                        kind: kind.manifest_kind().to_string(),
                        color_scheme: library.into_scheme(colors),
                        size_scheme: SizeScheme::default(),
                        parameters: BTreeMap::new(),
                    }],
                    hidden: !molecule.enabled,
                });
            }
        }

        Ok(components)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::PaletteColorLookup;
    use crate::types::{Atom, SettingKey, UniqueSettings, WorkspaceSettings};
    use parking_lot::Mutex;

    /// Writes a one-line placeholder and records what it was asked to write.
    #[derive(Default)]
    struct RecordingWriter {
        calls: Mutex<Vec<(String, StructureFormat, usize)>>,
    }

    impl StructureWriter for RecordingWriter {
        fn write_structure(
            &self,
            molecule: &MoleculeObject,
            format: StructureFormat,
            path: &Path,
        ) -> std::io::Result<()> {
            self.calls
                .lock()
                .push((molecule.name.clone(), format, molecule.atoms.len()));
            std::fs::write(path, format!("{} {}\n", molecule.name, format))
        }
    }

    struct FailingWriter;

    impl StructureWriter for FailingWriter {
        fn write_structure(&self, _: &MoleculeObject, _: StructureFormat, _: &Path) -> std::io::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
        }
    }

    fn palette() -> PaletteColorLookup {
        (0..16).fold(PaletteColorLookup::new(), |p, id| {
            p.with(id, [id as f32 / 16.0, 0.0, 1.0])
        })
    }

    /// Build into a scratch directory that lives as long as the result.
    fn build(session: &Session) -> (tempfile::TempDir, SceneBuild) {
        let dir = tempfile::tempdir().unwrap();
        let writer = RecordingWriter::default();
        let colors = palette();
        let built = SceneBuilder::new(&writer, &colors)
            .build(session, dir.path())
            .unwrap();
        (dir, built)
    }

    #[test]
    fn test_kinds_in_lexical_order() {
        // stick + surface + cartoon + line on every atom
        let mask = 1 | 4 | 32 | 128;
        let mol = MoleculeObject::new("m").with_atoms(vec![Atom::new(mask, ColorId(1)); 3]);
        let (_dir, built) = build(&Session::new(vec![mol]));

        let kinds: Vec<_> = built
            .manifest
            .components
            .iter()
            .map(|c| c.representations[0].kind.as_str())
            .collect();
        assert_eq!(kinds, vec!["cartoon", "line", "stick", "surface"]);
    }

    #[test]
    fn test_multi_frame_models() {
        let mol = MoleculeObject::new("traj").with_atoms(vec![
            Atom::new(32, ColorId(1)).in_frame(2),
            Atom::new(32, ColorId(1)).in_frame(1),
            Atom::new(32, ColorId(1)).in_frame(2),
        ]);
        let (_dir, built) = build(&Session::new(vec![mol]));

        let components = &built.manifest.components;
        assert_eq!(components.len(), 2);
        assert_eq!((components[0].model, components[0].selection.clone()), (0, vec![1]));
        assert_eq!((components[1].model, components[1].selection.clone()), (1, vec![0, 2]));
    }

    #[test]
    fn test_single_late_frame_is_model_zero() {
        let mol = MoleculeObject::new("m").with_atoms(vec![Atom::new(32, ColorId(1)).in_frame(4)]);
        let (_dir, built) = build(&Session::new(vec![mol]));
        assert_eq!(built.manifest.components[0].model, 0);
    }

    #[test]
    fn test_library_dedup_by_identifier() {
        let colors = PaletteColorLookup::new()
            .with(1, [1.0, 0.0, 0.0])
            .with(2, [1.0, 0.0, 0.0])
            .with(3, [0.0, 0.0, 1.0]);
        let ids = [ColorId(2), ColorId(1), ColorId(2), ColorId(3), ColorId(1)];

        let mut library = ColorLibrary::new();
        let indices: Vec<usize> = ids
            .iter()
            .map(|&id| library.index_of(id, &colors).unwrap())
            .collect();

        assert_eq!(indices, vec![0, 1, 0, 2, 1]);
        assert_eq!(library.len(), 3);
        assert_eq!(library.identifiers(&indices).unwrap(), ids.to_vec());

        let scheme = library.into_scheme(indices);
        assert!(scheme.is_consistent());
        // Same RGBA under two identifiers stays two entries
        assert_eq!(scheme.library[0], scheme.library[1]);
    }

    #[test]
    fn test_resolved_colors_in_scheme() {
        let mut unique = UniqueSettings::new();
        unique.insert(1, crate::types::SettingList::new().with(SettingKey::CartoonColor, ColorId(9)));
        let mol = MoleculeObject::new("m").with_atoms(vec![
            Atom::new(32, ColorId(3)),
            Atom::new(32, ColorId(3)).with_unique(1),
            Atom::new(32, ColorId(4)),
        ]);
        let session = Session::new(vec![mol]).with_unique_settings(unique);
        let (_dir, built) = build(&session);

        let scheme = &built.manifest.components[0].representations[0].color_scheme;
        assert_eq!(scheme.colors, vec![0, 1, 2]);
        assert_eq!(scheme.library.len(), 3);
        assert_eq!(scheme.library[1], palette().rgba(ColorId(9)).unwrap());
    }

    #[test]
    fn test_absent_atoms_pruned_from_selection() {
        let mut hole = Atom::new(32, ColorId(1));
        hole.present = false;
        let mol = MoleculeObject::new("m").with_atoms(vec![
            Atom::new(32, ColorId(1)),
            hole,
            Atom::new(32, ColorId(1)),
        ]);
        let (_dir, built) = build(&Session::new(vec![mol]));
        assert_eq!(built.manifest.components[0].selection, vec![0, 1]);
    }

    #[test]
    fn test_skips_empty_and_non_molecules() {
        let mut other = MoleculeObject::new("map").with_atoms(vec![Atom::new(32, ColorId(1))]);
        other.kind = ObjectKind::Other;
        let mut ghost = Atom::new(32, ColorId(1));
        ghost.present = false;
        let empty = MoleculeObject::new("ghost").with_atoms(vec![ghost]);
        let visible = MoleculeObject::new("m").with_atoms(vec![Atom::new(0, ColorId(1))]);

        let (_dir, built) = build(&Session::new(vec![other, empty, visible]));
        // A molecule with no decoded kinds still exports its structure
        assert_eq!(built.manifest.structures.len(), 1);
        assert_eq!(built.manifest.structures[0].name, "m");
        assert!(built.manifest.components.is_empty());
        assert_eq!(built.assets.len(), 1);
    }

    #[test]
    fn test_hidden_follows_enabled() {
        let mol = MoleculeObject::new("m")
            .with_atoms(vec![Atom::new(2, ColorId(1))])
            .enabled(false);
        let (_dir, built) = build(&Session::new(vec![mol]));
        let component = &built.manifest.components[0];
        assert!(component.hidden);
        assert_eq!(component.name, "Sphere");
        assert_eq!(component.representations[0].kind, "spacefill");
    }

    #[test]
    fn test_asset_names_sanitized_and_unique() {
        let mols = vec![
            MoleculeObject::new("my lig/1").with_atoms(vec![Atom::new(1, ColorId(1))]),
            MoleculeObject::new("my_lig_1").with_atoms(vec![Atom::new(1, ColorId(1))]),
        ];
        let (_dir, built) = build(&Session::new(mols));
        let ids: Vec<_> = built
            .manifest
            .structures
            .iter()
            .map(|s| s.identifier.as_str())
            .collect();
        assert_eq!(ids, vec!["my_lig_1.sdf", "my_lig_1_1.sdf"]);
        assert_eq!(built.manifest.components[1].structure, "my_lig_1_1.sdf");
        assert!(built.assets.iter().all(|p| p.exists()));
    }

    #[test]
    fn test_asset_names_unique_ignoring_case() {
        let mols = vec![
            MoleculeObject::new("Prot").with_atoms(vec![Atom::new(32, ColorId(1))]),
            MoleculeObject::new("prot").with_atoms(vec![Atom::new(32, ColorId(2))]),
        ];
        let (_dir, built) = build(&Session::new(mols));
        let ids: Vec<_> = built
            .manifest
            .structures
            .iter()
            .map(|s| s.identifier.as_str())
            .collect();
        assert_eq!(ids, vec!["Prot.sdf", "prot_1.sdf"]);
        assert_eq!(std::fs::read_to_string(&built.assets[1]).unwrap(), "prot sdf\n");
    }

    #[test]
    fn test_frame_zero_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RecordingWriter::default();
        let colors = palette();
        let mol = MoleculeObject::new("traj").with_atoms(vec![
            Atom::new(32, ColorId(1)).in_frame(1),
            Atom::new(32, ColorId(1)).in_frame(0),
        ]);
        let result = SceneBuilder::new(&writer, &colors).build(&Session::new(vec![mol]), dir.path());
        assert!(matches!(
            result,
            Err(BuildError::InvalidFrame { molecule, atom: 1 }) if molecule == "traj"
        ));
        assert!(writer.calls.lock().is_empty());
    }

    #[test]
    fn test_threshold_and_writer_input() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RecordingWriter::default();
        let colors = palette();
        let mols = vec![
            MoleculeObject::new("small").with_atoms(vec![Atom::new(1, ColorId(1)); 3]),
            MoleculeObject::new("big").with_atoms(vec![Atom::new(32, ColorId(1)); 4]),
        ];
        let built = SceneBuilder::new(&writer, &colors)
            .with_threshold(4)
            .build(&Session::new(mols), dir.path())
            .unwrap();

        assert_eq!(built.manifest.structures[0].extension, StructureFormat::Sdf);
        assert_eq!(built.manifest.structures[1].extension, StructureFormat::Cif);
        assert_eq!(
            *writer.calls.lock(),
            vec![
                ("small".to_string(), StructureFormat::Sdf, 3),
                ("big".to_string(), StructureFormat::Cif, 4),
            ]
        );
    }

    #[test]
    fn test_writer_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let colors = palette();
        let mol = MoleculeObject::new("m").with_atoms(vec![Atom::new(32, ColorId(1))]);
        let result = SceneBuilder::new(&FailingWriter, &colors).build(&Session::new(vec![mol]), dir.path());
        assert!(matches!(result, Err(BuildError::Write { molecule, .. }) if molecule == "m"));
    }

    #[test]
    fn test_unknown_color_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RecordingWriter::default();
        let colors = PaletteColorLookup::new();
        let session = Session::new(vec![MoleculeObject::new("m").with_atoms(vec![Atom::new(32, ColorId(77))])])
            .with_workspace_settings(WorkspaceSettings::new());
        let result = SceneBuilder::new(&writer, &colors).build(&session, dir.path());
        assert!(matches!(
            result,
            Err(BuildError::UnknownColor { color: ColorId(77), .. })
        ));
    }
}
