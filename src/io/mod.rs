//! Structure file writers.
//!
//! [`SiteStructureWriter`] is the built-in [`StructureWriter`]: it renders the
//! per-atom site data carried in a session snapshot as MDL SDF V2000 (small
//! molecules) or mmCIF `atom_site` records (macromolecules). Hosts with their
//! own exporters plug those in instead.

pub mod cif;
pub mod sdf;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::builder::StructureWriter;
use crate::types::{MoleculeObject, StructureFormat};

pub use cif::CifWriter;
pub use sdf::SdfWriter;

/// Writes structure files from the atom site data of a session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SiteStructureWriter;

impl SiteStructureWriter {
    /// Create a new writer.
    pub fn new() -> Self {
        Self
    }

    /// Write `molecule` in `format` to any byte sink.
    pub fn write_to<W: Write>(
        &self,
        writer: W,
        molecule: &MoleculeObject,
        format: StructureFormat,
    ) -> std::io::Result<()> {
        match format {
            StructureFormat::Sdf => SdfWriter::new(writer).write(molecule),
            StructureFormat::Cif => CifWriter::new(writer).write(molecule),
        }
    }
}

impl StructureWriter for SiteStructureWriter {
    fn write_structure(
        &self,
        molecule: &MoleculeObject,
        format: StructureFormat,
        path: &Path,
    ) -> std::io::Result<()> {
        let mut file = BufWriter::new(File::create(path)?);
        self.write_to(&mut file, molecule, format)?;
        file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Atom, ColorId};

    #[test]
    fn test_writes_file_per_format() {
        let dir = tempfile::tempdir().unwrap();
        let mol = MoleculeObject::new("lig").with_atoms(vec![Atom::new(1, ColorId(0)); 2]);

        let sdf = dir.path().join("lig.sdf");
        SiteStructureWriter::new()
            .write_structure(&mol, StructureFormat::Sdf, &sdf)
            .unwrap();
        assert!(std::fs::read_to_string(&sdf).unwrap().contains("V2000"));

        let cif = dir.path().join("lig.cif");
        SiteStructureWriter::new()
            .write_structure(&mol, StructureFormat::Cif, &cif)
            .unwrap();
        assert!(std::fs::read_to_string(&cif).unwrap().starts_with("data_lig"));
    }

    #[test]
    fn test_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("m.sdf");
        let mol = MoleculeObject::new("m").with_atoms(vec![Atom::new(1, ColorId(0))]);
        assert!(SiteStructureWriter::new()
            .write_structure(&mol, StructureFormat::Sdf, &path)
            .is_err());
    }
}
