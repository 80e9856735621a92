//! SDF writer
//!
//! Writes MDL SDF V2000 records, one record per frame, atoms in ordinal order.

use std::collections::BTreeMap;
use std::io::{self, Write};

use crate::types::MoleculeObject;

/// Largest atom or bond count a V2000 counts line can hold.
const V2000_MAX: usize = 999;

/// SDF V2000 writer
pub struct SdfWriter<W> {
    writer: W,
}

impl<W: Write> SdfWriter<W> {
    /// Create a new SDF writer
    pub fn new(writer: W) -> Self {
        SdfWriter { writer }
    }

    /// Write every frame of `mol` as a separate record.
    pub fn write(&mut self, mol: &MoleculeObject) -> io::Result<()> {
        for frame in mol.frames() {
            self.write_frame(mol, frame)?;
            writeln!(self.writer, "$$$$")?;
        }
        self.writer.flush()
    }

    fn write_frame(&mut self, mol: &MoleculeObject, frame: u32) -> io::Result<()> {
        // Molecule ordinal -> 1-based position in this record
        let mut position = BTreeMap::new();
        let atoms: Vec<_> = mol
            .atoms
            .iter()
            .enumerate()
            .filter(|(_, atom)| atom.frame == frame)
            .map(|(ordinal, atom)| {
                position.insert(ordinal, position.len() + 1);
                atom
            })
            .collect();

        let bonds: Vec<_> = mol
            .bonds
            .iter()
            .filter_map(|bond| {
                let a = position.get(&bond.atom_a)?;
                let b = position.get(&bond.atom_b)?;
                Some((*a, *b, bond.order.max(1)))
            })
            .collect();

        if atoms.len() > V2000_MAX || bonds.len() > V2000_MAX {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "'{}' frame {frame} is too large for V2000 ({} atoms, {} bonds)",
                    mol.name,
                    atoms.len(),
                    bonds.len()
                ),
            ));
        }

        writeln!(self.writer, "{}", mol.name)?;
        writeln!(self.writer, "  molz-export       3D")?;
        writeln!(self.writer)?;
        writeln!(
            self.writer,
            "{:3}{:3}  0  0  0  0  0  0  0  0999 V2000",
            atoms.len(),
            bonds.len()
        )?;

        for atom in atoms {
            let [x, y, z] = atom.site.coord;
            writeln!(
                self.writer,
                "{:10.4}{:10.4}{:10.4} {:<3} 0  0  0  0  0  0  0  0  0  0  0  0",
                x, y, z, atom.site.element
            )?;
        }

        for (a, b, order) in bonds {
            writeln!(self.writer, "{:3}{:3}{:3}  0  0  0  0", a, b, order)?;
        }

        writeln!(self.writer, "M  END")
    }
}
