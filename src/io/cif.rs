//! mmCIF writer
//!
//! Writes a single data block with an `atom_site` loop. Each frame becomes one
//! model (`pdbx_PDB_model_num` = frame index); atoms keep ordinal order.

use std::io::{self, Write};

use crate::types::MoleculeObject;

/// mmCIF writer
pub struct CifWriter<W> {
    writer: W,
}

impl<W: Write> CifWriter<W> {
    /// Create a new CIF writer
    pub fn new(writer: W) -> Self {
        CifWriter { writer }
    }

    /// Quote a value for CIF if needed
    fn escape_value(s: &str) -> String {
        if s.is_empty() {
            return ".".to_string();
        }
        if s.contains(char::is_whitespace) || s.contains('\'') || s.contains('"') {
            if s.contains('\'') {
                format!("\"{}\"", s)
            } else {
                format!("'{}'", s)
            }
        } else {
            s.to_string()
        }
    }

    /// Write the molecule
    pub fn write(&mut self, mol: &MoleculeObject) -> io::Result<()> {
        let name: &str = if mol.name.is_empty() {
            "molecule"
        } else {
            &mol.name
        };
        let block: String = name
            .chars()
            .map(|c| if c.is_whitespace() { '_' } else { c })
            .collect();

        writeln!(self.writer, "data_{}", block)?;
        writeln!(self.writer, "#")?;
        writeln!(self.writer, "_entry.id {}", Self::escape_value(name))?;
        writeln!(self.writer, "#")?;

        writeln!(self.writer, "loop_")?;
        for field in [
            "group_PDB",
            "id",
            "type_symbol",
            "label_atom_id",
            "label_comp_id",
            "label_asym_id",
            "label_seq_id",
            "Cartn_x",
            "Cartn_y",
            "Cartn_z",
            "auth_seq_id",
            "auth_asym_id",
            "pdbx_PDB_model_num",
        ] {
            writeln!(self.writer, "_atom_site.{}", field)?;
        }

        for (ordinal, atom) in mol.atoms.iter().enumerate() {
            let site = &atom.site;
            let chain: &str = if site.chain.is_empty() { "A" } else { &site.chain };
            let resn: &str = if site.resn.is_empty() { "UNK" } else { &site.resn };
            let atom_name: &str = if site.name.is_empty() {
                &site.element
            } else {
                &site.name
            };
            let [x, y, z] = site.coord;

            writeln!(
                self.writer,
                "ATOM {} {} {} {} {} {} {:.3} {:.3} {:.3} {} {} {}",
                ordinal + 1,
                site.element,
                Self::escape_value(atom_name),
                Self::escape_value(resn),
                Self::escape_value(chain),
                site.resi,
                x,
                y,
                z,
                site.resi,
                Self::escape_value(chain),
                atom.frame
            )?;
        }

        writeln!(self.writer, "#")?;
        self.writer.flush()
    }
}
