//! Writers for small on-disk databases used by the integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use tempfile::TempDir;

use seqdb::{Oid, SeqDbConfig, SeqType};
use seqdb_core::FileKind;
use seqdb_core::utils::db_file_path;

/// A temporary directory holding volumes and alias files.
pub struct TestDir {
    pub dir: TempDir,
}

impl TestDir {
    pub fn new() -> Self {
        TestDir {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn base(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Settings that search this directory only.
    pub fn config(&self, use_mmap: bool) -> SeqDbConfig {
        SeqDbConfig {
            use_mmap,
            search_paths: vec![self.path().to_path_buf()],
            ..Default::default()
        }
    }

    /// Writes a protein volume; header `i` reads `<title>-<i>`.
    pub fn protein_volume(&self, name: &str, title: &str, residues: &[&str]) -> PathBuf {
        let records: Vec<(Vec<u8>, u32)> = residues
            .iter()
            .map(|r| {
                let mut stored = r.as_bytes().to_vec();
                stored.push(0);
                (stored, r.len() as u32)
            })
            .collect();
        self.write_volume(name, title, SeqType::Protein, &records)
    }

    /// Writes a protein volume of `count` sequences, `i + 1` residues each.
    pub fn sized_protein_volume(&self, name: &str, title: &str, count: usize) -> PathBuf {
        let residues: Vec<String> = (0..count).map(|i| "A".repeat(i + 1)).collect();
        let refs: Vec<&str> = residues.iter().map(String::as_str).collect();
        self.protein_volume(name, title, &refs)
    }

    /// Writes a nucleotide volume with sequences of the given base counts.
    pub fn nucleotide_volume(&self, name: &str, title: &str, lengths: &[u32]) -> PathBuf {
        let records: Vec<(Vec<u8>, u32)> = lengths
            .iter()
            .map(|&len| {
                let mut stored = vec![0x1bu8; (len / 4) as usize];
                stored.push((len % 4) as u8);
                (stored, len)
            })
            .collect();
        self.write_volume(name, title, SeqType::Nucleotide, &records)
    }

    fn write_volume(
        &self,
        name: &str,
        title: &str,
        seq_type: SeqType,
        records: &[(Vec<u8>, u32)],
    ) -> PathBuf {
        let base = self.base(name);
        let mut seq_file = Vec::new();
        let mut hdr_file = Vec::new();
        let (mut seq_offs, mut hdr_offs) = (vec![0u32], vec![0u32]);
        for (i, (stored, _)) in records.iter().enumerate() {
            seq_file.extend_from_slice(stored);
            seq_offs.push(seq_file.len() as u32);
            hdr_file.extend_from_slice(format!("{}-{}", title, i).as_bytes());
            hdr_offs.push(hdr_file.len() as u32);
        }
        let amb_offs = vec![0u32; records.len() + 1];
        let total: u64 = records.iter().map(|(_, len)| *len as u64).sum();
        let max = records.iter().map(|(_, len)| *len).max().unwrap_or(0);

        let mut idx = Vec::new();
        idx.write_u32::<BigEndian>(4).unwrap();
        idx.write_u32::<BigEndian>(seq_type.marker()).unwrap();
        for s in [title, "Jan 1, 2024  12:00 PM"] {
            idx.write_u32::<BigEndian>(s.len() as u32).unwrap();
            idx.extend_from_slice(s.as_bytes());
        }
        idx.write_u32::<BigEndian>(records.len() as u32).unwrap();
        idx.write_u64::<LittleEndian>(total).unwrap();
        idx.write_u32::<BigEndian>(max).unwrap();
        for table in [&hdr_offs, &seq_offs, &amb_offs] {
            for off in table.iter() {
                idx.write_u32::<BigEndian>(*off).unwrap();
            }
        }

        fs::write(db_file_path(&base, seq_type, FileKind::Index), idx).unwrap();
        fs::write(db_file_path(&base, seq_type, FileKind::Sequence), seq_file).unwrap();
        fs::write(db_file_path(&base, seq_type, FileKind::Header), hdr_file).unwrap();
        base
    }

    /// Writes `<name>.pal` or `<name>.nal`.
    pub fn alias(&self, name: &str, seq_type: SeqType, text: &str) -> PathBuf {
        let path = db_file_path(&self.base(name), seq_type, FileKind::Alias);
        fs::write(&path, text).unwrap();
        path
    }

    /// Writes an OID mask describing `num_oids` OIDs with `set` included.
    pub fn mask(&self, file_name: &str, num_oids: Oid, set: &[Oid]) -> PathBuf {
        let mut bits = vec![0u8; num_oids.div_ceil(8) as usize];
        for &oid in set {
            bits[(oid / 8) as usize] |= 0x80 >> (oid % 8);
        }
        let mut bytes = Vec::new();
        bytes.write_u32::<BigEndian>(num_oids - 1).unwrap();
        bytes.extend_from_slice(&bits);

        let path = self.base(file_name);
        fs::write(&path, bytes).unwrap();
        path
    }

    /// Writes a GI list in text form.
    pub fn text_gi_list(&self, file_name: &str, gis: &[u32]) -> PathBuf {
        let text: Vec<String> = gis.iter().map(u32::to_string).collect();
        let path = self.base(file_name);
        fs::write(&path, text.join("\n")).unwrap();
        path
    }

    /// Writes a GI list in binary form.
    pub fn binary_gi_list(&self, file_name: &str, gis: &[u32]) -> PathBuf {
        let mut bytes = Vec::new();
        bytes.write_u32::<BigEndian>(0xFFFF_FFFF).unwrap();
        bytes.write_u32::<BigEndian>(gis.len() as u32).unwrap();
        for &gi in gis {
            bytes.write_u32::<BigEndian>(gi).unwrap();
        }
        let path = self.base(file_name);
        fs::write(&path, bytes).unwrap();
        path
    }
}

/// Every OID the database yields through `check_or_find_oid`.
pub fn included_oids(db: &seqdb::SeqDb) -> Vec<Oid> {
    let mut out = Vec::new();
    let mut oid = 0;
    while db.check_or_find_oid(&mut oid).unwrap() {
        out.push(oid);
        oid += 1;
    }
    out
}
