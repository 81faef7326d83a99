use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;

use seqdb_core::utils::db_file_path;
use seqdb_core::{FileKind, Oid, Result, SeqDbError, SeqType};

use crate::atlas::{Atlas, AtlasLock, FlushLeases, RegionLease};
use crate::blob_file::BlobFile;
use crate::index_file::{IndexFile, IndexHeader};

/// One physical database volume: an index, sequence and header file triple.
///
/// Metadata is read once at open time. The per-OID accessors return
/// [`RegionLease`]s into the sequence and header files; each file keeps its
/// most recent lease cached until [`Volume::unlease`] or an atlas flush.
pub struct Volume {
    base: PathBuf,
    seq_type: SeqType,
    atlas: Arc<Atlas>,
    idx: IndexFile,
    seq: BlobFile,
    hdr: BlobFile,
}

impl Volume {
    /// Opens the volume at `base` (the path without extension) and registers
    /// it with the atlas for lease flushing.
    pub fn open(
        atlas: &Arc<Atlas>,
        base: &Path,
        seq_type: SeqType,
        lock: &mut AtlasLock<'_>,
    ) -> Result<Arc<Volume>> {
        let idx_path = db_file_path(base, seq_type, FileKind::Index);
        let idx = IndexFile::open(atlas, &idx_path, seq_type, lock)?;
        let seq = BlobFile::open(atlas, &db_file_path(base, seq_type, FileKind::Sequence), lock)?;
        let hdr = BlobFile::open(atlas, &db_file_path(base, seq_type, FileKind::Header), lock)?;

        debug!(
            "Opened {} volume {} ({} sequences)",
            seq_type,
            base.display(),
            idx.num_seqs()
        );

        let volume = Arc::new(Volume {
            base: base.to_path_buf(),
            seq_type,
            atlas: Arc::clone(atlas),
            idx,
            seq,
            hdr,
        });
        let weak = Arc::downgrade(&volume);
        atlas.register_flush(weak, lock);
        Ok(volume)
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }

    pub fn seq_type(&self) -> SeqType {
        self.seq_type
    }

    pub fn atlas(&self) -> &Arc<Atlas> {
        &self.atlas
    }

    fn header(&self) -> &IndexHeader {
        self.idx.header()
    }

    pub fn num_oids(&self) -> Oid {
        self.header().num_seqs
    }

    pub fn total_length(&self) -> u64 {
        self.header().total_length
    }

    pub fn max_length(&self) -> u32 {
        self.header().max_length
    }

    pub fn title(&self) -> &str {
        &self.header().title
    }

    pub fn date(&self) -> &str {
        &self.header().date
    }

    pub fn format_version(&self) -> u32 {
        self.header().format_version
    }

    /// Exact residue count of one sequence.
    ///
    /// Nucleotide sequences store four bases per byte; the low two bits of
    /// the final byte give the number of bases it holds.
    pub fn seq_length(&self, oid: Oid, lock: &mut AtlasLock<'_>) -> Result<u32> {
        let (start, end) = self.idx.seq_start_end(oid, &self.atlas, lock)?;
        let whole = self.stored_bytes(oid, start, end)? - 1;
        match self.seq_type {
            SeqType::Protein => self.residues(oid, whole, 1, 0),
            SeqType::Nucleotide => {
                let last = self.seq.byte_at(&self.atlas, end - 1, lock)?;
                self.residues(oid, whole, 4, (last & 0x3) as u32)
            }
        }
    }

    /// Residue count without touching the sequence file.
    ///
    /// For nucleotides the remainder is estimated from the OID, so the
    /// result may differ from [`Volume::seq_length`] by up to three.
    pub fn approx_seq_length(&self, oid: Oid, lock: &mut AtlasLock<'_>) -> Result<u32> {
        let (start, end) = self.idx.seq_start_end(oid, &self.atlas, lock)?;
        let whole = self.stored_bytes(oid, start, end)? - 1;
        match self.seq_type {
            SeqType::Protein => self.residues(oid, whole, 1, 0),
            SeqType::Nucleotide => self.residues(oid, whole, 4, oid & 0x3),
        }
    }

    fn residues(&self, oid: Oid, whole: u64, per_byte: u64, extra: u32) -> Result<u32> {
        checked_residues(whole, per_byte, extra).ok_or_else(|| {
            SeqDbError::corrupt(
                self.idx.path(),
                format!("sequence {} spans more than {} residues", oid, u32::MAX),
            )
        })
    }

    fn stored_bytes(&self, oid: Oid, start: u64, end: u64) -> Result<u64> {
        if end <= start {
            return Err(SeqDbError::corrupt(
                self.idx.path(),
                format!("sequence {} has no stored bytes", oid),
            ));
        }
        Ok(end - start)
    }

    /// The stored header blob of one sequence.
    pub fn header_bytes(&self, oid: Oid, lock: &mut AtlasLock<'_>) -> Result<RegionLease> {
        let (start, end) = self.idx.hdr_start_end(oid, &self.atlas, lock)?;
        self.hdr.get_region(&self.atlas, start, end, lock)
    }

    /// The stored residues of one sequence; protein data excludes the
    /// trailing separator byte.
    pub fn sequence_bytes(&self, oid: Oid, lock: &mut AtlasLock<'_>) -> Result<RegionLease> {
        let (start, end) = self.idx.seq_start_end(oid, &self.atlas, lock)?;
        let end = match self.seq_type {
            SeqType::Protein => start + self.stored_bytes(oid, start, end)? - 1,
            SeqType::Nucleotide => end,
        };
        self.seq.get_region(&self.atlas, start, end, lock)
    }

    /// The ambiguity table of one sequence, read from the sequence file.
    pub fn ambiguity_bytes(&self, oid: Oid, lock: &mut AtlasLock<'_>) -> Result<RegionLease> {
        let (start, end) = self.idx.amb_start_end(oid, &self.atlas, lock)?;
        self.seq.get_region(&self.atlas, start, end, lock)
    }

    /// Drops every cached lease held by this volume.
    pub fn unlease(&self) {
        self.idx.unlease();
        self.seq.unlease();
        self.hdr.unlease();
    }
}

/// `whole * per_byte + extra`, or `None` if it does not fit a `u32`.
fn checked_residues(whole: u64, per_byte: u64, extra: u32) -> Option<u32> {
    whole
        .checked_mul(per_byte)
        .and_then(|n| n.checked_add(extra as u64))
        .and_then(|n| u32::try_from(n).ok())
}

impl FlushLeases for Volume {
    fn flush_leases(&self) -> bool {
        let idx = self.idx.try_unlease();
        let seq = self.seq.try_unlease();
        let hdr = self.hdr.try_unlease();
        idx && seq && hdr
    }
}

impl std::fmt::Debug for Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Volume")
            .field("base", &self.base)
            .field("seq_type", &self.seq_type)
            .field("num_oids", &self.num_oids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::fs;
    use tempfile::TempDir;

    /// Writes a volume whose sequences are given as stored bytes.
    fn write_volume(dir: &Path, name: &str, seq_type: SeqType, seqs: &[&[u8]]) -> PathBuf {
        let base = dir.join(name);
        let mut seq_file = Vec::new();
        let mut hdr_file = Vec::new();
        let (mut seq_offs, mut hdr_offs) = (vec![0u32], vec![0u32]);
        let amb_offs = vec![0u32; seqs.len() + 1];
        for (i, s) in seqs.iter().enumerate() {
            seq_file.extend_from_slice(s);
            seq_offs.push(seq_file.len() as u32);
            hdr_file.extend_from_slice(format!("hdr{}", i).as_bytes());
            hdr_offs.push(hdr_file.len() as u32);
        }

        let mut idx = Vec::new();
        idx.write_u32::<BigEndian>(4).unwrap();
        idx.write_u32::<BigEndian>(seq_type.marker()).unwrap();
        for s in [name, "2024-01-01"] {
            idx.write_u32::<BigEndian>(s.len() as u32).unwrap();
            idx.extend_from_slice(s.as_bytes());
        }
        idx.write_u32::<BigEndian>(seqs.len() as u32).unwrap();
        idx.write_u64::<LittleEndian>(100).unwrap();
        idx.write_u32::<BigEndian>(40).unwrap();
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

    #[rstest]
    fn test_protein_volume() {
        let dir = TempDir::new().unwrap();
        let base = write_volume(dir.path(), "prot", SeqType::Protein, &[&b"MKV\0"[..], &b"AC\0"[..]]);
        let atlas = Arc::new(Atlas::default());
        let mut lock = atlas.lock();
        let vol = Volume::open(&atlas, &base, SeqType::Protein, &mut lock).unwrap();

        assert_eq!(vol.num_oids(), 2);
        assert_eq!(vol.title(), "prot");
        assert_eq!(vol.date(), "2024-01-01");
        assert_eq!(vol.total_length(), 100);
        assert_eq!(vol.max_length(), 40);
        assert_eq!(vol.format_version(), 4);
        assert_eq!(vol.seq_length(0, &mut lock).unwrap(), 3);
        assert_eq!(vol.approx_seq_length(1, &mut lock).unwrap(), 2);
        assert_eq!(&vol.sequence_bytes(1, &mut lock).unwrap()[..], b"AC");
        assert_eq!(&vol.header_bytes(1, &mut lock).unwrap()[..], b"hdr1");
        assert!(vol.ambiguity_bytes(0, &mut lock).unwrap().is_empty());
        assert!(matches!(
            vol.seq_length(2, &mut lock),
            Err(SeqDbError::OidOutOfRange { oid: 2, num_oids: 2 })
        ));
    }

    #[rstest]
    #[case(0b0000_0010, 2, 6)]
    #[case(0b1110_0000, 0, 4)]
    #[case(0b0000_0011, 3, 7)]
    fn test_nucleotide_lengths(#[case] last: u8, #[case] oid: Oid, #[case] exact: u32) {
        let dir = TempDir::new().unwrap();
        let packed = [0xffu8, last];
        let seqs: Vec<&[u8]> = (0..=oid).map(|_| &packed[..]).collect();
        let base = write_volume(dir.path(), "nucl", SeqType::Nucleotide, &seqs);
        let atlas = Arc::new(Atlas::new(false, 1 << 20));
        let mut lock = atlas.lock();
        let vol = Volume::open(&atlas, &base, SeqType::Nucleotide, &mut lock).unwrap();

        assert_eq!(vol.seq_length(oid, &mut lock).unwrap(), exact);
        assert_eq!(vol.approx_seq_length(oid, &mut lock).unwrap(), 4 + (oid & 3));
        assert_eq!(vol.sequence_bytes(oid, &mut lock).unwrap().len(), 2);
    }

    #[rstest]
    #[case(3, 1, 0, Some(3))]
    #[case(u32::MAX as u64, 1, 0, Some(u32::MAX))]
    #[case(u32::MAX as u64 + 1, 1, 0, None)]
    #[case((1 << 30) - 1, 4, 3, Some(u32::MAX))]
    #[case(1 << 30, 4, 0, None)]
    fn test_residue_counts_fit_u32(
        #[case] whole: u64,
        #[case] per_byte: u64,
        #[case] extra: u32,
        #[case] expected: Option<u32>,
    ) {
        assert_eq!(checked_residues(whole, per_byte, extra), expected);
    }

    #[rstest]
    fn test_missing_component_file() {
        let dir = TempDir::new().unwrap();
        let base = write_volume(dir.path(), "prot", SeqType::Protein, &[&b"M\0"[..]]);
        fs::remove_file(db_file_path(&base, SeqType::Protein, FileKind::Header)).unwrap();
        let atlas = Arc::new(Atlas::default());
        let mut lock = atlas.lock();
        assert!(matches!(
            Volume::open(&atlas, &base, SeqType::Protein, &mut lock),
            Err(SeqDbError::FileNotFound(_))
        ));
    }

    #[rstest]
    fn test_flush_releases_volume_leases() {
        let dir = TempDir::new().unwrap();
        let base = write_volume(dir.path(), "prot", SeqType::Protein, &[&b"MKV\0"[..]]);
        let atlas = Arc::new(Atlas::default());
        let mut lock = atlas.lock();
        let vol = Volume::open(&atlas, &base, SeqType::Protein, &mut lock).unwrap();
        let _ = vol.header_bytes(0, &mut lock).unwrap();
        assert!(atlas.stats(&lock).pinned_regions > 0);

        atlas.flush(&mut lock);
        assert_eq!(atlas.stats(&lock).regions, 0);
        assert_eq!(&vol.sequence_bytes(0, &mut lock).unwrap()[..], b"MKV");
    }
}
