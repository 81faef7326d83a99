use std::io::{Cursor, Read};
use std::path::Path;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};

use seqdb_core::consts::FORMAT_VERSION;
use seqdb_core::{Oid, Result, SeqDbError, SeqType};

use crate::atlas::{Atlas, AtlasLock};
use crate::raw_file::RawFile;

/// Fixed header of an index file, decoded once at open time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHeader {
    pub format_version: u32,
    pub seq_type: SeqType,
    pub title: String,
    pub date: String,
    pub num_seqs: u32,
    pub total_length: u64,
    pub max_length: u32,
}

/// Reader for the `.pin` / `.nin` file of a volume.
///
/// Layout (integers big-endian unless noted):
///
/// ```text
/// u32 version | u32 seq type | u32 len + title | u32 len + date
/// u32 num_seqs | u64 total_length (little-endian) | u32 max_length
/// u32 hdr_offsets[num_seqs + 1]
/// u32 seq_offsets[num_seqs + 1]
/// u32 amb_offsets[num_seqs + 1]
/// ```
pub struct IndexFile {
    file: RawFile,
    header: IndexHeader,
    hdr_table: u64,
    seq_table: u64,
    amb_table: u64,
}

impl IndexFile {
    /// Opens and validates an index file.
    ///
    /// Fails with `VersionMismatch` or `SeqTypeMismatch` when the header
    /// disagrees with what is expected, and with `CorruptFile` when the file
    /// is too short for the tables it declares.
    pub fn open(
        atlas: &Atlas,
        path: &Path,
        seq_type: SeqType,
        lock: &mut AtlasLock<'_>,
    ) -> Result<Self> {
        let file = RawFile::open(atlas, path, lock)?;
        let lease = file.region(atlas, 0, file.length(), lock)?;

        let mut rdr = Cursor::new(&lease[..]);
        let truncated = |_| SeqDbError::corrupt(path, "truncated index header");

        let format_version = rdr.read_u32::<BigEndian>().map_err(truncated)?;
        if format_version != FORMAT_VERSION {
            return Err(SeqDbError::VersionMismatch {
                path: path.to_path_buf(),
                found: format_version,
                expected: FORMAT_VERSION,
            });
        }

        let marker = rdr.read_u32::<BigEndian>().map_err(truncated)?;
        let found = SeqType::from_marker(marker).ok_or_else(|| {
            SeqDbError::corrupt(path, format!("unknown sequence type marker {}", marker))
        })?;
        if found != seq_type {
            return Err(SeqDbError::SeqTypeMismatch {
                path: path.to_path_buf(),
                found: found.to_string(),
                requested: seq_type.to_string(),
            });
        }

        let title = read_prefixed_string(&mut rdr).map_err(truncated)?;
        let date = read_prefixed_string(&mut rdr).map_err(truncated)?;
        let num_seqs = rdr.read_u32::<BigEndian>().map_err(truncated)?;
        let total_length = rdr.read_u64::<LittleEndian>().map_err(truncated)?;
        let max_length = rdr.read_u32::<BigEndian>().map_err(truncated)?;

        let table_bytes = (num_seqs as u64 + 1) * 4;
        let hdr_table = rdr.position();
        let seq_table = hdr_table + table_bytes;
        let amb_table = seq_table + table_bytes;
        let needed = amb_table + table_bytes;
        if needed > file.length() {
            return Err(SeqDbError::corrupt(
                path,
                format!(
                    "{} sequences need {} bytes of offset tables, file has {}",
                    num_seqs,
                    needed,
                    file.length()
                ),
            ));
        }

        Ok(IndexFile {
            file,
            header: IndexHeader {
                format_version,
                seq_type: found,
                title,
                date,
                num_seqs,
                total_length,
                max_length,
            },
            hdr_table,
            seq_table,
            amb_table,
        })
    }

    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn num_seqs(&self) -> u32 {
        self.header.num_seqs
    }

    pub fn hdr_start_end(
        &self,
        oid: Oid,
        atlas: &Atlas,
        lock: &mut AtlasLock<'_>,
    ) -> Result<(u64, u64)> {
        self.start_end(self.hdr_table, oid, atlas, lock)
    }

    pub fn seq_start_end(
        &self,
        oid: Oid,
        atlas: &Atlas,
        lock: &mut AtlasLock<'_>,
    ) -> Result<(u64, u64)> {
        self.start_end(self.seq_table, oid, atlas, lock)
    }

    pub fn amb_start_end(
        &self,
        oid: Oid,
        atlas: &Atlas,
        lock: &mut AtlasLock<'_>,
    ) -> Result<(u64, u64)> {
        self.start_end(self.amb_table, oid, atlas, lock)
    }

    fn start_end(
        &self,
        table: u64,
        oid: Oid,
        atlas: &Atlas,
        lock: &mut AtlasLock<'_>,
    ) -> Result<(u64, u64)> {
        if oid >= self.header.num_seqs {
            return Err(SeqDbError::OidOutOfRange {
                oid,
                num_oids: self.header.num_seqs,
            });
        }
        let at = table + oid as u64 * 4;
        let start = self.file.read_u32_be(atlas, at, lock)? as u64;
        let end = self.file.read_u32_be(atlas, at + 4, lock)? as u64;
        if end < start {
            return Err(SeqDbError::corrupt(
                self.file.path(),
                format!("offsets for OID {} run backwards ({} > {})", oid, start, end),
            ));
        }
        Ok((start, end))
    }

    pub fn unlease(&self) {
        self.file.unlease();
    }

    pub fn try_unlease(&self) -> bool {
        self.file.try_unlease()
    }
}

fn read_prefixed_string(rdr: &mut Cursor<&[u8]>) -> std::io::Result<String> {
    let len = rdr.read_u32::<BigEndian>()? as u64;
    let remaining = (rdr.get_ref().len() as u64).saturating_sub(rdr.position());
    if len > remaining {
        return Err(std::io::ErrorKind::UnexpectedEof.into());
    }
    let mut buf = vec![0u8; len as usize];
    rdr.read_exact(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
