use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};

use seqdb_core::{Oid, Result, SeqDbError};

use crate::atlas::{Atlas, AtlasLock, RegionLease};

/// An OID mask (`OIDLIST`) file.
///
/// The file starts with the big-endian index of its last OID, followed by
/// a packed bitmap, most significant bit first. Bytes missing from the end
/// of the bitmap read as zero.
pub struct OidMaskFile {
    path: PathBuf,
    num_oids: Oid,
    bits: RegionLease,
}

impl OidMaskFile {
    pub fn open(atlas: &Atlas, path: &Path, lock: &mut AtlasLock<'_>) -> Result<Self> {
        let lease = atlas.get_file(path, lock)?;
        if lease.len() < 4 {
            return Err(SeqDbError::corrupt(path, "OID mask shorter than its header"));
        }
        let last = BigEndian::read_u32(&lease[..4]);
        let num_oids = last
            .checked_add(1)
            .ok_or_else(|| SeqDbError::corrupt(path, "OID mask count overflows"))?;
        let bits = lease
            .sub_lease(4, lease.end())
            .ok_or_else(|| SeqDbError::corrupt(path, "OID mask bitmap not addressable"))?;

        Ok(OidMaskFile {
            path: path.to_path_buf(),
            num_oids,
            bits,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of OIDs the mask describes.
    pub fn num_oids(&self) -> Oid {
        self.num_oids
    }

    /// The packed bitmap as stored (possibly shorter than `num_oids` bits).
    pub fn bits(&self) -> &[u8] {
        &self.bits
    }

    /// Byte `i` of the bitmap, zero past the end of the file.
    pub fn byte(&self, i: usize) -> u8 {
        self.bits.get(i).copied().unwrap_or(0)
    }

    pub fn is_set(&self, oid: Oid) -> bool {
        oid < self.num_oids && self.byte((oid / 8) as usize) & (0x80 >> (oid % 8)) != 0
    }
}
