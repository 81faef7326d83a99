use std::path::Path;

use seqdb_core::Result;

use crate::atlas::{Atlas, AtlasLock, RegionLease};
use crate::raw_file::RawFile;

/// Stateless byte-range reader for sequence and header files.
///
/// The bytes are returned as stored. Their meaning (packed residues,
/// encoded deflines) belongs to the caller.
pub struct BlobFile {
    file: RawFile,
}

impl BlobFile {
    pub fn open(atlas: &Atlas, path: &Path, lock: &mut AtlasLock<'_>) -> Result<Self> {
        Ok(BlobFile {
            file: RawFile::open(atlas, path, lock)?,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn length(&self) -> u64 {
        self.file.length()
    }

    pub fn get_region(
        &self,
        atlas: &Atlas,
        start: u64,
        end: u64,
        lock: &mut AtlasLock<'_>,
    ) -> Result<RegionLease> {
        self.file.region(atlas, start, end, lock)
    }

    /// The single byte at `offset`.
    pub fn byte_at(&self, atlas: &Atlas, offset: u64, lock: &mut AtlasLock<'_>) -> Result<u8> {
        let lease = self.file.region(atlas, offset, offset + 1, lock)?;
        Ok(lease[0])
    }

    pub fn unlease(&self) {
        self.file.unlease();
    }

    pub fn try_unlease(&self) -> bool {
        self.file.try_unlease()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_blob_bytes_are_returned_as_stored() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\x01\x02MKV\x00").unwrap();
        file.flush().unwrap();

        let atlas = Atlas::default();
        let mut lock = atlas.lock();
        let blob = BlobFile::open(&atlas, file.path(), &mut lock).unwrap();
        assert_eq!(&blob.get_region(&atlas, 2, 5, &mut lock).unwrap()[..], b"MKV");
        assert_eq!(blob.byte_at(&atlas, 1, &mut lock).unwrap(), 2);
        assert_eq!(blob.length(), 6);
    }
}
