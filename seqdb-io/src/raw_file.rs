use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};
use parking_lot::Mutex;

use seqdb_core::{Result, SeqDbError};

use crate::atlas::{Atlas, AtlasLock, RegionLease};

/// One database file with a cached lease on its most recent region.
///
/// The cached lease lets repeated reads from the same file skip the region
/// table. It can be dropped at any time with [`RawFile::unlease`]; the next
/// read re-acquires it.
pub struct RawFile {
    path: PathBuf,
    length: u64,
    lease: Mutex<Option<RegionLease>>,
}

impl RawFile {
    /// Opens a file through the atlas. Fails if it does not exist.
    pub fn open(atlas: &Atlas, path: &Path, lock: &mut AtlasLock<'_>) -> Result<Self> {
        let length = atlas
            .file_size(path, lock)
            .ok_or_else(|| SeqDbError::FileNotFound(path.to_path_buf()))?;
        Ok(RawFile {
            path: path.to_path_buf(),
            length,
            lease: Mutex::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    /// Leases `[start, end)` of the file.
    pub fn region(
        &self,
        atlas: &Atlas,
        start: u64,
        end: u64,
        lock: &mut AtlasLock<'_>,
    ) -> Result<RegionLease> {
        if start > end || end > self.length {
            return Err(SeqDbError::corrupt(
                &self.path,
                format!(
                    "offsets [{}, {}) exceed the file length {}",
                    start, end, self.length
                ),
            ));
        }

        let mut cached = self.lease.lock();
        if let Some(lease) = cached.as_ref().and_then(|l| l.sub_lease(start, end)) {
            return Ok(lease);
        }
        let lease = atlas.get_region(&self.path, start, end, lock)?;
        *cached = Some(lease.whole_region());
        Ok(lease)
    }

    pub fn read_u32_be(&self, atlas: &Atlas, offset: u64, lock: &mut AtlasLock<'_>) -> Result<u32> {
        let lease = self.region(atlas, offset, offset + 4, lock)?;
        Ok(BigEndian::read_u32(&lease))
    }

    /// Drops the cached lease.
    pub fn unlease(&self) {
        *self.lease.lock() = None;
    }

    /// Drops the cached lease unless another thread is using it.
    pub fn try_unlease(&self) -> bool {
        match self.lease.try_lock() {
            Some(mut cached) => {
                *cached = None;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::io::Write;

    #[rstest]
    fn test_cached_lease_serves_reads() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0, 0, 0, 42, 0, 0, 1, 0]).unwrap();
        file.flush().unwrap();

        let atlas = Atlas::new(false, 1 << 20);
        let mut lock = atlas.lock();
        let raw = RawFile::open(&atlas, file.path(), &mut lock).unwrap();
        assert_eq!(raw.length(), 8);
        assert_eq!(raw.read_u32_be(&atlas, 0, &mut lock).unwrap(), 42);
        assert_eq!(raw.read_u32_be(&atlas, 4, &mut lock).unwrap(), 256);
        assert_eq!(atlas.stats(&lock).regions, 1);

        raw.unlease();
        assert_eq!(atlas.garbage_collect(&mut lock), 1);
        assert!(raw.try_unlease());
    }

    #[rstest]
    fn test_out_of_bounds_read_is_corrupt() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let atlas = Atlas::default();
        let mut lock = atlas.lock();
        let raw = RawFile::open(&atlas, file.path(), &mut lock).unwrap();
        assert!(matches!(
            raw.read_u32_be(&atlas, 0, &mut lock),
            Err(SeqDbError::CorruptFile { .. })
        ));
    }
}
