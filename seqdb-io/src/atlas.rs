//! # Region atlas
//!
//! The atlas owns every open database file and hands out [`RegionLease`]s:
//! reference-counted, read-only views of byte ranges. Files are memory-mapped
//! whole on first access; when mapping is disabled or fails, the atlas reads
//! block-aligned ranges into owned buffers instead.
//!
//! ## Locking
//!
//! All bookkeeping lives behind one coarse mutex. Its guard is exposed as an
//! explicit token, [`AtlasLock`], which callers thread through every method
//! that touches the region table. A lease stays valid after the token is
//! released, so the expected pattern is:
//!
//! ```text
//! lock -> get_region -> unlock -> read bytes
//! ```
//!
//! [`Atlas::locate`] performs exactly that sequence. Page faults caused by
//! touching mapped memory therefore never happen while the lock is held.
//!
//! ## Leases and eviction
//!
//! A region is shared between the table and its leases through an `Arc`.
//! Dropping a lease only decrements that count, it never takes the lock. A
//! region whose count is back to one (the table's own reference) is
//! unpinned and may be discarded by [`Atlas::garbage_collect`]; pinned
//! regions are never evicted. Upper layers that cache leases register
//! themselves with [`Atlas::register_flush`] so that [`Atlas::flush`] can ask
//! them to let go first.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use fxhash::FxHashMap;
use log::{debug, warn};
use memmap2::Mmap;
use parking_lot::{Mutex, MutexGuard};

use seqdb_core::consts::{BUFFERED_BLOCK_SIZE, DEFAULT_MEMORY_BOUND};
use seqdb_core::{Result, SeqDbError};

/// Implemented by layers that keep leases cached between calls.
pub trait FlushLeases: Send + Sync {
    /// Drops cached leases if that can be done without blocking.
    ///
    /// Returns false when the cache was busy and nothing was released.
    fn flush_leases(&self) -> bool;
}

enum RegionData {
    Mapped(Mmap),
    Buffered(Vec<u8>),
}

/// One mapped or buffered byte range of a file.
struct Region {
    path: PathBuf,
    begin: u64,
    end: u64,
    data: RegionData,
}

impl Region {
    fn bytes(&self) -> &[u8] {
        match &self.data {
            RegionData::Mapped(map) => &map[..],
            RegionData::Buffered(buf) => &buf[..],
        }
    }

    fn len(&self) -> u64 {
        self.end - self.begin
    }

    fn covers(&self, start: u64, end: u64) -> bool {
        self.begin <= start && end <= self.end
    }
}

/// A read-only view of `[start, end)` of one file.
///
/// Clones share the underlying region. The bytes are reachable through
/// `Deref<Target = [u8]>` without holding the atlas lock.
#[derive(Clone)]
pub struct RegionLease {
    region: Arc<Region>,
    start: u64,
    end: u64,
}

impl RegionLease {
    fn new(region: Arc<Region>, start: u64, end: u64) -> Self {
        RegionLease { region, start, end }
    }

    /// File offset of the first leased byte.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// File offset one past the last leased byte.
    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn path(&self) -> &Path {
        &self.region.path
    }

    pub fn as_bytes(&self) -> &[u8] {
        self
    }

    /// A lease over the whole region backing this one.
    pub fn whole_region(&self) -> RegionLease {
        RegionLease::new(Arc::clone(&self.region), self.region.begin, self.region.end)
    }

    /// A narrower lease on the same region, if `[start, end)` lies inside it.
    pub fn sub_lease(&self, start: u64, end: u64) -> Option<RegionLease> {
        if start <= end && self.region.covers(start, end) {
            Some(RegionLease::new(Arc::clone(&self.region), start, end))
        } else {
            None
        }
    }

    /// True when the bytes come from a memory map rather than a buffer.
    pub fn is_mapped(&self) -> bool {
        matches!(self.region.data, RegionData::Mapped(_))
    }
}

impl Deref for RegionLease {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        let lo = (self.start - self.region.begin) as usize;
        let hi = (self.end - self.region.begin) as usize;
        &self.region.bytes()[lo..hi]
    }
}

impl std::fmt::Debug for RegionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionLease")
            .field("path", &self.region.path)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

#[derive(Default)]
struct FileEntry {
    /// `None` when the file does not exist.
    length: Option<u64>,
    regions: Vec<Arc<Region>>,
    map_failed: bool,
}

#[derive(Default)]
pub struct AtlasTable {
    files: FxHashMap<PathBuf, FileEntry>,
    bytes_accounted: u64,
    flush_targets: Vec<Weak<dyn FlushLeases>>,
}

/// Proof that the caller holds the atlas lock.
///
/// Obtained from [`Atlas::lock`]; dropping it (or calling
/// [`AtlasLock::unlock`]) releases the lock.
pub struct AtlasLock<'a> {
    guard: MutexGuard<'a, AtlasTable>,
}

impl AtlasLock<'_> {
    /// Releases the lock. Equivalent to dropping the token.
    pub fn unlock(self) {}
}

/// Snapshot of the atlas bookkeeping, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AtlasStats {
    pub files: usize,
    pub regions: usize,
    pub pinned_regions: usize,
    pub bytes_accounted: u64,
}

/// Memory-mapped / buffered region manager for all database files.
pub struct Atlas {
    table: Mutex<AtlasTable>,
    use_mmap: bool,
    memory_bound: u64,
}

impl Default for Atlas {
    fn default() -> Self {
        Atlas::new(true, DEFAULT_MEMORY_BOUND)
    }
}

impl Atlas {
    pub fn new(use_mmap: bool, memory_bound: u64) -> Self {
        Atlas {
            table: Mutex::new(AtlasTable::default()),
            use_mmap,
            memory_bound,
        }
    }

    pub fn uses_mmap(&self) -> bool {
        self.use_mmap
    }

    /// Acquires the atlas lock. Blocks while another thread holds it.
    pub fn lock(&self) -> AtlasLock<'_> {
        AtlasLock {
            guard: self.table.lock(),
        }
    }

    fn check_owner(&self, lock: &AtlasLock<'_>) {
        debug_assert!(
            std::ptr::eq(MutexGuard::mutex(&lock.guard), &self.table),
            "lock token belongs to a different atlas"
        );
    }

    /// Size of a file in bytes, or `None` if it does not exist.
    ///
    /// Results are memoized; database files are not expected to change
    /// while they are open.
    pub fn file_size(&self, path: &Path, lock: &mut AtlasLock<'_>) -> Option<u64> {
        self.check_owner(lock);
        if let Some(entry) = lock.guard.files.get(path) {
            return entry.length;
        }
        let length = fs::metadata(path)
            .ok()
            .filter(|m| m.is_file())
            .map(|m| m.len());
        lock.guard.files.insert(
            path.to_path_buf(),
            FileEntry {
                length,
                ..Default::default()
            },
        );
        length
    }

    pub fn does_file_exist(&self, path: &Path, lock: &mut AtlasLock<'_>) -> bool {
        self.file_size(path, lock).is_some()
    }

    /// Leases `[start, end)` of a file. Requires the lock.
    pub fn get_region(
        &self,
        path: &Path,
        start: u64,
        end: u64,
        lock: &mut AtlasLock<'_>,
    ) -> Result<RegionLease> {
        let length = self
            .file_size(path, lock)
            .ok_or_else(|| SeqDbError::FileNotFound(path.to_path_buf()))?;

        if start > end || end > length {
            return Err(SeqDbError::corrupt(
                path,
                format!(
                    "region [{}, {}) lies outside the file ({} bytes)",
                    start, end, length
                ),
            ));
        }

        if let Some(entry) = lock.guard.files.get(path) {
            if let Some(region) = entry.regions.iter().find(|r| r.covers(start, end)) {
                return Ok(RegionLease::new(Arc::clone(region), start, end));
            }
        }

        let region = self.load_region(path, start, end, length, lock)?;
        let lease = RegionLease::new(Arc::clone(&region), start, end);

        let table = &mut *lock.guard;
        table.bytes_accounted += region.len();
        table
            .files
            .entry(path.to_path_buf())
            .or_default()
            .regions
            .push(region);

        Ok(lease)
    }

    /// Leases a whole file. Requires the lock.
    pub fn get_file(&self, path: &Path, lock: &mut AtlasLock<'_>) -> Result<RegionLease> {
        let length = self
            .file_size(path, lock)
            .ok_or_else(|| SeqDbError::FileNotFound(path.to_path_buf()))?;
        self.get_region(path, 0, length, lock)
    }

    /// Locks, leases `[start, end)`, and unlocks before returning.
    ///
    /// May block while acquiring the lock. The returned bytes can then be
    /// read without holding it.
    pub fn locate(&self, path: &Path, start: u64, end: u64) -> Result<RegionLease> {
        let mut lock = self.lock();
        let lease = self.get_region(path, start, end, &mut lock);
        lock.unlock();
        lease
    }

    fn load_region(
        &self,
        path: &Path,
        start: u64,
        end: u64,
        length: u64,
        lock: &mut AtlasLock<'_>,
    ) -> Result<Arc<Region>> {
        let map_failed = lock
            .guard
            .files
            .get(path)
            .map(|e| e.map_failed)
            .unwrap_or(false);
        let try_map = self.use_mmap && !map_failed && length > 0;

        let needed = if try_map {
            length
        } else {
            let (begin, stop) = round_to_block(start, end, length);
            stop - begin
        };
        if lock.guard.bytes_accounted + needed > self.memory_bound {
            debug!(
                "Atlas holds {} bytes, {} more requested; flushing",
                lock.guard.bytes_accounted, needed
            );
            self.flush(lock);
        }

        if try_map {
            match map_file(path) {
                Ok(map) => {
                    debug!("Mapped {} ({} bytes)", path.display(), length);
                    return Ok(Arc::new(Region {
                        path: path.to_path_buf(),
                        begin: 0,
                        end: length,
                        data: RegionData::Mapped(map),
                    }));
                }
                Err(e) => {
                    warn!(
                        "mmap failed for {}: {}; using buffered reads",
                        path.display(),
                        e
                    );
                    lock.guard.files.entry(path.to_path_buf()).or_default().map_failed = true;
                }
            }
        }

        let (begin, stop) = round_to_block(start, end, length);
        let data = read_range(path, begin, stop)?;
        debug!(
            "Read {} bytes [{}, {}) of {}",
            data.len(),
            begin,
            stop,
            path.display()
        );
        Ok(Arc::new(Region {
            path: path.to_path_buf(),
            begin,
            end: stop,
            data: RegionData::Buffered(data),
        }))
    }

    /// Registers a lease cache to be asked to release during [`Atlas::flush`].
    pub fn register_flush(&self, target: Weak<dyn FlushLeases>, lock: &mut AtlasLock<'_>) {
        self.check_owner(lock);
        lock.guard.flush_targets.push(target);
    }

    /// Asks every registered cache to drop its leases, then discards all
    /// unpinned regions. Returns the number of regions discarded.
    pub fn flush(&self, lock: &mut AtlasLock<'_>) -> usize {
        self.check_owner(lock);
        lock.guard.flush_targets.retain(|t| t.strong_count() > 0);
        let targets: Vec<Arc<dyn FlushLeases>> = lock
            .guard
            .flush_targets
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for target in &targets {
            target.flush_leases();
        }
        drop(targets);
        self.garbage_collect(lock)
    }

    /// Discards regions no lease refers to. Returns the number discarded.
    pub fn garbage_collect(&self, lock: &mut AtlasLock<'_>) -> usize {
        self.check_owner(lock);
        let table = &mut *lock.guard;
        let mut freed = 0u64;
        let mut removed = 0usize;
        for entry in table.files.values_mut() {
            entry.regions.retain(|region| {
                if Arc::strong_count(region) == 1 {
                    freed += region.len();
                    removed += 1;
                    false
                } else {
                    true
                }
            });
        }
        table.bytes_accounted -= freed;
        if removed > 0 {
            debug!("Atlas released {} regions ({} bytes)", removed, freed);
        }
        removed
    }

    pub fn stats(&self, lock: &AtlasLock<'_>) -> AtlasStats {
        self.check_owner(lock);
        let table = &*lock.guard;
        let mut stats = AtlasStats {
            files: table.files.len(),
            bytes_accounted: table.bytes_accounted,
            ..Default::default()
        };
        for region in table.files.values().flat_map(|e| e.regions.iter()) {
            stats.regions += 1;
            if Arc::strong_count(region) > 1 {
                stats.pinned_regions += 1;
            }
        }
        stats
    }
}

fn map_file(path: &Path) -> std::io::Result<Mmap> {
    let file = File::open(path)?;
    // The files are opened read-only and are never modified while mapped.
    unsafe { Mmap::map(&file) }
}

fn round_to_block(start: u64, end: u64, length: u64) -> (u64, u64) {
    let begin = (start / BUFFERED_BLOCK_SIZE) * BUFFERED_BLOCK_SIZE;
    let stop = end.div_ceil(BUFFERED_BLOCK_SIZE) * BUFFERED_BLOCK_SIZE;
    (begin, stop.min(length))
}

fn read_range(path: &Path, begin: u64, end: u64) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(begin))?;
    let mut data = vec![0u8; (end - begin) as usize];
    file.read_exact(&mut data)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::NamedTempFile;

    fn file_with(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[rstest]
    #[case(true)]
    #[case(false)]
    fn test_region_bytes_match_file(#[case] use_mmap: bool) {
        let data: Vec<u8> = (0..200u8).collect();
        let file = file_with(&data);
        let atlas = Atlas::new(use_mmap, DEFAULT_MEMORY_BOUND);

        let mut lock = atlas.lock();
        let lease = atlas.get_region(file.path(), 10, 20, &mut lock).unwrap();
        lock.unlock();

        assert_eq!(lease.as_bytes(), &data[10..20]);
        assert_eq!(lease.start(), 10);
        assert_eq!(lease.end(), 20);
        assert_eq!(lease.is_mapped(), use_mmap);
    }

    #[rstest]
    fn test_covering_region_is_reused() {
        let file = file_with(&[7u8; 64]);
        let atlas = Atlas::new(false, DEFAULT_MEMORY_BOUND);
        let mut lock = atlas.lock();
        let a = atlas.get_region(file.path(), 0, 8, &mut lock).unwrap();
        let b = atlas.get_region(file.path(), 30, 40, &mut lock).unwrap();
        let stats = atlas.stats(&lock);
        assert_eq!(stats.regions, 1);
        assert_eq!(stats.pinned_regions, 1);
        assert_eq!(a.len() + b.len(), 18);
    }

    #[rstest]
    fn test_pinned_regions_survive_collection() {
        let file = file_with(&[1u8; 32]);
        let atlas = Atlas::default();
        let lease = atlas.locate(file.path(), 0, 32).unwrap();

        let mut lock = atlas.lock();
        assert_eq!(atlas.garbage_collect(&mut lock), 0);
        drop(lease);
        assert_eq!(atlas.garbage_collect(&mut lock), 1);
        assert_eq!(atlas.stats(&lock).bytes_accounted, 0);
    }

    #[rstest]
    fn test_missing_file_and_bad_range() {
        let file = file_with(b"abc");
        let atlas = Atlas::default();
        let mut lock = atlas.lock();
        assert!(!atlas.does_file_exist(Path::new("/no/such/file.pin"), &mut lock));
        assert!(matches!(
            atlas.get_file(Path::new("/no/such/file.pin"), &mut lock),
            Err(SeqDbError::FileNotFound(_))
        ));
        assert!(matches!(
            atlas.get_region(file.path(), 2, 9, &mut lock),
            Err(SeqDbError::CorruptFile { .. })
        ));
        assert_eq!(atlas.file_size(file.path(), &mut lock), Some(3));
    }

    #[rstest]
    fn test_empty_file_gives_empty_lease() {
        let file = file_with(b"");
        let atlas = Atlas::default();
        let lease = {
            let mut lock = atlas.lock();
            atlas.get_file(file.path(), &mut lock).unwrap()
        };
        assert!(lease.is_empty());
    }

    struct CountingCache {
        flushed: AtomicUsize,
        lease: Mutex<Option<RegionLease>>,
    }

    impl FlushLeases for CountingCache {
        fn flush_leases(&self) -> bool {
            self.flushed.fetch_add(1, Ordering::SeqCst);
            match self.lease.try_lock() {
                Some(mut guard) => {
                    *guard = None;
                    true
                }
                None => false,
            }
        }
    }

    #[rstest]
    fn test_flush_asks_caches_and_frees_their_regions() {
        let file = file_with(&[3u8; 16]);
        let atlas = Atlas::default();
        let cache = Arc::new(CountingCache {
            flushed: AtomicUsize::new(0),
            lease: Mutex::new(None),
        });

        let mut lock = atlas.lock();
        let lease = atlas.get_file(file.path(), &mut lock).unwrap();
        *cache.lease.lock() = Some(lease);
        let weak: Weak<dyn FlushLeases> = Arc::downgrade(&cache) as Weak<dyn FlushLeases>;
        atlas.register_flush(weak, &mut lock);

        assert_eq!(atlas.flush(&mut lock), 1);
        assert_eq!(cache.flushed.load(Ordering::SeqCst), 1);
        assert!(cache.lease.lock().is_none());
    }

    #[rstest]
    fn test_memory_bound_triggers_collection() {
        let a = file_with(&[0u8; 100]);
        let b = file_with(&[0u8; 100]);
        let atlas = Atlas::new(false, 150);
        let mut lock = atlas.lock();
        drop(atlas.get_file(a.path(), &mut lock).unwrap());
        let _b = atlas.get_file(b.path(), &mut lock).unwrap();
        let stats = atlas.stats(&lock);
        assert_eq!(stats.regions, 1);
        assert_eq!(stats.bytes_accounted, 100);
    }

    #[rstest]
    #[case(0, 10, 2_000_000, 0, BUFFERED_BLOCK_SIZE)]
    #[case(BUFFERED_BLOCK_SIZE + 1, BUFFERED_BLOCK_SIZE + 2, 2_000_000, BUFFERED_BLOCK_SIZE, 2 * BUFFERED_BLOCK_SIZE)]
    #[case(5, 9, 20, 0, 20)]
    fn test_round_to_block(
        #[case] start: u64,
        #[case] end: u64,
        #[case] length: u64,
        #[case] begin: u64,
        #[case] stop: u64,
    ) {
        assert_eq!(round_to_block(start, end, length), (begin, stop));
    }
}
