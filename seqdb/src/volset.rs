use std::path::{Path, PathBuf};
use std::sync::Arc;

use fxhash::FxHashMap;
use log::debug;

use seqdb_alias::VolumeLookup;
use seqdb_core::{Oid, Result, SeqDbError, SeqType, VolumeFilter};
use seqdb_io::{Atlas, AtlasLock, Volume};

/// One appearance of a volume in the global OID space.
///
/// Every occurrence spans the volume's full OID count; global OID
/// `start + i` is local OID `i`. The filter decides which of those are
/// included.
#[derive(Debug, Clone)]
pub struct VolumeOccurrence {
    pub volume: usize,
    pub start: Oid,
    pub end: Oid,
    pub filter: VolumeFilter,
}

impl VolumeOccurrence {
    pub fn num_oids(&self) -> Oid {
        self.end - self.start
    }
}

/// The opened volumes and the order they occupy the OID space.
///
/// A volume named several times is opened once and appears in several
/// occurrences.
pub struct VolumeSet {
    volumes: Vec<Arc<Volume>>,
    by_path: FxHashMap<PathBuf, usize>,
    occurrences: Vec<VolumeOccurrence>,
    num_oids: Oid,
}

impl VolumeSet {
    pub fn open(
        atlas: &Arc<Atlas>,
        entries: Vec<(PathBuf, VolumeFilter)>,
        seq_type: SeqType,
        lock: &mut AtlasLock<'_>,
    ) -> Result<Self> {
        let mut volumes: Vec<Arc<Volume>> = Vec::new();
        let mut by_path = FxHashMap::default();
        let mut occurrences = Vec::with_capacity(entries.len());
        let mut next: Oid = 0;

        for (path, filter) in entries {
            let index = match by_path.get(&path) {
                Some(&index) => index,
                None => {
                    volumes.push(Volume::open(atlas, &path, seq_type, lock)?);
                    by_path.insert(path.clone(), volumes.len() - 1);
                    volumes.len() - 1
                }
            };
            let count = volumes[index].num_oids();
            let end = next.checked_add(count).ok_or_else(|| SeqDbError::InvalidRange {
                what: "global OID space".to_string(),
                start: next as u64,
                end: next as u64 + count as u64,
            })?;
            debug!(
                "OIDs [{}, {}) from {} ({:?})",
                next,
                end,
                path.display(),
                filter
            );
            occurrences.push(VolumeOccurrence {
                volume: index,
                start: next,
                end,
                filter,
            });
            next = end;
        }

        Ok(VolumeSet {
            volumes,
            by_path,
            occurrences,
            num_oids: next,
        })
    }

    /// Total OIDs across all occurrences, before any filtering.
    pub fn num_oids(&self) -> Oid {
        self.num_oids
    }

    pub fn volumes(&self) -> &[Arc<Volume>] {
        &self.volumes
    }

    pub fn occurrences(&self) -> &[VolumeOccurrence] {
        &self.occurrences
    }

    /// True when some occurrence includes only part of its volume.
    pub fn has_filter(&self) -> bool {
        self.occurrences.iter().any(|occ| !occ.filter.is_full())
    }

    pub fn volume(&self, base: &Path) -> Option<&Arc<Volume>> {
        self.by_path.get(base).map(|&i| &self.volumes[i])
    }

    pub fn volume_at(&self, occurrence: &VolumeOccurrence) -> &Arc<Volume> {
        &self.volumes[occurrence.volume]
    }

    /// The occurrence holding a global OID, its volume and the local OID.
    pub fn find_volume_for_oid(&self, oid: Oid) -> Option<(&VolumeOccurrence, &Arc<Volume>, Oid)> {
        let i = self.occurrences.partition_point(|occ| occ.end <= oid);
        let occ = self.occurrences.get(i)?;
        if oid < occ.start {
            return None;
        }
        Some((occ, &self.volumes[occ.volume], oid - occ.start))
    }

    pub fn unlease_all(&self) {
        for volume in &self.volumes {
            volume.unlease();
        }
    }
}

impl VolumeLookup for VolumeSet {
    type Volume = Volume;

    fn find_volume(&self, base: &Path) -> Option<&Volume> {
        self.volume(base).map(|v| v.as_ref())
    }
}
