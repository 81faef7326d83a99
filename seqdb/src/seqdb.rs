use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use seqdb_alias::{AliasNode, AliasValues, GroupAliasSets};
use seqdb_core::{Oid, Result, SeqDbConfig, SeqDbError, SeqType};
use seqdb_io::{Atlas, AtlasLock, GiList, RegionLease, Volume};

use crate::oid_bitmap::OidBitmap;
use crate::resolver::GiOidResolver;
use crate::volset::VolumeSet;

/// Position of an OID iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OidCursor {
    next: Oid,
}

impl OidCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next OID this cursor will consider.
    pub fn position(&self) -> Oid {
        self.next
    }
}

/// A batch of included OIDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OidChunk {
    /// Every OID in `[begin, end)`; used when nothing is filtered.
    Range { begin: Oid, end: Oid },
    /// Explicit OIDs, ascending.
    List(Vec<Oid>),
}

impl OidChunk {
    pub fn len(&self) -> usize {
        match self {
            OidChunk::Range { begin, end } => end.saturating_sub(*begin) as usize,
            OidChunk::List(oids) => oids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The OIDs of the chunk, in order.
    pub fn oids(&self) -> Vec<Oid> {
        match self {
            OidChunk::Range { begin, end } => (*begin..*end).collect(),
            OidChunk::List(oids) => oids.clone(),
        }
    }
}

/// Builder for [`SeqDb`].
#[derive(Default)]
pub struct SeqDbBuilder {
    names: Option<String>,
    seq_type: Option<SeqType>,
    config: Option<SeqDbConfig>,
    oid_range: Option<(Oid, Oid)>,
    gi_list: Option<GiList>,
    resolver: Option<Arc<dyn GiOidResolver>>,
}

impl SeqDbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Space separated database names.
    pub fn with_names(mut self, names: impl Into<String>) -> Self {
        self.names = Some(names.into());
        self
    }

    /// Sequence type to open. Without one, protein is tried first and
    /// nucleotide second.
    pub fn with_seq_type(mut self, seq_type: SeqType) -> Self {
        self.seq_type = Some(seq_type);
        self
    }

    /// Runtime settings; defaults to [`SeqDbConfig::from_env`].
    pub fn with_config(mut self, config: SeqDbConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Restricts iteration to global OIDs `[begin, end)`.
    pub fn with_oid_range(mut self, begin: Oid, end: Oid) -> Self {
        self.oid_range = Some((begin, end));
        self
    }

    /// Restricts the database to the OIDs of these GIs.
    pub fn with_gi_list(mut self, gi_list: GiList) -> Self {
        self.gi_list = Some(gi_list);
        self
    }

    pub fn with_gi_resolver(mut self, resolver: Arc<dyn GiOidResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Consumes the builder and opens the database.
    pub fn finish(self) -> Result<SeqDb> {
        let config = self.config.clone().unwrap_or_else(SeqDbConfig::from_env);
        if let Some((begin, end)) = self.oid_range {
            if begin > end {
                return Err(SeqDbError::InvalidRange {
                    what: "OID iteration".to_string(),
                    start: begin as u64,
                    end: end as u64,
                });
            }
        }

        match self.seq_type {
            Some(seq_type) => self.open(seq_type, config),
            None => match self.open(SeqType::Protein, config.clone()) {
                Ok(db) => Ok(db),
                Err(e) => {
                    debug!("Opening as protein failed ({}); trying nucleotide", e);
                    self.open(SeqType::Nucleotide, config)
                }
            },
        }
    }

    fn open(&self, seq_type: SeqType, config: SeqDbConfig) -> Result<SeqDb> {
        let names = self.names.clone().unwrap_or_default();
        let atlas = Arc::new(Atlas::new(config.use_mmap, config.memory_bound));
        let mut alias_sets =
            GroupAliasSets::new(Arc::clone(&atlas), config.search_paths.clone());

        let mut lock = atlas.lock();
        let root = AliasNode::from_names(&names, seq_type, &mut alias_sets, &mut lock)?;
        let entries = root.set_masks()?;
        let volset = VolumeSet::open(&atlas, entries, seq_type, &mut lock)?;
        lock.unlock();

        let (first_oid, end_oid) = self.oid_range.unwrap_or((0, Oid::MAX));
        info!(
            "Opened {} database [{}]: {} volumes, {} OIDs{}",
            seq_type,
            names,
            volset.volumes().len(),
            volset.num_oids(),
            if volset.has_filter() { ", filtered" } else { "" }
        );

        Ok(SeqDb {
            atlas,
            config,
            seq_type,
            names,
            alias_sets,
            root,
            volset,
            user_gis: self.gi_list.clone(),
            resolver: self.resolver.clone(),
            first_oid,
            end_oid,
            bitmap: OnceCell::new(),
            shared_cursor: Mutex::new(OidCursor::new()),
        })
    }
}

/// A read-only handle on one or more databases, merged into a single OID
/// space.
///
/// ```no_run
/// use seqdb::{SeqDb, SeqType};
///
/// let db = SeqDb::builder()
///     .with_names("nr swissprot")
///     .with_seq_type(SeqType::Protein)
///     .finish()?;
/// let mut oid = 0;
/// while db.check_or_find_oid(&mut oid)? {
///     let header = db.header_bytes(oid)?;
///     println!("{}: {} header bytes", oid, header.len());
///     oid += 1;
/// }
/// # Ok::<(), seqdb::SeqDbError>(())
/// ```
pub struct SeqDb {
    atlas: Arc<Atlas>,
    config: SeqDbConfig,
    seq_type: SeqType,
    names: String,
    alias_sets: GroupAliasSets,
    root: AliasNode,
    volset: VolumeSet,
    user_gis: Option<GiList>,
    resolver: Option<Arc<dyn GiOidResolver>>,
    first_oid: Oid,
    end_oid: Oid,
    bitmap: OnceCell<OidBitmap>,
    shared_cursor: Mutex<OidCursor>,
}

impl SeqDb {
    pub fn builder() -> SeqDbBuilder {
        SeqDbBuilder::new()
    }

    /// Opens `names` as the given type with settings from the environment.
    pub fn open(names: &str, seq_type: SeqType) -> Result<SeqDb> {
        SeqDb::builder().with_names(names).with_seq_type(seq_type).finish()
    }

    pub fn seq_type(&self) -> SeqType {
        self.seq_type
    }

    /// The names the database was opened with.
    pub fn names(&self) -> &str {
        &self.names
    }

    pub fn config(&self) -> &SeqDbConfig {
        &self.config
    }

    pub fn atlas(&self) -> &Arc<Atlas> {
        &self.atlas
    }

    /// Directories searched for database names, `:` separated.
    pub fn search_path(&self) -> String {
        self.alias_sets.search_path_string()
    }

    pub fn alias_tree(&self) -> &AliasNode {
        &self.root
    }

    pub fn volume_set(&self) -> &VolumeSet {
        &self.volset
    }

    fn needs_bitmap(&self) -> bool {
        self.volset.has_filter() || self.user_gis.is_some()
    }

    /// The inclusion bitmap, built on first use; `None` when every OID is
    /// included.
    fn bitmap(&self) -> Result<Option<&OidBitmap>> {
        if !self.needs_bitmap() {
            return Ok(None);
        }
        self.bitmap
            .get_or_try_init(|| {
                let mut lock = self.atlas.lock();
                OidBitmap::build(
                    &self.volset,
                    self.user_gis.as_ref(),
                    self.resolver.as_deref(),
                    &self.atlas,
                    &mut lock,
                )
            })
            .map(Some)
    }

    /// True once the inclusion bitmap has been built.
    pub fn has_bitmap(&self) -> bool {
        self.bitmap.get().is_some()
    }

    /// One past the last included OID.
    ///
    /// Without filters this is the OID count of all volume occurrences.
    pub fn num_oids(&self) -> Result<Oid> {
        Ok(match self.bitmap()? {
            Some(bitmap) => bitmap.num_oids(),
            None => self.volset.num_oids(),
        })
    }

    fn iteration_end(&self) -> Result<Oid> {
        Ok(self.num_oids()?.min(self.end_oid))
    }

    pub fn title(&self) -> Result<String> {
        self.root.title(&self.volset)
    }

    /// Sequence count, honoring `NSEQ` overrides in alias files.
    pub fn num_seqs(&self) -> Result<u64> {
        self.root.num_seqs(&self.volset)
    }

    /// Residue count, honoring `LENGTH` overrides in alias files.
    pub fn total_length(&self) -> Result<u64> {
        self.root.total_length(&self.volset)
    }

    /// Residue count of all volume occurrences, ignoring alias overrides.
    pub fn volume_length(&self) -> Result<u64> {
        self.root.volume_length(&self.volset)
    }

    pub fn max_length(&self) -> Result<u64> {
        self.root.max_length(&self.volset)
    }

    pub fn memb_bit(&self) -> Result<Option<u64>> {
        self.root.memb_bit(&self.volset)
    }

    /// Creation date of the first volume.
    pub fn date(&self) -> &str {
        self.volset
            .volumes()
            .first()
            .map(|v| v.date())
            .unwrap_or("")
    }

    /// Base paths of every volume, sorted.
    pub fn volume_names(&self) -> Vec<PathBuf> {
        self.root.volume_names()
    }

    pub fn alias_file_values(&self) -> Result<BTreeMap<PathBuf, Vec<AliasValues>>> {
        self.root.alias_file_values(&self.volset)
    }

    pub fn needs_totals_scan(&self) -> bool {
        self.root.needs_totals_scan()
    }

    /// The volume holding a global OID and the OID within that volume.
    pub fn volume_for_oid(&self, oid: Oid) -> Result<(&Arc<Volume>, Oid)> {
        self.volset
            .find_volume_for_oid(oid)
            .map(|(_, volume, local)| (volume, local))
            .ok_or(SeqDbError::OidOutOfRange {
                oid,
                num_oids: self.volset.num_oids(),
            })
    }

    pub fn seq_length(&self, oid: Oid) -> Result<u32> {
        let (volume, local) = self.volume_for_oid(oid)?;
        let mut lock = self.atlas.lock();
        volume.seq_length(local, &mut lock)
    }

    pub fn approx_seq_length(&self, oid: Oid) -> Result<u32> {
        let (volume, local) = self.volume_for_oid(oid)?;
        let mut lock = self.atlas.lock();
        volume.approx_seq_length(local, &mut lock)
    }

    pub fn header_bytes(&self, oid: Oid) -> Result<RegionLease> {
        let (volume, local) = self.volume_for_oid(oid)?;
        let mut lock = self.atlas.lock();
        volume.header_bytes(local, &mut lock)
    }

    pub fn sequence_bytes(&self, oid: Oid) -> Result<RegionLease> {
        let (volume, local) = self.volume_for_oid(oid)?;
        let mut lock = self.atlas.lock();
        volume.sequence_bytes(local, &mut lock)
    }

    pub fn ambiguity_bytes(&self, oid: Oid) -> Result<RegionLease> {
        let (volume, local) = self.volume_for_oid(oid)?;
        let mut lock = self.atlas.lock();
        volume.ambiguity_bytes(local, &mut lock)
    }

    /// Moves `oid` to the next included OID at or after it.
    ///
    /// Returns false, leaving `oid` where the search ended, when no
    /// included OID remains before the end of iteration.
    pub fn check_or_find_oid(&self, oid: &mut Oid) -> Result<bool> {
        if *oid < self.first_oid {
            *oid = self.first_oid;
        }
        let end = self.iteration_end()?;
        if *oid >= end {
            return Ok(false);
        }
        let Some(bitmap) = self.bitmap()? else {
            return Ok(true);
        };
        match bitmap.find_next_included(*oid) {
            Some(next) if next < end => {
                *oid = next;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// True when a user OID range cuts into the volume set.
    fn has_oid_window(&self) -> bool {
        self.first_oid > 0 || self.end_oid < self.volset.num_oids()
    }

    fn residues(&self, oid: Oid, approx: bool, lock: &mut AtlasLock<'_>) -> Result<u64> {
        let (volume, local) = self.volume_for_oid(oid)?;
        let length = if approx && self.seq_type == SeqType::Nucleotide {
            volume.approx_seq_length(local, lock)?
        } else {
            volume.seq_length(local, lock)?
        };
        Ok(length as u64)
    }

    /// Calls `visit` with each included OID and its residue count, in order,
    /// until it returns false.
    fn scan_included<F>(&self, approx: bool, mut visit: F) -> Result<()>
    where
        F: FnMut(Oid, u64) -> bool,
    {
        // build the bitmap before the atlas lock is held
        self.bitmap()?;
        let mut lock = self.atlas.lock();
        let mut oid = 0;
        while self.check_or_find_oid(&mut oid)? {
            let length = self.residues(oid, approx, &mut lock)?;
            if !visit(oid, length) {
                break;
            }
            oid += 1;
        }
        Ok(())
    }

    /// Sequence and residue counts.
    ///
    /// Unfiltered totals cover every OID of every volume occurrence.
    /// Filtered totals cover the included OIDs; they come from alias and
    /// volume metadata when nothing is filtered, and from a scan of the
    /// included OIDs otherwise. `approx` lets nucleotide lengths come from
    /// the index alone.
    pub fn totals(&self, filtered: bool, approx: bool) -> Result<(u64, u64)> {
        if !filtered {
            return Ok((
                self.volset.num_oids() as u64,
                self.root.volume_length(&self.volset)?,
            ));
        }
        if !self.needs_bitmap() && !self.has_oid_window() {
            return Ok((self.num_seqs()?, self.total_length()?));
        }

        let (mut count, mut length) = (0u64, 0u64);
        self.scan_included(approx, |_, residues| {
            count += 1;
            length += residues;
            true
        })?;
        debug!("Scanned {}: {} sequences, {} residues", self.names, count, length);
        Ok((count, length))
    }

    /// The included OID holding residue `residue`, counting residues over
    /// the included OIDs in order.
    ///
    /// The result is never below `first_oid`. Nucleotide lengths are
    /// approximated from the index.
    pub fn oid_at_offset(&self, first_oid: Oid, residue: u64) -> Result<Oid> {
        let num_oids = self.num_oids()?;
        if first_oid >= num_oids {
            return Err(SeqDbError::OidOutOfRange {
                oid: first_oid,
                num_oids,
            });
        }

        let mut seen = 0u64;
        let mut found = None;
        self.scan_included(true, |oid, residues| {
            if residue < seen + residues {
                found = Some(oid);
                return false;
            }
            seen += residues;
            true
        })?;

        let Some(oid) = found else {
            return Err(SeqDbError::InvalidRange {
                what: "residue offset".to_string(),
                start: residue,
                end: seen,
            });
        };
        if oid >= first_oid {
            return Ok(oid);
        }
        let mut next = first_oid;
        if self.check_or_find_oid(&mut next)? {
            Ok(next)
        } else {
            Err(SeqDbError::OidOutOfRange {
                oid: first_oid,
                num_oids,
            })
        }
    }

    /// The next batch of at most `size` included OIDs.
    ///
    /// A `size` of zero uses the configured default. An empty chunk means
    /// iteration is over.
    pub fn next_oid_chunk(&self, cursor: &mut OidCursor, size: usize) -> Result<OidChunk> {
        let size = if size == 0 {
            self.config.default_chunk_size.max(1)
        } else {
            size
        };
        let end = self.iteration_end()?;
        let begin = cursor.next.max(self.first_oid).min(end);

        match self.bitmap()? {
            None => {
                let step = Oid::try_from(size).unwrap_or(Oid::MAX);
                let stop = begin.saturating_add(step).min(end);
                cursor.next = stop;
                Ok(OidChunk::Range { begin, end: stop })
            }
            Some(bitmap) => {
                let mut oids = Vec::with_capacity(size.min((end - begin) as usize));
                let mut next = begin;
                while oids.len() < size {
                    match bitmap.find_next_included(next) {
                        Some(oid) if oid < end => {
                            oids.push(oid);
                            next = oid + 1;
                        }
                        _ => {
                            next = end;
                            break;
                        }
                    }
                }
                cursor.next = next;
                Ok(OidChunk::List(oids))
            }
        }
    }

    /// Like [`SeqDb::next_oid_chunk`], using a cursor shared by all callers
    /// of this handle, so concurrent workers never receive the same OID.
    pub fn next_shared_oid_chunk(&self, size: usize) -> Result<OidChunk> {
        let mut cursor = self.shared_cursor.lock();
        self.next_oid_chunk(&mut cursor, size)
    }

    pub fn reset_shared_cursor(&self) {
        *self.shared_cursor.lock() = OidCursor::new();
    }

    /// Drops cached leases and releases every region no caller holds.
    ///
    /// Returns the number of regions released.
    pub fn flush(&self) -> usize {
        let mut lock = self.atlas.lock();
        self.volset.unlease_all();
        let released = self.atlas.flush(&mut lock);
        debug!("Flushed {}: {:?}", self.names, self.atlas.stats(&lock));
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(OidChunk::Range { begin: 4, end: 7 }, vec![4, 5, 6])]
    #[case(OidChunk::Range { begin: 7, end: 7 }, vec![])]
    #[case(OidChunk::List(vec![2, 9]), vec![2, 9])]
    fn test_chunk_oids(#[case] chunk: OidChunk, #[case] expected: Vec<Oid>) {
        assert_eq!(chunk.len(), expected.len());
        assert_eq!(chunk.is_empty(), expected.is_empty());
        assert_eq!(chunk.oids(), expected);
    }

    #[rstest]
    fn test_missing_names_are_rejected() {
        let result = SeqDb::builder()
            .with_seq_type(SeqType::Protein)
            .with_config(SeqDbConfig::default())
            .finish();
        assert!(matches!(result, Err(SeqDbError::NoDatabaseNames(_))));
    }
}
