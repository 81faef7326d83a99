//! # Aggregate walks over the alias tree
//!
//! Database-wide values such as the title or the sequence count come from
//! one fold over the tree. At each node the fold uses the node's own
//! directive for the value when it has one and does not descend further;
//! otherwise it folds the child alias nodes and then the volumes the node
//! names directly.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use seqdb_core::consts::keys;
use seqdb_core::{Result, SeqDbError};
use seqdb_io::Volume;

use crate::node::AliasNode;
use crate::parse::AliasValues;

/// Metadata a volume contributes to an aggregate.
pub trait VolumeInfo {
    fn title(&self) -> &str;
    fn num_oids(&self) -> u32;
    fn total_length(&self) -> u64;
    fn max_length(&self) -> u32;
}

impl VolumeInfo for Volume {
    fn title(&self) -> &str {
        Volume::title(self)
    }

    fn num_oids(&self) -> u32 {
        Volume::num_oids(self)
    }

    fn total_length(&self) -> u64 {
        Volume::total_length(self)
    }

    fn max_length(&self) -> u32 {
        Volume::max_length(self)
    }
}

/// Finds opened volumes by base path.
pub trait VolumeLookup {
    type Volume: VolumeInfo;

    fn find_volume(&self, base: &Path) -> Option<&Self::Volume>;
}

/// The values that can be aggregated over an alias tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    /// `TITLE`, joined with `"; "`.
    Title,
    /// `NSEQ`, summed.
    NumSeqs,
    /// OID count, summed from volumes only.
    NumOids,
    /// `LENGTH`, summed.
    TotalLength,
    /// Residue count, summed from volumes only.
    VolumeLength,
    /// `MAX_SEQ_LENGTH`, maximum.
    MaxLength,
    /// `MEMB_BIT`, last value seen.
    MembBit,
}

impl Aggregate {
    /// The alias directive that overrides volume data, if any.
    pub fn alias_key(&self) -> Option<&'static str> {
        match self {
            Aggregate::Title => Some(keys::TITLE),
            Aggregate::NumSeqs => Some(keys::NSEQ),
            Aggregate::NumOids => None,
            Aggregate::TotalLength => Some(keys::LENGTH),
            Aggregate::VolumeLength => None,
            Aggregate::MaxLength => Some(keys::MAX_SEQ_LENGTH),
            Aggregate::MembBit => Some(keys::MEMB_BIT),
        }
    }

    fn start(&self) -> Accumulator {
        match self {
            Aggregate::Title => Accumulator::Text(String::new()),
            Aggregate::MaxLength => Accumulator::Max(0),
            Aggregate::MembBit => Accumulator::Last(None),
            _ => Accumulator::Sum(0),
        }
    }
}

/// Result of an aggregate walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accumulator {
    Text(String),
    Sum(u64),
    Max(u64),
    Last(Option<u64>),
}

impl Accumulator {
    /// Numeric result; titles give zero and an unset `MEMB_BIT` gives `None`.
    pub fn number(&self) -> Option<u64> {
        match self {
            Accumulator::Text(_) => Some(0),
            Accumulator::Sum(n) | Accumulator::Max(n) => Some(*n),
            Accumulator::Last(v) => *v,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Accumulator::Text(s) => s,
            other => other.number().map(|n| n.to_string()).unwrap_or_default(),
        }
    }

    fn add_text(&mut self, value: &str) {
        if let Accumulator::Text(s) = self {
            if value.is_empty() {
                return;
            }
            if !s.is_empty() {
                s.push_str("; ");
            }
            s.push_str(value);
        }
    }

    fn add_number(&mut self, n: u64) {
        match self {
            Accumulator::Sum(total) => *total += n,
            Accumulator::Max(max) => *max = (*max).max(n),
            Accumulator::Last(last) => *last = Some(n),
            Accumulator::Text(_) => {}
        }
    }

    fn add_alias_value(&mut self, node: &AliasNode, key: &str, value: &str) -> Result<()> {
        if let Accumulator::Text(_) = self {
            self.add_text(value);
            return Ok(());
        }
        let n = value
            .trim()
            .parse::<u64>()
            .map_err(|_| SeqDbError::InvalidAliasValue {
                path: node.alias_path().map(Path::to_path_buf).unwrap_or_default(),
                key: key.to_string(),
                value: value.to_string(),
            })?;
        self.add_number(n);
        Ok(())
    }

    fn add_volume<V: VolumeInfo>(&mut self, aggregate: Aggregate, volume: &V) {
        match aggregate {
            Aggregate::Title => self.add_text(volume.title()),
            Aggregate::NumSeqs | Aggregate::NumOids => self.add_number(volume.num_oids() as u64),
            Aggregate::TotalLength | Aggregate::VolumeLength => {
                self.add_number(volume.total_length())
            }
            Aggregate::MaxLength => self.add_number(volume.max_length() as u64),
            Aggregate::MembBit => {}
        }
    }
}

impl AliasNode {
    /// Folds one aggregate over this subtree.
    ///
    /// Volumes the lookup does not know are skipped.
    pub fn walk<L: VolumeLookup>(&self, aggregate: Aggregate, lookup: &L) -> Result<Accumulator> {
        let mut acc = aggregate.start();
        self.walk_into(aggregate, lookup, &mut acc)?;
        Ok(acc)
    }

    fn walk_into<L: VolumeLookup>(
        &self,
        aggregate: Aggregate,
        lookup: &L,
        acc: &mut Accumulator,
    ) -> Result<()> {
        if let Some(key) = aggregate.alias_key() {
            if let Some(value) = self.value(key) {
                return acc.add_alias_value(self, key, value);
            }
        }
        for sub in self.subnodes() {
            sub.walk_into(aggregate, lookup, acc)?;
        }
        for base in self.volumes() {
            if let Some(volume) = lookup.find_volume(base) {
                acc.add_volume(aggregate, volume);
            }
        }
        Ok(())
    }

    pub fn title<L: VolumeLookup>(&self, lookup: &L) -> Result<String> {
        Ok(self.walk(Aggregate::Title, lookup)?.into_text())
    }

    pub fn num_seqs<L: VolumeLookup>(&self, lookup: &L) -> Result<u64> {
        Ok(self.walk(Aggregate::NumSeqs, lookup)?.number().unwrap_or(0))
    }

    pub fn num_oids<L: VolumeLookup>(&self, lookup: &L) -> Result<u64> {
        Ok(self.walk(Aggregate::NumOids, lookup)?.number().unwrap_or(0))
    }

    pub fn total_length<L: VolumeLookup>(&self, lookup: &L) -> Result<u64> {
        Ok(self.walk(Aggregate::TotalLength, lookup)?.number().unwrap_or(0))
    }

    pub fn volume_length<L: VolumeLookup>(&self, lookup: &L) -> Result<u64> {
        Ok(self.walk(Aggregate::VolumeLength, lookup)?.number().unwrap_or(0))
    }

    pub fn max_length<L: VolumeLookup>(&self, lookup: &L) -> Result<u64> {
        Ok(self.walk(Aggregate::MaxLength, lookup)?.number().unwrap_or(0))
    }

    pub fn memb_bit<L: VolumeLookup>(&self, lookup: &L) -> Result<Option<u64>> {
        Ok(self.walk(Aggregate::MembBit, lookup)?.number())
    }

    /// True when some branch filters by GI list without giving both `NSEQ`
    /// and `LENGTH`, so exact totals need a scan of the included OIDs.
    pub fn needs_totals_scan(&self) -> bool {
        if self.has_key(keys::NSEQ) && self.has_key(keys::LENGTH) {
            return false;
        }
        if self.has_key(keys::GILIST) {
            return true;
        }
        self.subnodes().iter().any(AliasNode::needs_totals_scan)
    }

    /// Directives of every alias file in the tree, keyed by path.
    ///
    /// A file reached more than once appears once per occurrence. Where a
    /// file has no `TITLE`, the title aggregated over its subtree is filled
    /// in.
    pub fn alias_file_values<L: VolumeLookup>(
        &self,
        lookup: &L,
    ) -> Result<BTreeMap<PathBuf, Vec<AliasValues>>> {
        let mut out = BTreeMap::new();
        self.collect_alias_values(lookup, &mut out)?;
        Ok(out)
    }

    fn collect_alias_values<L: VolumeLookup>(
        &self,
        lookup: &L,
        out: &mut BTreeMap<PathBuf, Vec<AliasValues>>,
    ) -> Result<()> {
        if let Some(path) = self.alias_path() {
            let mut values = self.values().clone();
            if !values.contains_key(keys::TITLE) {
                values.insert(keys::TITLE.to_string(), self.title(lookup)?);
            }
            out.entry(path.to_path_buf()).or_default().push(values);
        }
        for sub in self.subnodes() {
            sub.collect_alias_values(lookup, out)?;
        }
        Ok(())
    }
}
