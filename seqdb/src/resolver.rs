use std::path::{Path, PathBuf};

use fxhash::FxHashMap;

use seqdb_core::{Oid, Result};
use seqdb_io::Volume;

/// Translates GIs to volume-local OIDs.
///
/// GI lists (alias `GILIST` files and caller-supplied lists) name records
/// by GI. Turning those into OIDs needs per-volume lookup tables that live
/// outside this crate; callers plug them in through this trait.
pub trait GiOidResolver: Send + Sync {
    /// Resolves each GI to an OID of `volume`, or `None` if the volume does
    /// not hold it. The result has one entry per input GI.
    fn resolve(&self, volume: &Volume, gis: &[u32]) -> Result<Vec<Option<Oid>>>;
}

/// In-memory resolver keyed by volume base path.
#[derive(Debug, Clone, Default)]
pub struct MapGiResolver {
    volumes: FxHashMap<PathBuf, FxHashMap<u32, Oid>>,
}

impl MapGiResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, volume: impl Into<PathBuf>, gi: u32, oid: Oid) {
        self.volumes.entry(volume.into()).or_default().insert(gi, oid);
    }

    /// Adds every `(gi, oid)` pair for one volume.
    pub fn with_volume<I>(mut self, volume: impl Into<PathBuf>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (u32, Oid)>,
    {
        self.volumes.entry(volume.into()).or_default().extend(pairs);
        self
    }

    fn lookup(&self, volume: &Path, gi: u32) -> Option<Oid> {
        self.volumes.get(volume).and_then(|table| table.get(&gi)).copied()
    }
}

impl GiOidResolver for MapGiResolver {
    fn resolve(&self, volume: &Volume, gis: &[u32]) -> Result<Vec<Option<Oid>>> {
        let num_oids = volume.num_oids();
        Ok(gis
            .iter()
            .map(|&gi| {
                self.lookup(volume.base_path(), gi)
                    .filter(|&oid| oid < num_oids)
            })
            .collect())
    }
}
