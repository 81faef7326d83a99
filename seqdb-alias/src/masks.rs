use std::path::{Path, PathBuf};

use log::debug;

use seqdb_core::consts::keys;
use seqdb_core::utils::join_dir;
use seqdb_core::{Oid, OidRange, Result, SeqDbError, VolumeFilter};

use crate::node::AliasNode;

/// A GI list passed down from an ancestor alias file.
struct InheritedGiList {
    path: PathBuf,
    range: OidRange,
    source: String,
}

impl AliasNode {
    /// Lists volume occurrences in discovery order, each with its filter.
    ///
    /// A node carrying `OIDLIST`, `GILIST`, `FIRST_OID` or `LAST_OID` must
    /// name exactly one database, and its filter applies to that occurrence
    /// alone. A `GILIST` node whose one entry is another alias file hands
    /// its list to every volume below it.
    pub fn set_masks(&self) -> Result<Vec<(PathBuf, VolumeFilter)>> {
        let mut out = Vec::new();
        self.collect_masks(None, &mut out)?;
        Ok(out)
    }

    fn collect_masks(
        &self,
        inherited: Option<&InheritedGiList>,
        out: &mut Vec<(PathBuf, VolumeFilter)>,
    ) -> Result<()> {
        let oid_list = self.value(keys::OIDLIST);
        let gi_list = self.value(keys::GILIST);
        let has_range = self.has_key(keys::FIRST_OID) || self.has_key(keys::LAST_OID);

        if let Some(parent) = inherited {
            if let Some(own) = gi_list {
                return Err(SeqDbError::MultipleGiLists {
                    alias: self.path_for_errors(),
                    lists: format!("{} {}", parent.source, own),
                });
            }
            if oid_list.is_some() || has_range {
                return Err(SeqDbError::ConflictingFilters {
                    alias: self.path_for_errors(),
                    first: format!("GI list ({})", parent.source),
                    second: self.directive(oid_list, None)?,
                });
            }
        }

        if oid_list.is_none() && gi_list.is_none() && !has_range {
            for sub in self.subnodes() {
                sub.collect_masks(inherited, out)?;
            }
            for base in self.volumes() {
                let filter = match inherited {
                    Some(list) => VolumeFilter::GiList {
                        path: list.path.clone(),
                        range: list.range,
                    },
                    None => VolumeFilter::Full,
                };
                out.push((base.clone(), filter));
            }
            return Ok(());
        }

        let directive = self.directive(oid_list, gi_list)?;
        if self.db_list().len() != 1 {
            return Err(self.ambiguous(&directive, self.db_list().len(), self.db_list().join(" ")));
        }
        if let (Some(oids), Some(gis)) = (oid_list, gi_list) {
            return Err(SeqDbError::ConflictingFilters {
                alias: self.path_for_errors(),
                first: format!("oid list ({})", oids),
                second: format!("GI list ({})", gis),
            });
        }

        let range = self.oid_range()?;
        let filter = if let Some(oids) = oid_list {
            VolumeFilter::OidMask {
                path: join_dir(self.dir(), oids),
                range,
            }
        } else if let Some(gis) = gi_list {
            if gis.contains(' ') {
                return Err(SeqDbError::MultipleGiLists {
                    alias: self.path_for_errors(),
                    lists: gis.to_string(),
                });
            }
            let path = join_dir(self.dir(), gis);
            if let Some(sub) = self.subnodes().first() {
                let list = InheritedGiList {
                    path,
                    range,
                    source: gis.to_string(),
                };
                debug!("{} passes GI list {} down", self.name(), gis);
                return sub.collect_masks(Some(&list), out);
            }
            VolumeFilter::GiList { path, range }
        } else {
            VolumeFilter::Range(range)
        };

        let volume = match self.volumes().first() {
            Some(volume) => volume.clone(),
            None => {
                let below = self.volume_names();
                if below.len() != 1 {
                    let names: Vec<String> =
                        below.iter().map(|p| p.display().to_string()).collect();
                    return Err(self.ambiguous(&directive, below.len(), names.join(" ")));
                }
                below[0].clone()
            }
        };
        debug!("{} filters {} by {:?}", self.name(), volume.display(), filter);
        out.push((volume, filter));
        Ok(())
    }

    fn oid_range(&self) -> Result<OidRange> {
        let first = self.parse_oid(keys::FIRST_OID)?;
        let last = self.parse_oid(keys::LAST_OID)?;
        Ok(OidRange::from_alias_values(first, last))
    }

    fn parse_oid(&self, key: &str) -> Result<Option<Oid>> {
        self.value(key)
            .map(|value| {
                value.parse::<Oid>().map_err(|_| SeqDbError::InvalidAliasValue {
                    path: self.path_for_errors(),
                    key: key.to_string(),
                    value: value.to_string(),
                })
            })
            .transpose()
    }

    /// Describes the filter for error messages.
    fn directive(&self, oid_list: Option<&str>, gi_list: Option<&str>) -> Result<String> {
        if let Some(oids) = oid_list {
            return Ok(format!("oid list ({})", oids));
        }
        if let Some(gis) = gi_list {
            return Ok(format!("GI list ({})", gis));
        }
        let range = self.oid_range()?;
        Ok(format!("oid range ({},{})", range.first + 1, range.last))
    }

    fn ambiguous(&self, directive: &str, count: usize, volumes: String) -> SeqDbError {
        SeqDbError::AmbiguousFilter {
            alias: self.path_for_errors(),
            directive: directive.to_string(),
            count,
            volumes,
        }
    }

    fn path_for_errors(&self) -> PathBuf {
        self.alias_path()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(self.name()))
    }
}
