use std::path::{Path, PathBuf};
use std::sync::Arc;

use fxhash::FxHashMap;
use log::debug;

use seqdb_core::consts::GROUP_ALIAS_FILE_NAME;
use seqdb_core::utils::{db_file_path, dir_of, file_name_str, join_dir};
use seqdb_core::{FileKind, Result, SeqType};
use seqdb_io::{Atlas, AtlasLock};

use crate::parse::parse_group_file;

type AliasGroup = FxHashMap<String, Arc<[u8]>>;

/// Cache of group alias files and of resolved database names.
///
/// A group alias file (`index.alx`) bundles many alias files of one
/// directory. Each group is read at most once; a directory without one is
/// remembered as such. The cache belongs to one database handle.
pub struct GroupAliasSets {
    atlas: Arc<Atlas>,
    search_paths: Vec<PathBuf>,
    groups: FxHashMap<PathBuf, Option<AliasGroup>>,
    path_lookup: FxHashMap<(String, SeqType), Option<PathBuf>>,
}

impl GroupAliasSets {
    pub fn new(atlas: Arc<Atlas>, search_paths: Vec<PathBuf>) -> Self {
        GroupAliasSets {
            atlas,
            search_paths,
            groups: FxHashMap::default(),
            path_lookup: FxHashMap::default(),
        }
    }

    pub fn atlas(&self) -> &Arc<Atlas> {
        &self.atlas
    }

    /// Search path rendered for error messages.
    pub fn search_path_string(&self) -> String {
        self.search_paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":")
    }

    fn group_for(&mut self, alias_path: &Path, lock: &mut AtlasLock<'_>) -> Result<Option<&AliasGroup>> {
        let group_path = dir_of(alias_path).join(GROUP_ALIAS_FILE_NAME);
        if !self.groups.contains_key(&group_path) {
            let group = if self.atlas.does_file_exist(&group_path, lock) {
                let lease = self.atlas.get_file(&group_path, lock)?;
                let members = parse_group_file(&group_path, &lease)?;
                debug!(
                    "Read group alias file {} ({} members)",
                    group_path.display(),
                    members.len()
                );
                Some(members)
            } else {
                None
            };
            self.groups.insert(group_path.clone(), group);
        }
        Ok(self.groups.get(&group_path).and_then(Option::as_ref))
    }

    /// Contents of an alias file bundled in its directory's group file.
    ///
    /// Returns `None` when there is no group file, no member of that name,
    /// or the member is empty.
    pub fn read_alias_file(
        &mut self,
        alias_path: &Path,
        lock: &mut AtlasLock<'_>,
    ) -> Result<Option<Arc<[u8]>>> {
        let member = file_name_str(alias_path).to_string();
        Ok(self
            .group_for(alias_path, lock)?
            .and_then(|group| group.get(&member))
            .filter(|bytes| !bytes.is_empty())
            .cloned())
    }

    /// True if the alias file exists in a group file or on its own.
    pub fn alias_exists(&mut self, alias_path: &Path, lock: &mut AtlasLock<'_>) -> Result<bool> {
        if self.read_alias_file(alias_path, lock)?.is_some() {
            return Ok(true);
        }
        Ok(self.atlas.does_file_exist(alias_path, lock))
    }

    /// Contents of an alias file, preferring the group file.
    pub fn alias_contents(
        &mut self,
        alias_path: &Path,
        lock: &mut AtlasLock<'_>,
    ) -> Result<Arc<[u8]>> {
        if let Some(bytes) = self.read_alias_file(alias_path, lock)? {
            return Ok(bytes);
        }
        let lease = self.atlas.get_file(alias_path, lock)?;
        Ok(Arc::from(&lease[..]))
    }

    /// Resolves a user-supplied database name to a base path.
    ///
    /// The name is tried as given and then inside each search directory. A
    /// candidate matches when an alias file (grouped or not) or an index
    /// file of the requested type exists for it. Results are memoized.
    pub fn resolve_name(
        &mut self,
        name: &str,
        seq_type: SeqType,
        lock: &mut AtlasLock<'_>,
    ) -> Result<Option<PathBuf>> {
        let key = (name.to_string(), seq_type);
        if let Some(resolved) = self.path_lookup.get(&key) {
            return Ok(resolved.clone());
        }

        let mut candidates = vec![PathBuf::from(name)];
        if !Path::new(name).is_absolute() {
            candidates.extend(self.search_paths.iter().map(|dir| join_dir(dir, name)));
        }

        let mut resolved = None;
        for base in candidates {
            let alias = db_file_path(&base, seq_type, FileKind::Alias);
            let index = db_file_path(&base, seq_type, FileKind::Index);
            if self.alias_exists(&alias, lock)? || self.atlas.does_file_exist(&index, lock) {
                resolved = Some(base);
                break;
            }
        }

        debug!("Resolved {} database [{}] to {:?}", seq_type, name, resolved);
        self.path_lookup.insert(key, resolved.clone());
        Ok(resolved)
    }
}
