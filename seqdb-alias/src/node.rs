use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::debug;

use seqdb_core::consts::{ROOT_NODE_NAME, keys};
use seqdb_core::utils::{
    dir_of, file_name_str, has_dir_component, join_dir, strip_extension, with_added_extension,
};
use seqdb_core::{FileKind, Result, SeqDbError, SeqType};
use seqdb_io::AtlasLock;

use crate::group::GroupAliasSets;
use crate::parse::{AliasValues, parse_alias_values, tokenize};

/// One alias file, or the synthetic root built from the user's names.
///
/// A node keeps its directives, the names listed in `DBLIST`, the alias
/// files those names resolved to (as child nodes) and the remaining names,
/// which refer to volumes.
#[derive(Debug, Clone)]
pub struct AliasNode {
    alias_path: Option<PathBuf>,
    dir: PathBuf,
    this_name: PathBuf,
    values: AliasValues,
    db_list: Vec<String>,
    subnodes: Vec<AliasNode>,
    volumes: Vec<PathBuf>,
}

impl AliasNode {
    /// Builds the root node from a space separated list of database names.
    ///
    /// Every name must resolve, through the search path, to an alias file or
    /// a volume of the requested type.
    pub fn from_names(
        names: &str,
        seq_type: SeqType,
        sets: &mut GroupAliasSets,
        lock: &mut AtlasLock<'_>,
    ) -> Result<AliasNode> {
        let mut db_list = Vec::new();
        for name in tokenize(names) {
            let resolved = sets.resolve_name(&name, seq_type, lock)?.ok_or_else(|| {
                SeqDbError::ComponentNotFound {
                    name: name.clone(),
                    seq_type: seq_type.name().to_string(),
                    search_path: sets.search_path_string(),
                }
            })?;
            db_list.push(resolved.to_string_lossy().into_owned());
        }

        let mut values = AliasValues::new();
        values.insert(keys::DBLIST.to_string(), names.to_string());

        let mut root = AliasNode {
            alias_path: None,
            dir: PathBuf::new(),
            this_name: PathBuf::from(ROOT_NODE_NAME),
            values,
            db_list,
            subnodes: Vec::new(),
            volumes: Vec::new(),
        };
        let mut stack = Vec::new();
        root.expand(seq_type, sets, &mut stack, lock)?;
        Ok(root)
    }

    fn from_alias_file(
        alias_path: &Path,
        seq_type: SeqType,
        sets: &mut GroupAliasSets,
        stack: &mut Vec<PathBuf>,
        lock: &mut AtlasLock<'_>,
    ) -> Result<AliasNode> {
        debug!("Reading alias file {}", alias_path.display());
        let bytes = sets.alias_contents(alias_path, lock)?;
        let values = parse_alias_values(&bytes);
        let db_list = values.get(keys::DBLIST).map(|v| tokenize(v)).unwrap_or_default();

        let mut node = AliasNode {
            alias_path: Some(alias_path.to_path_buf()),
            dir: dir_of(alias_path),
            this_name: strip_extension(alias_path),
            values,
            db_list,
            subnodes: Vec::new(),
            volumes: Vec::new(),
        };

        stack.push(alias_path.to_path_buf());
        let expanded = node.expand(seq_type, sets, stack, lock);
        stack.pop();
        expanded.map(|_| node)
    }

    fn expand(
        &mut self,
        seq_type: SeqType,
        sets: &mut GroupAliasSets,
        stack: &mut Vec<PathBuf>,
        lock: &mut AtlasLock<'_>,
    ) -> Result<()> {
        if self.db_list.is_empty() {
            let situation = match &self.alias_path {
                None => "passed in".to_string(),
                Some(path) => format!("found in alias file [{}]", path.display()),
            };
            return Err(SeqDbError::NoDatabaseNames(situation));
        }

        let own_name = file_name_str(&self.this_name).to_string();
        let mut subnodes = Vec::new();
        let mut volumes = Vec::new();
        for name in &self.db_list {
            // A bare name equal to this file's own name is the volume beside it.
            if !has_dir_component(name) && *name == own_name {
                volumes.push(self.this_name.clone());
                continue;
            }

            let base = join_dir(&self.dir, name);
            let candidate = with_added_extension(&base, seq_type.extension(FileKind::Alias));
            if stack.contains(&candidate) {
                return Err(SeqDbError::CyclicAlias(candidate));
            }

            if sets.alias_exists(&candidate, lock)? {
                subnodes.push(AliasNode::from_alias_file(&candidate, seq_type, sets, stack, lock)?);
            } else {
                debug!(
                    "{} refers to volume {}",
                    self.this_name.display(),
                    base.display()
                );
                volumes.push(base);
            }
        }
        self.subnodes = subnodes;
        self.volumes = volumes;
        Ok(())
    }

    /// Path of the alias file; `None` for the root.
    pub fn alias_path(&self) -> Option<&Path> {
        self.alias_path.as_deref()
    }

    /// Display name: the alias path, or `-` for the root.
    pub fn name(&self) -> String {
        match &self.alias_path {
            Some(path) => path.display().to_string(),
            None => ROOT_NODE_NAME.to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn values(&self) -> &AliasValues {
        &self.values
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn db_list(&self) -> &[String] {
        &self.db_list
    }

    pub fn subnodes(&self) -> &[AliasNode] {
        &self.subnodes
    }

    /// Base paths of the volumes this node names directly.
    pub fn volumes(&self) -> &[PathBuf] {
        &self.volumes
    }

    /// Every volume base path in this subtree, sorted and de-duplicated.
    pub fn volume_names(&self) -> Vec<PathBuf> {
        let mut names = BTreeSet::new();
        self.collect_volume_names(&mut names);
        names.into_iter().collect()
    }

    fn collect_volume_names(&self, names: &mut BTreeSet<PathBuf>) {
        names.extend(self.volumes.iter().cloned());
        for sub in &self.subnodes {
            sub.collect_volume_names(names);
        }
    }
}
