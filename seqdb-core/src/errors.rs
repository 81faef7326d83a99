use std::path::PathBuf;

use thiserror::Error;

/// Error type shared by every seqdb crate.
///
/// Variants fall into two families: argument errors, which describe a bad
/// request from the caller, and file errors, which describe a database that
/// cannot be opened consistently. Neither is ever retried internally.
#[derive(Error, Debug)]
pub enum SeqDbError {
    #[error("No database names were {0}")]
    NoDatabaseNames(String),

    #[error("Invalid sequence type: '{0}'")]
    InvalidSeqType(char),

    #[error("OID {oid} is out of range (database has {num_oids} OIDs)")]
    OidOutOfRange { oid: u32, num_oids: u32 },

    #[error("Invalid range [{start}, {end}) for {what}")]
    InvalidRange { what: String, start: u64, end: u64 },

    #[error("File did not exist: {0}")]
    FileNotFound(PathBuf),

    #[error("Corrupt file {path}: {reason}")]
    CorruptFile { path: PathBuf, reason: String },

    #[error("Unsupported format version {found} in {path} (expected {expected})")]
    VersionMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("Sequence type mismatch in {path}: file is {found}, {requested} was requested")]
    SeqTypeMismatch {
        path: PathBuf,
        found: String,
        requested: String,
    },

    #[error("Illegal configuration: DB alias files are mutually recursive ({0})")]
    CyclicAlias(PathBuf),

    #[error("Alias file ({alias}) uses {directive} but has {count} volumes ({volumes})")]
    AmbiguousFilter {
        alias: PathBuf,
        directive: String,
        count: usize,
        volumes: String,
    },

    #[error("Alias file ({alias}) has multiple GI lists ({lists})")]
    MultipleGiLists { alias: PathBuf, lists: String },

    #[error("Alias file ({alias}) combines {first} with {second} for one volume reference")]
    ConflictingFilters {
        alias: PathBuf,
        first: String,
        second: String,
    },

    #[error("No alias or index file found for component [{name}], type [{seq_type}] in search path [{search_path}]")]
    ComponentNotFound {
        name: String,
        seq_type: String,
        search_path: String,
    },

    #[error("Alias set file {path}: syntax error near offset {offset}")]
    GroupAliasSyntax { path: PathBuf, offset: usize },

    #[error("Invalid value for {key} in alias file {path}: '{value}'")]
    InvalidAliasValue {
        path: PathBuf,
        key: String,
        value: String,
    },

    #[error("Invalid GI list {path}: {reason}")]
    InvalidGiList { path: PathBuf, reason: String },

    #[error("GI list {0} needs translation but no GI resolver was configured")]
    MissingGiResolver(PathBuf),

    #[error("Can't read configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SeqDbError {
    /// Returns true for errors caused by the caller's request rather than
    /// by the database files.
    pub fn is_argument_error(&self) -> bool {
        matches!(
            self,
            SeqDbError::NoDatabaseNames(_)
                | SeqDbError::InvalidSeqType(_)
                | SeqDbError::OidOutOfRange { .. }
                | SeqDbError::InvalidRange { .. }
        )
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        SeqDbError::CorruptFile {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for seqdb operations.
pub type Result<T> = std::result::Result<T, SeqDbError>;
