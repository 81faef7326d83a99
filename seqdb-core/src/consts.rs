//! Constants describing the on-disk database layout.
//!
//! This module defines environment variable names, file names, alias file
//! keys and binary format markers used throughout seqdb.

// Environment variable names

/// Environment variable listing directories searched for database names.
///
/// Entries are separated by `:` or `;`.
///
/// # Example
///
/// ```bash
/// export BLASTDB=/data/blast:/scratch/blast
/// ```
pub const BLASTDB_ENV: &str = "BLASTDB";

// Binary formats

/// The only index file format version this crate reads.
pub const FORMAT_VERSION: u32 = 4;

/// Sequence type marker stored in protein index files.
pub const SEQ_TYPE_PROTEIN_MARKER: u32 = 1;

/// Sequence type marker stored in nucleotide index files.
pub const SEQ_TYPE_NUCLEOTIDE_MARKER: u32 = 0;

/// First word of a binary GI list file.
pub const BINARY_GI_LIST_MARKER: u32 = 0xFFFF_FFFF;

// Alias files

/// Name of the combined alias file looked up in each alias directory.
pub const GROUP_ALIAS_FILE_NAME: &str = "index.alx";

/// Marker starting each member of a group alias file.
pub const GROUP_ALIAS_MARKER: &str = "ALIAS_FILE";

/// Alias file directive keys.
pub mod keys {
    pub const TITLE: &str = "TITLE";
    pub const DBLIST: &str = "DBLIST";
    pub const NSEQ: &str = "NSEQ";
    pub const LENGTH: &str = "LENGTH";
    pub const MAX_SEQ_LENGTH: &str = "MAX_SEQ_LENGTH";
    pub const MEMB_BIT: &str = "MEMB_BIT";
    pub const OIDLIST: &str = "OIDLIST";
    pub const GILIST: &str = "GILIST";
    pub const FIRST_OID: &str = "FIRST_OID";
    pub const LAST_OID: &str = "LAST_OID";
}

/// Name given to the synthetic root alias node.
pub const ROOT_NODE_NAME: &str = "-";

// Defaults

/// Default upper bound on bytes held by the region atlas.
pub const DEFAULT_MEMORY_BOUND: u64 = 1024 * 1024 * 1024;

/// Block size used to round buffered (non-mapped) reads.
pub const BUFFERED_BLOCK_SIZE: u64 = 512 * 1024;

/// Default number of OIDs handed out per iteration chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
