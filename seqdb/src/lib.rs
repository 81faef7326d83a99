//! # Read-only access to BLAST sequence databases
//!
//! A database is named by one or more volume or alias names. Opening it
//! resolves the alias tree, opens every volume and lays them end to end in
//! one global OID space. Filters from alias files (OID ranges, OID masks,
//! GI lists) and a caller-supplied GI list are folded into an inclusion
//! bitmap the first time iteration needs it.
//!
//! ## Crates
//!
//! - `seqdb-core`: errors, sequence types, filters, configuration
//! - `seqdb-io`: the memory atlas and the on-disk volume files
//! - `seqdb-alias`: alias file parsing and the alias tree
//! - `seqdb` (this crate): the volume set, the OID bitmap and [`SeqDb`]
pub mod oid_bitmap;
pub mod resolver;
pub mod seqdb;
pub mod volset;

pub use oid_bitmap::OidBitmap;
pub use resolver::{GiOidResolver, MapGiResolver};
pub use seqdb::{OidChunk, OidCursor, SeqDb, SeqDbBuilder};
pub use volset::{VolumeOccurrence, VolumeSet};

// re-expose the types callers need most
pub use seqdb_core::{Oid, Result, SeqDbConfig, SeqDbError, SeqType};
pub use seqdb_io::{GiList, RegionLease};
