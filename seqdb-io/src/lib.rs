//! # File access for seqdb
//!
//! The [`Atlas`] manages mapped and buffered byte regions of database files.
//! On top of it sit typed readers for each file of a volume (index,
//! sequence, header), for OID mask files and for GI lists, and the
//! [`Volume`] type that ties one index/sequence/header triple together.
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use seqdb_core::SeqType;
//! use seqdb_io::{Atlas, Volume};
//!
//! let atlas = Arc::new(Atlas::default());
//! let mut lock = atlas.lock();
//! let volume = Volume::open(&atlas, Path::new("db/nr.00"), SeqType::Protein, &mut lock).unwrap();
//! let header = volume.header_bytes(0, &mut lock).unwrap();
//! lock.unlock();
//! println!("{} header bytes", header.len());
//! ```
pub mod atlas;
pub mod blob_file;
pub mod gi_list;
pub mod index_file;
pub mod mask_file;
pub mod raw_file;
pub mod volume;

pub use atlas::{Atlas, AtlasLock, AtlasStats, FlushLeases, RegionLease};
pub use gi_list::GiList;
pub use mask_file::OidMaskFile;
pub use volume::Volume;
