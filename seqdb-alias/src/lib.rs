//! # Alias files
//!
//! Alias files are small text files of `KEY value` lines that compose
//! volumes and other alias files into one database, optionally restricting
//! it with OID ranges, OID masks or GI lists. This crate parses them (alone
//! or bundled in a group alias file), builds the [`AliasNode`] tree for a
//! list of database names, folds database-wide values over the tree and
//! extracts the per-volume filters.
pub mod group;
pub mod masks;
pub mod node;
pub mod parse;
pub mod walker;

pub use group::GroupAliasSets;
pub use node::AliasNode;
pub use parse::AliasValues;
pub use walker::{Accumulator, Aggregate, VolumeInfo, VolumeLookup};
