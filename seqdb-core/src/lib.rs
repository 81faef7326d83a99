//! # Core types for seqdb
//!
//! Shared building blocks for the seqdb crates: the [`SeqDbError`] type,
//! the [`SeqType`] model with its file naming rules, volume filter
//! descriptions, on-disk constants and [`SeqDbConfig`].
pub mod config;
pub mod consts;
pub mod errors;
pub mod models;
pub mod utils;

// re-expose core items
pub use config::SeqDbConfig;
pub use errors::{Result, SeqDbError};
pub use models::{FileKind, Oid, OidRange, SeqType, VolumeFilter};
