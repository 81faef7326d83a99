pub mod filter;
pub mod seq_type;

// re-export for cleaner imports
pub use self::filter::{OidRange, VolumeFilter};
pub use self::seq_type::{FileKind, SeqType};

/// Ordinal identifier of one record in the merged database.
pub type Oid = u32;
