use std::path::PathBuf;

use super::Oid;

/// Volume-local OID window `[first, last)` carried by a filter directive.
///
/// `last` is `Oid::MAX` when the alias file gives no `LAST_OID`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OidRange {
    pub first: Oid,
    pub last: Oid,
}

impl OidRange {
    pub const UNBOUNDED: OidRange = OidRange {
        first: 0,
        last: Oid::MAX,
    };

    /// Builds a window from alias file values.
    ///
    /// `FIRST_OID` counts from one and is shifted down; `LAST_OID` is
    /// already an exclusive zero-based bound and is kept as-is.
    pub fn from_alias_values(first_oid: Option<Oid>, last_oid: Option<Oid>) -> Self {
        let first = match first_oid {
            Some(first) if first > 0 => first - 1,
            _ => 0,
        };
        OidRange {
            first,
            last: last_oid.unwrap_or(Oid::MAX),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        *self == Self::UNBOUNDED
    }

    /// Clips the window to a volume holding `num_oids` records.
    ///
    /// Returns `None` when nothing of the volume survives.
    pub fn clip(&self, num_oids: Oid) -> Option<(Oid, Oid)> {
        let end = self.last.min(num_oids);
        if self.first >= end {
            None
        } else {
            Some((self.first, end))
        }
    }
}

impl Default for OidRange {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}

/// How one volume occurrence contributes to the global OID space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeFilter {
    /// Every OID of the volume is included.
    Full,
    /// Only OIDs inside the window are included.
    Range(OidRange),
    /// OIDs set in the mask file (and inside the window) are included.
    OidMask { path: PathBuf, range: OidRange },
    /// OIDs reachable from the GI list (and inside the window) are included.
    GiList { path: PathBuf, range: OidRange },
}

impl VolumeFilter {
    pub fn is_full(&self) -> bool {
        matches!(self, VolumeFilter::Full)
    }

    pub fn range(&self) -> OidRange {
        match self {
            VolumeFilter::Full => OidRange::UNBOUNDED,
            VolumeFilter::Range(range)
            | VolumeFilter::OidMask { range, .. }
            | VolumeFilter::GiList { range, .. } => *range,
        }
    }
}
