use std::fmt::{self, Display};
use std::str::FromStr;

use crate::consts::{SEQ_TYPE_NUCLEOTIDE_MARKER, SEQ_TYPE_PROTEIN_MARKER};
use crate::errors::SeqDbError;

/// Residue type of a database.
///
/// The type selects the file extensions used for every file of a volume
/// (`.pin`/`.psq`/`.phr` versus `.nin`/`.nsq`/`.nhr`) and for alias files
/// (`.pal` versus `.nal`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeqType {
    Protein,
    Nucleotide,
}

/// The files making up one database, by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Index,
    Sequence,
    Header,
    Alias,
}

impl SeqType {
    /// One-letter code: `p` or `n`.
    pub fn code(&self) -> char {
        match self {
            SeqType::Protein => 'p',
            SeqType::Nucleotide => 'n',
        }
    }

    pub fn from_code(code: char) -> Result<Self, SeqDbError> {
        match code {
            'p' | 'P' => Ok(SeqType::Protein),
            'n' | 'N' => Ok(SeqType::Nucleotide),
            other => Err(SeqDbError::InvalidSeqType(other)),
        }
    }

    /// Marker value stored in the index file header.
    pub fn marker(&self) -> u32 {
        match self {
            SeqType::Protein => SEQ_TYPE_PROTEIN_MARKER,
            SeqType::Nucleotide => SEQ_TYPE_NUCLEOTIDE_MARKER,
        }
    }

    pub fn from_marker(marker: u32) -> Option<Self> {
        match marker {
            SEQ_TYPE_PROTEIN_MARKER => Some(SeqType::Protein),
            SEQ_TYPE_NUCLEOTIDE_MARKER => Some(SeqType::Nucleotide),
            _ => None,
        }
    }

    /// File extension (without the dot) for a file of the given kind.
    pub fn extension(&self, kind: FileKind) -> &'static str {
        match (self, kind) {
            (SeqType::Protein, FileKind::Index) => "pin",
            (SeqType::Protein, FileKind::Sequence) => "psq",
            (SeqType::Protein, FileKind::Header) => "phr",
            (SeqType::Protein, FileKind::Alias) => "pal",
            (SeqType::Nucleotide, FileKind::Index) => "nin",
            (SeqType::Nucleotide, FileKind::Sequence) => "nsq",
            (SeqType::Nucleotide, FileKind::Header) => "nhr",
            (SeqType::Nucleotide, FileKind::Alias) => "nal",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SeqType::Protein => "protein",
            SeqType::Nucleotide => "nucleotide",
        }
    }
}

impl Display for SeqType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SeqType {
    type Err = SeqDbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "protein" | "prot" | "p" => Ok(SeqType::Protein),
            "nucleotide" | "nucl" | "n" => Ok(SeqType::Nucleotide),
            _ => Err(SeqDbError::InvalidSeqType(s.chars().next().unwrap_or('?'))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(SeqType::Protein, FileKind::Index, "pin")]
    #[case(SeqType::Protein, FileKind::Alias, "pal")]
    #[case(SeqType::Nucleotide, FileKind::Sequence, "nsq")]
    #[case(SeqType::Nucleotide, FileKind::Header, "nhr")]
    fn test_extensions(#[case] seq_type: SeqType, #[case] kind: FileKind, #[case] ext: &str) {
        assert_eq!(seq_type.extension(kind), ext);
    }

    #[rstest]
    fn test_codes_and_markers() {
        assert_eq!(SeqType::from_code('p').unwrap(), SeqType::Protein);
        assert_eq!(SeqType::from_code('n').unwrap(), SeqType::Nucleotide);
        assert!(matches!(
            SeqType::from_code('x'),
            Err(SeqDbError::InvalidSeqType('x'))
        ));
        assert_eq!(SeqType::from_marker(1), Some(SeqType::Protein));
        assert_eq!(SeqType::from_marker(0), Some(SeqType::Nucleotide));
        assert_eq!(SeqType::from_marker(9), None);
        assert_eq!("Nucleotide".parse::<SeqType>().unwrap(), SeqType::Nucleotide);
    }
}
