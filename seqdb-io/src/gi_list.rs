use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};

use seqdb_core::consts::BINARY_GI_LIST_MARKER;
use seqdb_core::{Result, SeqDbError};

use crate::atlas::{Atlas, AtlasLock};

/// A list of GIs read from a `GILIST` file or supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GiList {
    path: Option<PathBuf>,
    gis: Vec<u32>,
}

impl GiList {
    pub fn from_gis(gis: Vec<u32>) -> Self {
        GiList { path: None, gis }
    }

    /// Reads a GI list file in either of its two forms.
    ///
    /// Binary: `0xFFFFFFFF`, a count, then that many GIs, all big-endian
    /// `u32`. Text: decimal GIs separated by whitespace. Zero GIs are
    /// dropped.
    pub fn read(atlas: &Atlas, path: &Path, lock: &mut AtlasLock<'_>) -> Result<Self> {
        let lease = atlas.get_file(path, lock)?;
        let bytes: &[u8] = &lease;

        let gis = if bytes.len() >= 4 && BigEndian::read_u32(&bytes[..4]) == BINARY_GI_LIST_MARKER {
            parse_binary(path, bytes)?
        } else {
            parse_text(path, bytes)?
        };

        Ok(GiList {
            path: Some(path.to_path_buf()),
            gis,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn gis(&self) -> &[u32] {
        &self.gis
    }

    pub fn len(&self) -> usize {
        self.gis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gis.is_empty()
    }
}

fn parse_binary(path: &Path, bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() < 8 {
        return Err(SeqDbError::InvalidGiList {
            path: path.to_path_buf(),
            reason: "binary list is missing its count".to_string(),
        });
    }
    let count = BigEndian::read_u32(&bytes[4..8]) as usize;
    let body = &bytes[8..];
    if body.len() / 4 < count {
        return Err(SeqDbError::InvalidGiList {
            path: path.to_path_buf(),
            reason: format!("declares {} GIs but holds {}", count, body.len() / 4),
        });
    }
    Ok(body
        .chunks_exact(4)
        .take(count)
        .map(BigEndian::read_u32)
        .filter(|&gi| gi != 0)
        .collect())
}

fn parse_text(path: &Path, bytes: &[u8]) -> Result<Vec<u32>> {
    let mut gis = Vec::new();
    let mut current: u32 = 0;
    let mut in_number = false;

    for (offset, &b) in bytes.iter().enumerate() {
        match b {
            b'0'..=b'9' => {
                current = current
                    .checked_mul(10)
                    .and_then(|v| v.checked_add((b - b'0') as u32))
                    .ok_or_else(|| SeqDbError::InvalidGiList {
                        path: path.to_path_buf(),
                        reason: format!("GI too large near offset {}", offset),
                    })?;
                in_number = true;
            }
            b' ' | b'\t' | b'\n' | b'\r' => {
                if in_number && current != 0 {
                    gis.push(current);
                }
                current = 0;
                in_number = false;
            }
            other => {
                return Err(SeqDbError::InvalidGiList {
                    path: path.to_path_buf(),
                    reason: format!("unexpected byte 0x{:02x} at offset {}", other, offset),
                });
            }
        }
    }
    if in_number && current != 0 {
        gis.push(current);
    }
    Ok(gis)
}
