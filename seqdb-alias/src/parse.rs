//! Line-level parsing of alias files and group alias files.
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use fxhash::FxHashMap;

use seqdb_core::consts::GROUP_ALIAS_MARKER;
use seqdb_core::{Result, SeqDbError};

/// Directives of one alias file, by key.
pub type AliasValues = BTreeMap<String, String>;

fn is_eol(b: u8) -> bool {
    b == b'\n' || b == b'\r'
}

fn is_blank(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

/// Splits one line into key and value.
///
/// The key runs up to the first space or tab. The value is the rest of the
/// line with surrounding spaces and tabs removed and inner tabs turned into
/// spaces. Comment lines (`#` first) and lines without a key give `None`.
pub fn read_line(line: &[u8]) -> Option<(String, String)> {
    if line.first() == Some(&b'#') {
        return None;
    }
    let key_end = line.iter().position(|&b| is_blank(b)).unwrap_or(line.len());
    if key_end == 0 {
        return None;
    }

    let rest = &line[key_end..];
    let start = rest.iter().position(|&b| !is_blank(b)).unwrap_or(rest.len());
    let end = rest.iter().rposition(|&b| !is_blank(b)).map_or(start, |p| p + 1);
    let value = String::from_utf8_lossy(&rest[start..end.max(start)]).replace('\t', " ");

    Some((String::from_utf8_lossy(&line[..key_end]).into_owned(), value))
}

/// Parses the full text of an alias file. A repeated key keeps its last value.
pub fn parse_alias_values(bytes: &[u8]) -> AliasValues {
    let mut values = AliasValues::new();
    for line in bytes.split(|&b| is_eol(b)) {
        let skip = line.iter().take_while(|&&b| b == b' ').count();
        if let Some((key, value)) = read_line(&line[skip..]) {
            values.insert(key, value);
        }
    }
    values
}

/// Names in a `DBLIST` value.
pub fn tokenize(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

/// Splits a group alias file into its members.
///
/// Each member starts with an `ALIAS_FILE <name>` line; the marker counts
/// only when nothing but spaces or tabs precede it on its line. Text before
/// the first marker is ignored.
pub fn parse_group_file(path: &Path, bytes: &[u8]) -> Result<FxHashMap<String, Arc<[u8]>>> {
    let marker = GROUP_ALIAS_MARKER.as_bytes();
    let mut spans: Vec<(usize, usize)> = Vec::new();

    let mut p = 0;
    while p + marker.len() < bytes.len() {
        if bytes[p..].starts_with(marker) && starts_line(bytes, p) {
            let eol = bytes[p..]
                .iter()
                .position(|&b| is_eol(b))
                .map_or(bytes.len(), |i| p + i);
            spans.push((p, eol));
            p = eol;
        } else {
            p += 1;
        }
    }

    let mut members = FxHashMap::default();
    for (i, &(start, eol)) in spans.iter().enumerate() {
        let name = match read_line(&bytes[start..eol]) {
            Some((key, value)) if key == GROUP_ALIAS_MARKER && !value.is_empty() => value,
            _ => {
                return Err(SeqDbError::GroupAliasSyntax {
                    path: path.to_path_buf(),
                    offset: start,
                });
            }
        };
        let end = spans.get(i + 1).map_or(bytes.len(), |&(next, _)| next);
        members.insert(name, Arc::from(&bytes[eol..end]));
    }
    Ok(members)
}

fn starts_line(bytes: &[u8], at: usize) -> bool {
    bytes[..at]
        .iter()
        .rev()
        .take_while(|&&b| !is_eol(b))
        .all(|&b| is_blank(b))
}
