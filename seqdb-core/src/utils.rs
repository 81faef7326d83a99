use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::models::{FileKind, SeqType};

/// Appends `.ext` to a database base path.
///
/// Volume names routinely contain dots (`nr.00`), so the extension is
/// appended rather than substituted.
pub fn with_added_extension(base: &Path, ext: &str) -> PathBuf {
    let mut s: OsString = base.as_os_str().to_owned();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

/// Path of one file of a database, e.g. `db/nr.00` + index → `db/nr.00.pin`.
pub fn db_file_path(base: &Path, seq_type: SeqType, kind: FileKind) -> PathBuf {
    with_added_extension(base, seq_type.extension(kind))
}

/// Removes the last extension from a file path, giving the database base path.
pub fn strip_extension(path: &Path) -> PathBuf {
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(_)) => path.with_file_name(stem),
        _ => path.to_path_buf(),
    }
}

/// Joins a node directory with a name from an alias file.
///
/// An empty directory leaves the name untouched; an absolute name ignores
/// the directory.
pub fn join_dir(dir: &Path, name: &str) -> PathBuf {
    if dir.as_os_str().is_empty() {
        PathBuf::from(name)
    } else {
        dir.join(name)
    }
}

/// True if the name carries a directory part (`sub/nr` or `/abs/nr`).
pub fn has_dir_component(name: &str) -> bool {
    Path::new(name)
        .parent()
        .map(|p| !p.as_os_str().is_empty())
        .unwrap_or(false)
}

/// The final component of a path as UTF-8, or an empty string.
pub fn file_name_str(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

/// Directory part of a path; empty when the path has none.
pub fn dir_of(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    fn test_extension_is_appended() {
        assert_eq!(
            db_file_path(Path::new("db/nr.00"), SeqType::Protein, FileKind::Index),
            PathBuf::from("db/nr.00.pin")
        );
        assert_eq!(strip_extension(Path::new("db/nr.00.pal")), PathBuf::from("db/nr.00"));
        assert_eq!(strip_extension(Path::new("nr")), PathBuf::from("nr"));
    }

    #[rstest]
    #[case("", "nr", "nr")]
    #[case("/db", "nr", "/db/nr")]
    #[case("/db", "/other/nr", "/other/nr")]
    fn test_join_dir(#[case] dir: &str, #[case] name: &str, #[case] expected: &str) {
        assert_eq!(join_dir(Path::new(dir), name), PathBuf::from(expected));
    }

    #[rstest]
    fn test_dir_component() {
        assert!(!has_dir_component("nr"));
        assert!(has_dir_component("sub/nr"));
        assert!(has_dir_component("/abs/nr"));
        assert_eq!(file_name_str(Path::new("/a/b/nr.pal")), "nr.pal");
        assert_eq!(dir_of(Path::new("nr.pal")), PathBuf::new());
    }
}
