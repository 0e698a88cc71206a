//! Temporary directories and file tree helpers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Creates a temporary directory for test output.
///
/// The directory is automatically cleaned up when the returned `TempDir` is dropped.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temporary test directory")
}

/// Creates a temporary directory with a specific prefix.
pub fn temp_test_dir_with_prefix(prefix: &str) -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .expect("Failed to create temporary test directory")
}

/// All regular files under `root`, relative to it, sorted.
pub fn list_files(root: &Path) -> Vec<PathBuf> {
    snapshot_tree(root).into_keys().collect()
}

/// Every regular file under `root` with its contents, keyed by relative path.
///
/// Two snapshots compare equal only if the trees are byte-identical.
pub fn snapshot_tree(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let relative = entry
                .path()
                .strip_prefix(root)
                .expect("walked path is under root")
                .to_path_buf();
            let contents = std::fs::read(entry.path()).expect("Failed to read test file");
            (relative, contents)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_test_dir() {
        let dir = temp_test_dir();
        assert!(dir.path().exists());
    }

    #[test]
    fn test_temp_test_dir_with_prefix() {
        let dir = temp_test_dir_with_prefix("iiif_test_");
        let path_str = dir.path().to_string_lossy();
        assert!(path_str.contains("iiif_test_"));
    }

    #[test]
    fn test_snapshot_tree_lists_nested_files() {
        let dir = temp_test_dir();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/b/c.txt"), b"hello").unwrap();
        std::fs::write(dir.path().join("top.txt"), b"x").unwrap();

        let snapshot = snapshot_tree(dir.path());
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[&PathBuf::from("a/b/c.txt")], b"hello".to_vec());
        assert_eq!(
            list_files(dir.path()),
            vec![PathBuf::from("a/b/c.txt"), PathBuf::from("top.txt")]
        );
    }
}
