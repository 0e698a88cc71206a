//! On-disk layout of the derivative store.
//!
//! ```text
//! {root}/annotations/{map_id}.json
//! {root}/iiif/images/{image_id}/info.json
//! {root}/iiif/images/{image_id}/{x},{y},{w},{h}/{w},{h}/0/default.jpg
//! ```
//!
//! Every file is written to a `.partial` sibling first and renamed into
//! place, so a file that exists is always complete.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;

#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
    base_url: String,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn annotations_dir(&self) -> PathBuf {
        self.root.join("annotations")
    }

    /// The rewritten record of a map; its presence marks the map complete.
    pub fn annotation_path(&self, map_id: &str) -> PathBuf {
        self.annotations_dir().join(format!("{}.json", map_id))
    }

    pub fn image_dir(&self, image_id: &str) -> PathBuf {
        self.root.join("iiif").join("images").join(image_id)
    }

    pub fn info_path(&self, image_id: &str) -> PathBuf {
        self.image_dir(image_id).join("info.json")
    }

    /// Path of a tile given its `{region}/{size}/0/default.jpg` request path.
    pub fn tile_path(&self, image_id: &str, request_path: &str) -> PathBuf {
        request_path
            .split('/')
            .fold(self.image_dir(image_id), |path, segment| path.join(segment))
    }

    /// URI the derivative image is served under.
    pub fn local_image_uri(&self, image_id: &str) -> String {
        format!("{}/iiif/images/{}", self.base_url, image_id)
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Write `contents` to `path`, creating parent directories.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let partial = partial_path(path);
    fs::write(&partial, contents).await?;
    fs::rename(&partial, path).await
}

/// Serialize `value` as pretty JSON and write it atomically.
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> std::io::Result<()> {
    let mut contents = serde_json::to_vec_pretty(value)?;
    contents.push(b'\n');
    write_atomic(path, &contents).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{list_files, temp_test_dir};

    #[test]
    fn test_layout_paths() {
        let layout = StorageLayout::new("/data", "http://localhost/");

        assert_eq!(layout.annotation_path("abc"), PathBuf::from("/data/annotations/abc.json"));
        assert_eq!(
            layout.info_path("0011"),
            PathBuf::from("/data/iiif/images/0011/info.json")
        );
        assert_eq!(
            layout.tile_path("0011", "0,0,512,512/512,512/0/default.jpg"),
            PathBuf::from("/data/iiif/images/0011/0,0,512,512/512,512/0/default.jpg")
        );
        assert_eq!(layout.local_image_uri("0011"), "http://localhost/iiif/images/0011");
    }

    #[tokio::test]
    async fn test_write_atomic_leaves_no_partial() {
        let dir = temp_test_dir();
        let path = dir.path().join("a/b/tile.jpg");

        write_atomic(&path, b"jpeg").await.unwrap();
        write_atomic(&path, b"jpeg2").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"jpeg2");
        let files = list_files(dir.path());
        assert_eq!(files.len(), 1);
        assert!(!partial_path(&path).exists());
    }

    #[tokio::test]
    async fn test_write_json_is_deterministic() {
        let dir = temp_test_dir();
        let first = dir.path().join("first.json");
        let second = dir.path().join("second.json");
        let value = serde_json::json!({ "b": 1, "a": [1, 2] });

        write_json(&first, &value).await.unwrap();
        write_json(&second, &value).await.unwrap();

        assert_eq!(std::fs::read(first).unwrap(), std::fs::read(second).unwrap());
    }
}
