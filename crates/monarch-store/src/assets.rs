//! Filesystem blob store for downloaded observation photos.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use monarch_core::ObservationId;
use tracing::{debug, info};

use crate::StoreError;

const ASSET_EXTENSION: &str = "jpg";

/// Where an asset landed and how stored records refer to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    /// Physical location on this machine.
    pub path: PathBuf,
    /// Stable reference kept in `image_local_path`, e.g. `/data/images/42.jpg`.
    pub reference: String,
}

/// Blob store addressing one asset per observation id.
///
/// Assets live at `<dir>/<id>.jpg`. The reference prefix is the directory as
/// seen by the annotation system, which usually mounts the same volume at a
/// different path.
#[derive(Debug, Clone)]
pub struct AssetStore {
    dir: PathBuf,
    reference_prefix: String,
}

impl AssetStore {
    /// Open an asset store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: &Path, reference_prefix: &str) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            reference_prefix: reference_prefix.trim_end_matches('/').to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(id: ObservationId) -> String {
        format!("{id}.{ASSET_EXTENSION}")
    }

    pub fn path_for(&self, id: ObservationId) -> PathBuf {
        self.dir.join(Self::file_name(id))
    }

    pub fn reference_for(&self, id: ObservationId) -> String {
        format!("{}/{}", self.reference_prefix, Self::file_name(id))
    }

    pub fn exists(&self, id: ObservationId) -> bool {
        self.path_for(id).is_file()
    }

    /// Write an asset durably.
    ///
    /// Bytes go to a temporary file in the same directory, are synced, and
    /// are then renamed over `<id>.jpg`. A crash mid-write leaves at most a
    /// stray temp file, never a truncated asset under the final name.
    pub fn write(&self, id: ObservationId, bytes: &[u8]) -> Result<AssetRef, StoreError> {
        let path = self.path_for(id);
        let mut tmp = tempfile::Builder::new()
            .prefix(".incoming-")
            .tempfile_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        debug!(id, path = %path.display(), bytes = bytes.len(), "asset written");
        Ok(AssetRef {
            path,
            reference: self.reference_for(id),
        })
    }

    /// Delete one asset. Returns whether a file was removed.
    pub fn remove(&self, id: ObservationId) -> Result<bool, StoreError> {
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every stored asset. Returns the number of files removed.
    pub fn purge(&self) -> Result<usize, StoreError> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_asset = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(ASSET_EXTENSION));
            if path.is_file() && is_asset {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        info!(removed, dir = %self.dir.display(), "purged assets");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, AssetStore) {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = AssetStore::open(&tmp.path().join("images"), "/data/images/").unwrap();
        (tmp, store)
    }

    #[test]
    fn open_creates_directory() {
        let (_tmp, store) = store();
        assert!(store.dir().is_dir());
    }

    #[test]
    fn write_places_asset_by_id() {
        let (_tmp, store) = store();
        let asset = store.write(42, b"jpeg bytes").unwrap();
        assert_eq!(asset.path, store.dir().join("42.jpg"));
        assert_eq!(asset.reference, "/data/images/42.jpg");
        assert_eq!(std::fs::read(&asset.path).unwrap(), b"jpeg bytes");
        assert!(store.exists(42));
    }

    #[test]
    fn write_leaves_no_temp_files() {
        let (_tmp, store) = store();
        store.write(1, b"a").unwrap();
        store.write(1, b"b").unwrap();
        let names: Vec<_> = std::fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["1.jpg".to_string()]);
        assert_eq!(std::fs::read(store.path_for(1)).unwrap(), b"b");
    }

    #[test]
    fn remove_reports_presence() {
        let (_tmp, store) = store();
        store.write(7, b"x").unwrap();
        assert!(store.remove(7).unwrap());
        assert!(!store.remove(7).unwrap());
        assert!(!store.exists(7));
    }

    #[test]
    fn purge_only_touches_assets() {
        let (_tmp, store) = store();
        store.write(1, b"x").unwrap();
        store.write(2, b"y").unwrap();
        std::fs::write(store.dir().join("notes.txt"), b"keep").unwrap();
        assert_eq!(store.purge().unwrap(), 2);
        assert!(store.dir().join("notes.txt").exists());
        assert!(!store.exists(1));
    }
}
