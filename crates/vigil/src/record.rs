//! A managed file as seen by one operation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use vigil_model::MetadataRecord;

use crate::error::{Result, VigilError};
use crate::metadata_io::MetadataSerializer;
use crate::storage::StorageLocation;

/// Logical path, owning location, and (once loaded) metadata of one file.
///
/// Instances are owned by a single event for its duration.
#[derive(Debug, Clone)]
pub struct FileRecord {
    path: PathBuf,
    location: Arc<dyn StorageLocation>,
    metadata: Option<MetadataRecord>,
}

impl FileRecord {
    pub fn new(path: impl Into<PathBuf>, location: Arc<dyn StorageLocation>) -> Self {
        Self {
            path: path.into(),
            location,
            metadata: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path as stored in the index.
    pub fn index_key(&self) -> Result<&str> {
        index_key(&self.path)
    }

    pub fn location(&self) -> &Arc<dyn StorageLocation> {
        &self.location
    }

    pub fn physical_path(&self) -> Result<PathBuf> {
        self.location.resolve_path(&self.path)
    }

    pub fn metadata_path(&self) -> Result<PathBuf> {
        self.location.metadata_path_for(&self.path)
    }

    pub fn metadata(&self) -> Option<&MetadataRecord> {
        self.metadata.as_ref()
    }

    pub fn metadata_mut(&mut self) -> Option<&mut MetadataRecord> {
        self.metadata.as_mut()
    }

    pub fn set_metadata(&mut self, record: MetadataRecord) {
        self.metadata = Some(record);
    }

    pub fn metadata_exists(&self, serializer: &MetadataSerializer) -> Result<bool> {
        Ok(serializer.exists(&self.metadata_path()?))
    }

    /// Load metadata from durable storage, replacing anything in memory.
    pub fn load_metadata(&mut self, serializer: &MetadataSerializer) -> Result<&mut MetadataRecord> {
        let path = self.metadata_path()?;
        if !serializer.exists(&path) {
            return Err(VigilError::metadata(&self.path, "no metadata found; file is not registered"));
        }
        let record = serializer.load(&path)?;
        Ok(self.metadata.insert(record))
    }

    pub fn persist_metadata(&self, serializer: &MetadataSerializer) -> Result<()> {
        let record = self
            .metadata
            .as_ref()
            .ok_or_else(|| VigilError::metadata(&self.path, "no metadata to persist"))?;
        serializer.persist(record, &self.metadata_path()?)
    }
}

/// Index key for `path`. The index stores text, so a path that is not valid
/// UTF-8 cannot be indexed without losing the way back to its metadata.
pub(crate) fn index_key(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| VigilError::metadata(path, "path is not valid UTF-8 and cannot be stored in the index"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FilesystemLocation;

    #[test]
    fn test_index_key_is_the_logical_path() {
        let location = Arc::new(FilesystemLocation::new("loc1", "/data/loc1", "/md/loc1"));
        let file = FileRecord::new("/data/loc1/na\u{ef}ve.txt", location);
        assert_eq!(file.index_key().unwrap(), "/data/loc1/na\u{ef}ve.txt");
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_path_has_no_index_key() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let location = Arc::new(FilesystemLocation::new("loc1", "/data/loc1", "/md/loc1"));
        let file = FileRecord::new(Path::new("/data/loc1").join(OsStr::from_bytes(b"caf\xE9.txt")), location);
        let err = file.index_key().unwrap_err();
        assert!(matches!(err, VigilError::Metadata { .. }));
        assert!(!err.is_fatal());
    }
}
