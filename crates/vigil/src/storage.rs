//! Storage locations.
//!
//! A location is a named data root plus a parallel metadata root. The
//! metadata document for `<path>/<rel>` lives at
//! `<metadata_path>/<rel>.vmd.yml`.

use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::config::LocationSettings;
use crate::error::{Result, VigilError};

/// Suffix appended to a file's relative path to name its metadata document.
pub const METADATA_SUFFIX: &str = ".vmd.yml";
const METADATA_MARKER: &str = "vmd";
const METADATA_EXTENSION: &str = "yml";

pub trait StorageLocation: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Root of the managed files.
    fn path(&self) -> &Path;

    /// Root of the metadata documents.
    fn metadata_path(&self) -> &Path;

    /// Physical path of the object at logical `path`.
    fn resolve_path(&self, path: &Path) -> Result<PathBuf>;

    fn is_available(&self) -> Result<()>;

    /// `path` relative to the location root.
    fn relativize(&self, path: &Path) -> Result<PathBuf> {
        let relative = path
            .strip_prefix(self.path())
            .map_err(|_| VigilError::InvalidStoragePath(path.to_path_buf()))?;
        if relative.as_os_str().is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(VigilError::InvalidStoragePath(path.to_path_buf()));
        }
        Ok(relative.to_path_buf())
    }

    /// Metadata document for the object at `path`.
    fn metadata_path_for(&self, path: &Path) -> Result<PathBuf> {
        let relative = self.relativize(path)?;
        let mut name = relative.into_os_string();
        name.push(METADATA_SUFFIX);
        Ok(self.metadata_path().join(name))
    }

    /// Metadata directory mirroring the directory at `path`.
    fn metadata_dir_for(&self, path: &Path) -> Result<PathBuf> {
        if path == self.path() {
            return Ok(self.metadata_path().to_path_buf());
        }
        Ok(self.metadata_path().join(self.relativize(path)?))
    }

    /// Logical object path for a metadata document, if it is one.
    ///
    /// Works on `OsStr` components so names that are not valid UTF-8 map back
    /// to their objects.
    fn path_for_metadata(&self, metadata_file: &Path) -> Option<PathBuf> {
        let relative = metadata_file.strip_prefix(self.metadata_path()).ok()?;
        if relative.extension()? != OsStr::new(METADATA_EXTENSION) {
            return None;
        }
        let stem = relative.with_extension("");
        if stem.extension()? != OsStr::new(METADATA_MARKER) {
            return None;
        }
        let object = stem.with_extension("");
        object.file_name()?;
        Some(self.path().join(object))
    }
}

/// Location backed by a local or mounted filesystem.
#[derive(Debug, Clone)]
pub struct FilesystemLocation {
    name: String,
    path: PathBuf,
    metadata_path: PathBuf,
}

impl FilesystemLocation {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, metadata_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            metadata_path: metadata_path.into(),
        }
    }

    fn check_dir(&self, dir: &Path, what: &str) -> Result<()> {
        match fs::read_dir(dir) {
            Ok(_) => Ok(()),
            Err(e) => Err(VigilError::StorageLocationUnavailable {
                name: self.name.clone(),
                reason: format!("{} {} is not readable: {}", what, dir.display(), e),
            }),
        }
    }
}

impl StorageLocation for FilesystemLocation {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    fn resolve_path(&self, path: &Path) -> Result<PathBuf> {
        self.relativize(path)?;
        Ok(path.to_path_buf())
    }

    fn is_available(&self) -> Result<()> {
        self.check_dir(&self.path, "data root")?;
        self.check_dir(&self.metadata_path, "metadata root")
    }
}

/// Resolves paths to the configured location containing them.
#[derive(Debug, Clone, Default)]
pub struct LocationManager {
    locations: Vec<Arc<dyn StorageLocation>>,
}

impl LocationManager {
    pub fn from_settings(settings: &[LocationSettings]) -> Self {
        let mut manager = Self::default();
        for loc in settings {
            manager.add(Arc::new(FilesystemLocation::new(
                loc.name.clone(),
                loc.path.clone(),
                loc.metadata_path.clone(),
            )));
        }
        manager
    }

    pub fn add(&mut self, location: Arc<dyn StorageLocation>) {
        self.locations.push(location);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn StorageLocation>> {
        self.locations
            .iter()
            .find(|loc| loc.name() == name)
            .cloned()
            .ok_or_else(|| VigilError::configuration(format!("unknown storage location '{}'", name)))
    }

    pub fn all(&self) -> &[Arc<dyn StorageLocation>] {
        &self.locations
    }

    /// The location whose root is the longest prefix of `path`.
    pub fn location_for(&self, path: &Path) -> Result<Arc<dyn StorageLocation>> {
        self.locations
            .iter()
            .filter(|loc| path.starts_with(loc.path()) && path != loc.path())
            .max_by_key(|loc| loc.path().components().count())
            .cloned()
            .ok_or_else(|| VigilError::InvalidStoragePath(path.to_path_buf()))
    }

    /// The location containing `path` or rooted at it.
    pub fn location_containing(&self, path: &Path) -> Result<Arc<dyn StorageLocation>> {
        self.locations
            .iter()
            .filter(|loc| path.starts_with(loc.path()))
            .max_by_key(|loc| loc.path().components().count())
            .cloned()
            .ok_or_else(|| VigilError::InvalidStoragePath(path.to_path_buf()))
    }
}
