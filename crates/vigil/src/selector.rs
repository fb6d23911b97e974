//! File selection.
//!
//! A selector names either explicit file paths or storage locations, never
//! both. A file path ending in `/` selects everything beneath that
//! directory; any other path selects exactly that object.

use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::Arc;

use vigil_db::PathFilter;

use crate::error::{Result, VigilError};
use crate::storage::{LocationManager, StorageLocation};

/// How much a target path covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Exactly the named object (file or composite directory)
    Object,
    /// Everything beneath the named directory
    Tree,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub path: PathBuf,
    pub scope: Scope,
}

impl Target {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(VigilError::configuration("empty file path in selection"));
        }
        let scope = if trimmed.ends_with('/') || trimmed.ends_with(MAIN_SEPARATOR) {
            Scope::Tree
        } else {
            Scope::Object
        };
        let path = std::path::absolute(Path::new(trimmed))?;
        Ok(Self { path, scope })
    }

    pub fn object(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            scope: Scope::Object,
        }
    }

    pub fn tree(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            scope: Scope::Tree,
        }
    }

    /// Index filter text: trailing separator for trees.
    pub fn filter_text(&self) -> String {
        let text = self.path.to_string_lossy();
        match self.scope {
            Scope::Object => text.trim_end_matches('/').to_string(),
            Scope::Tree => format!("{}/", text.trim_end_matches('/')),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSelector {
    file_paths: Vec<Target>,
    location_names: Vec<String>,
}

impl FileSelector {
    /// Build a selector; exactly one of `file_paths` and `location_names`
    /// must be non-empty.
    pub fn new(file_paths: Vec<Target>, location_names: Vec<String>) -> Result<Self> {
        match (file_paths.is_empty(), location_names.is_empty()) {
            (true, true) => Err(VigilError::configuration(
                "must provide either file paths or storage location names",
            )),
            (false, false) => Err(VigilError::configuration(
                "cannot provide both file paths and storage location names",
            )),
            _ => Ok(Self {
                file_paths,
                location_names,
            }),
        }
    }

    pub fn from_paths<I, S>(paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let targets = paths
            .into_iter()
            .map(|p| Target::parse(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::new(targets, Vec::new())
    }

    pub fn from_locations<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Vec::new(), names.into_iter().map(Into::into).collect())
    }

    pub fn file_paths(&self) -> &[Target] {
        &self.file_paths
    }

    pub fn location_names(&self) -> &[String] {
        &self.location_names
    }

    /// Targets to scan: explicit paths, or the roots of the named locations.
    pub fn targets(&self, locations: &LocationManager) -> Result<Vec<Target>> {
        if !self.file_paths.is_empty() {
            return Ok(self.file_paths.clone());
        }
        self.location_names
            .iter()
            .map(|name| Ok(Target::tree(locations.get(name)?.path())))
            .collect()
    }

    /// Locations touched by this selection. Paths outside every location are
    /// left for per-file reporting.
    pub fn locations(&self, locations: &LocationManager) -> Result<Vec<Arc<dyn StorageLocation>>> {
        let mut selected: Vec<Arc<dyn StorageLocation>> = Vec::new();
        if self.file_paths.is_empty() {
            for name in &self.location_names {
                selected.push(locations.get(name)?);
            }
        } else {
            for target in &self.file_paths {
                if let Ok(loc) = locations.location_containing(&target.path) {
                    if !selected.iter().any(|s| s.name() == loc.name()) {
                        selected.push(loc);
                    }
                }
            }
        }
        Ok(selected)
    }

    pub fn path_filter(&self, locations: &LocationManager) -> Result<PathFilter> {
        let targets = self.targets(locations)?;
        Ok(PathFilter::from_targets(targets.iter().map(Target::filter_text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FilesystemLocation;
    use vigil_db::PathPattern;

    fn manager() -> LocationManager {
        let mut manager = LocationManager::default();
        manager.add(Arc::new(FilesystemLocation::new("loc1", "/data/loc1", "/md/loc1")));
        manager.add(Arc::new(FilesystemLocation::new("loc2", "/data/loc2", "/md/loc2")));
        manager
    }

    #[test]
    fn test_exactly_one_selection_kind() {
        assert!(matches!(
            FileSelector::new(Vec::new(), Vec::new()),
            Err(VigilError::Configuration(_))
        ));
        assert!(matches!(
            FileSelector::new(vec![Target::object("/data/loc1/a")], vec!["loc1".into()]),
            Err(VigilError::Configuration(_))
        ));
        assert!(FileSelector::from_locations(["loc1"]).is_ok());
    }

    #[test]
    fn test_trailing_separator_selects_tree() {
        let selector = FileSelector::from_paths(["/data/loc1/sub/", "/data/loc1/a.txt"]).unwrap();
        assert_eq!(selector.file_paths()[0].scope, Scope::Tree);
        assert_eq!(selector.file_paths()[1].scope, Scope::Object);

        let filter = selector.path_filter(&manager()).unwrap();
        assert_eq!(
            filter.patterns(),
            &[
                PathPattern::Prefix("/data/loc1/sub/".to_string()),
                PathPattern::Exact("/data/loc1/a.txt".to_string()),
            ]
        );
    }

    #[test]
    fn test_location_selection_filters_by_root() {
        let manager = manager();
        let selector = FileSelector::from_locations(["loc2"]).unwrap();
        let filter = selector.path_filter(&manager).unwrap();
        assert_eq!(filter.patterns(), &[PathPattern::Prefix("/data/loc2/".to_string())]);
        assert_eq!(selector.locations(&manager).unwrap()[0].name(), "loc2");

        let unknown = FileSelector::from_locations(["nope"]).unwrap();
        assert!(matches!(unknown.targets(&manager), Err(VigilError::Configuration(_))));
    }

    #[test]
    fn test_paths_map_to_distinct_locations() {
        let selector =
            FileSelector::from_paths(["/data/loc1/a", "/data/loc1/b", "/data/loc2/c", "/else/d"]).unwrap();
        let names: Vec<String> = selector
            .locations(&manager())
            .unwrap()
            .iter()
            .map(|l| l.name().to_string())
            .collect();
        assert_eq!(names, vec!["loc1", "loc2"]);
    }
}
