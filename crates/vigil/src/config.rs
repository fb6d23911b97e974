//! Application configuration.
//!
//! ```yaml
//! locations:
//!   loc1:
//!     path: /data/loc1/
//!     metadata_path: /md/loc1/
//! services:
//!   fixity:
//!     kind: fixity-check
//!     frequency: 6 months
//!     properties:
//!       algorithms: [sha256]
//! service_mappings:
//!   - locations: loc1
//!     services: [fixity]
//! system:
//!   index:
//!     adapter: sqlite
//!     connection: /var/lib/vigil/index.sqlite3
//! ```
//!
//! Every problem found while loading is a [`VigilError::Configuration`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use vigil_db::{Adapter, Connection, IndexConfig};
use vigil_model::{Frequency, ServiceDefinition};

use crate::error::{Result, VigilError};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "VIGIL_CFG";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    locations: BTreeMap<String, RawLocation>,
    #[serde(default)]
    services: BTreeMap<String, RawService>,
    #[serde(default)]
    service_mappings: Vec<RawMapping>,
    #[serde(default)]
    system: RawSystem,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLocation {
    path: PathBuf,
    metadata_path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawService {
    kind: String,
    #[serde(default)]
    frequency: Option<String>,
    #[serde(default)]
    properties: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMapping {
    locations: NameList,
    services: NameList,
}

/// A single name or a list of names.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NameList {
    One(String),
    Many(Vec<String>),
}

impl NameList {
    fn into_vec(self) -> Vec<String> {
        match self {
            NameList::One(name) => vec![name],
            NameList::Many(names) => names,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSystem {
    #[serde(default)]
    index: Option<IndexConfig>,
}

/// A configured storage location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationSettings {
    pub name: String,
    pub path: PathBuf,
    pub metadata_path: PathBuf,
}

/// Which services apply to which locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceMapping {
    pub locations: Vec<String>,
    pub services: Vec<String>,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct VigilConfig {
    /// Hex MD5 of the configuration text
    pub md5: String,
    pub locations: Vec<LocationSettings>,
    pub services: BTreeMap<String, ServiceDefinition>,
    pub mappings: Vec<ServiceMapping>,
    pub index: Option<IndexConfig>,
}

impl VigilConfig {
    /// Load and validate the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            VigilError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let base_dir = std::path::absolute(&base_dir)?;

        let config = Self::parse(&text, &base_dir)?;
        debug!(path = %path.display(), md5 = %config.md5, "Loaded configuration");
        Ok(config)
    }

    /// Parse configuration text, resolving relative paths against `base_dir`.
    pub fn parse(text: &str, base_dir: &Path) -> Result<Self> {
        let raw: RawConfig = serde_yaml::from_str(text)
            .map_err(|e| VigilError::configuration(format!("invalid configuration: {}", e)))?;

        let locations = raw
            .locations
            .into_iter()
            .map(|(name, loc)| LocationSettings {
                name,
                path: resolve(base_dir, loc.path),
                metadata_path: resolve(base_dir, loc.metadata_path),
            })
            .collect::<Vec<_>>();

        let mut services = BTreeMap::new();
        for (name, raw) in raw.services {
            let mut definition = ServiceDefinition::new(name.clone(), raw.kind);
            if let Some(frequency) = raw.frequency {
                let frequency = Frequency::parse(&frequency).map_err(|e| {
                    VigilError::configuration(format!("service '{}': {}", name, e))
                })?;
                definition = definition.with_frequency(frequency);
            }
            definition.properties = raw.properties;
            services.insert(name, definition);
        }

        let mappings = raw
            .service_mappings
            .into_iter()
            .map(|m| ServiceMapping {
                locations: m.locations.into_vec(),
                services: m.services.into_vec(),
            })
            .collect();

        let index = raw.system.index.map(|index| resolve_index(base_dir, index));

        let config = Self {
            md5: fingerprint(text),
            locations,
            services,
            mappings,
            index,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn location(&self, name: &str) -> Option<&LocationSettings> {
        self.locations.iter().find(|loc| loc.name == name)
    }

    fn validate(&self) -> Result<()> {
        if self.locations.is_empty() {
            return Err(VigilError::configuration("no storage locations defined"));
        }

        for loc in &self.locations {
            if !loc.path.is_absolute() || !loc.metadata_path.is_absolute() {
                return Err(VigilError::configuration(format!(
                    "location '{}' paths must be absolute",
                    loc.name
                )));
            }
        }

        for (i, a) in self.locations.iter().enumerate() {
            for b in &self.locations[i + 1..] {
                if overlaps(&a.path, &b.path) {
                    return Err(VigilError::configuration(format!(
                        "location '{}' ({}) overlaps location '{}' ({})",
                        a.name,
                        a.path.display(),
                        b.name,
                        b.path.display()
                    )));
                }
            }
        }

        for loc in &self.locations {
            for other in &self.locations {
                if overlaps(&loc.metadata_path, &other.path) {
                    return Err(VigilError::configuration(format!(
                        "metadata path of location '{}' overlaps location '{}'",
                        loc.name, other.name
                    )));
                }
            }
        }

        for mapping in &self.mappings {
            for name in &mapping.locations {
                if self.location(name).is_none() {
                    return Err(VigilError::configuration(format!(
                        "service mapping references unknown location '{}'",
                        name
                    )));
                }
            }
            for name in &mapping.services {
                if !self.services.contains_key(name) {
                    return Err(VigilError::configuration(format!(
                        "service mapping references unknown service '{}'",
                        name
                    )));
                }
            }
        }

        if let Some(index) = &self.index {
            index
                .validate()
                .map_err(|e| VigilError::configuration(e.to_string()))?;
        }

        Ok(())
    }
}

/// Hex MD5 of the raw configuration text.
pub fn fingerprint(text: &str) -> String {
    format!("{:x}", md5::compute(text.as_bytes()))
}

fn resolve(base_dir: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

fn overlaps(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

/// Relative sqlite paths are relative to the configuration file.
fn resolve_index(base_dir: &Path, mut index: IndexConfig) -> IndexConfig {
    match &mut index.connection {
        Connection::Url(url) if !url.contains(':') => {
            *url = resolve(base_dir, PathBuf::from(&*url))
                .to_string_lossy()
                .into_owned();
        }
        Connection::Url(url) if index.adapter == Adapter::Sqlite => {
            if let Some(resolved) = resolve_sqlite_url(base_dir, url) {
                *url = resolved;
            }
        }
        Connection::Params(params) => {
            if let Some(path) = params.path.as_mut() {
                *path = resolve(base_dir, PathBuf::from(&*path))
                    .to_string_lossy()
                    .into_owned();
            }
        }
        Connection::Url(_) => {}
    }
    index
}

/// `sqlite:` / `sqlite://` URL with its relative database path resolved, or
/// `None` when there is nothing to resolve.
fn resolve_sqlite_url(base_dir: &Path, url: &str) -> Option<String> {
    let rest = url.strip_prefix("sqlite:")?;
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (db, query) = match rest.split_once('?') {
        Some((db, query)) => (db, Some(query)),
        None => (rest, None),
    };
    if db.is_empty() || db.starts_with(':') || Path::new(db).is_absolute() {
        return None;
    }
    let mut resolved = format!("sqlite://{}", resolve(base_dir, PathBuf::from(db)).display());
    if let Some(query) = query {
        resolved.push('?');
        resolved.push_str(query);
    }
    Some(resolved)
}
