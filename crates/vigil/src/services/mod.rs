//! Preservation services.
//!
//! A service definition from configuration names a `kind`; the
//! [`ServiceRegistry`] turns each definition into a [`PreservationService`]
//! implementation, and the [`ServiceManager`] answers which services apply
//! to a location for a given event.

pub mod fixity;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use vigil_model::{EventKind, ServiceDefinition};

use crate::config::VigilConfig;
use crate::error::{Result, VigilError};
use crate::record::FileRecord;

/// Outcome of a failed service run.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Expected failure: recorded for the service, remaining services still run
    #[error("{0}")]
    Preservation(String),

    /// Anything else: remaining services for the file are abandoned
    #[error(transparent)]
    Unrecoverable(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn preservation(msg: impl Into<String>) -> Self {
        Self::Preservation(msg.into())
    }
}

#[async_trait]
pub trait PreservationService: Send + Sync {
    fn is_applicable(&self, event: EventKind) -> bool;

    /// Run against `file`, whose metadata is loaded.
    async fn perform(&self, file: &FileRecord, event: EventKind) -> std::result::Result<(), ServiceError>;
}

/// Builds a service implementation from its definition.
pub type ServiceFactory =
    Arc<dyn Fn(&ServiceDefinition) -> Result<Arc<dyn PreservationService>> + Send + Sync>;

/// Service implementations by kind.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    factories: HashMap<String, ServiceFactory>,
}

impl ServiceRegistry {
    /// Registry holding the built-in kinds.
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        registry.register(fixity::KIND, |definition| {
            Ok(Arc::new(fixity::FixityCheckService::from_definition(definition)?))
        });
        registry
    }

    pub fn register<F>(&mut self, kind: &str, factory: F) -> &mut Self
    where
        F: Fn(&ServiceDefinition) -> Result<Arc<dyn PreservationService>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.to_string(), Arc::new(factory));
        self
    }

    fn build(&self, definition: &ServiceDefinition) -> Result<Arc<dyn PreservationService>> {
        let factory = self.factories.get(&definition.kind).ok_or_else(|| {
            VigilError::configuration(format!(
                "service '{}' has unknown kind '{}'",
                definition.name, definition.kind
            ))
        })?;
        factory(definition)
    }
}

struct ConfiguredService {
    definition: ServiceDefinition,
    implementation: Arc<dyn PreservationService>,
}

/// Configured services and their location mappings.
pub struct ServiceManager {
    services: BTreeMap<String, ConfiguredService>,
    /// Location name -> service names, in mapping order
    by_location: HashMap<String, Vec<String>>,
}

impl ServiceManager {
    pub fn new(config: &VigilConfig, registry: &ServiceRegistry) -> Result<Self> {
        let mut services = BTreeMap::new();
        for (name, definition) in &config.services {
            let implementation = registry.build(definition)?;
            services.insert(
                name.clone(),
                ConfiguredService {
                    definition: definition.clone(),
                    implementation,
                },
            );
        }

        let mut by_location: HashMap<String, Vec<String>> = HashMap::new();
        for mapping in &config.mappings {
            for location in &mapping.locations {
                let names = by_location.entry(location.clone()).or_default();
                for service in &mapping.services {
                    if !names.contains(service) {
                        names.push(service.clone());
                    }
                }
            }
        }

        Ok(Self { services, by_location })
    }

    /// Every service mapped to `location`.
    pub fn definitions_for_location(&self, location: &str) -> Vec<&ServiceDefinition> {
        self.mapped(location).map(|s| &s.definition).collect()
    }

    /// Mapped services whose implementation applies to `event`.
    pub fn applicable_definitions(&self, location: &str, event: EventKind) -> Vec<&ServiceDefinition> {
        self.mapped(location)
            .filter(|s| s.implementation.is_applicable(event))
            .map(|s| &s.definition)
            .collect()
    }

    pub fn implementation(&self, name: &str) -> Option<Arc<dyn PreservationService>> {
        self.services.get(name).map(|s| s.implementation.clone())
    }

    fn mapped<'a>(&'a self, location: &str) -> impl Iterator<Item = &'a ConfiguredService> + 'a {
        self.by_location
            .get(location)
            .into_iter()
            .flatten()
            .filter_map(|name| self.services.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    struct VerifyOnly;

    #[async_trait]
    impl PreservationService for VerifyOnly {
        fn is_applicable(&self, event: EventKind) -> bool {
            event == EventKind::Verify
        }

        async fn perform(&self, _file: &FileRecord, _event: EventKind) -> std::result::Result<(), ServiceError> {
            Ok(())
        }
    }

    const CONFIG: &str = r#"
locations:
  loc1:
    path: /data/loc1
    metadata_path: /md/loc1
  loc2:
    path: /data/loc2
    metadata_path: /md/loc2
services:
  fixity:
    kind: fixity-check
  audit:
    kind: verify-only
service_mappings:
  - locations: [loc1, loc2]
    services: fixity
  - locations: loc1
    services: [audit, fixity]
"#;

    fn registry() -> ServiceRegistry {
        let mut registry = ServiceRegistry::with_builtins();
        registry.register("verify-only", |_| Ok(Arc::new(VerifyOnly)));
        registry
    }

    #[test]
    fn test_mappings_resolve_per_location_and_event() {
        let config = VigilConfig::parse(CONFIG, Path::new("/")).unwrap();
        let manager = ServiceManager::new(&config, &registry()).unwrap();

        let names = |defs: Vec<&ServiceDefinition>| defs.iter().map(|d| d.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(manager.definitions_for_location("loc1")), vec!["fixity", "audit"]);
        assert_eq!(names(manager.definitions_for_location("loc2")), vec!["fixity"]);
        assert_eq!(names(manager.applicable_definitions("loc1", EventKind::Preserve)), vec!["fixity"]);
        assert_eq!(
            names(manager.applicable_definitions("loc1", EventKind::Verify)),
            vec!["fixity", "audit"]
        );
        assert!(manager.applicable_definitions("loc1", EventKind::Register).is_empty());
        assert!(manager.definitions_for_location("unmapped").is_empty());
    }

    #[test]
    fn test_unknown_kind_is_configuration_error() {
        let config = VigilConfig::parse(CONFIG, Path::new("/")).unwrap();
        assert!(matches!(
            ServiceManager::new(&config, &ServiceRegistry::with_builtins()),
            Err(VigilError::Configuration(_))
        ));
    }
}
