//! Everything an operation needs, built once per process.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};
use vigil_db::{open_index_driver, DbError, IndexDriver};

use crate::config::VigilConfig;
use crate::error::{Result, VigilError};
use crate::metadata_io::MetadataSerializer;
use crate::record::FileRecord;
use crate::services::{ServiceManager, ServiceRegistry};
use crate::status::OutcomeSink;
use crate::storage::{LocationManager, StorageLocation};

pub struct AppContext {
    locations: LocationManager,
    services: ServiceManager,
    index: Option<Arc<dyn IndexDriver>>,
    serializer: MetadataSerializer,
    sink: Arc<dyn OutcomeSink>,
}

impl AppContext {
    /// Build the context for `config`. The index connection, if any, is
    /// opened lazily on first use.
    pub fn new(config: VigilConfig, registry: &ServiceRegistry, sink: Arc<dyn OutcomeSink>) -> Result<Self> {
        let locations = LocationManager::from_settings(&config.locations);
        let services = ServiceManager::new(&config, registry)?;

        let index = match &config.index {
            Some(index_config) => {
                let driver = open_index_driver(index_config, &config.md5).map_err(|e| match e {
                    DbError::InvalidConfig(_) | DbError::NotCompiled(_, _) => {
                        VigilError::configuration(e.to_string())
                    }
                    other => VigilError::Index(other),
                })?;
                debug!(adapter = %driver.adapter(), "Index configured");
                Some(driver)
            }
            None => None,
        };

        Ok(Self {
            locations,
            services,
            index,
            serializer: MetadataSerializer,
            sink,
        })
    }

    /// Load the configuration file and build a context with the built-in services.
    pub fn load(config_path: &Path, sink: Arc<dyn OutcomeSink>) -> Result<Self> {
        let config = VigilConfig::load(config_path)?;
        info!(
            path = %config_path.display(),
            locations = config.locations.len(),
            services = config.services.len(),
            "Configuration loaded"
        );
        Self::new(config, &ServiceRegistry::with_builtins(), sink)
    }

    pub fn locations(&self) -> &LocationManager {
        &self.locations
    }

    pub fn services(&self) -> &ServiceManager {
        &self.services
    }

    pub fn serializer(&self) -> &MetadataSerializer {
        &self.serializer
    }

    pub fn sink(&self) -> Arc<dyn OutcomeSink> {
        self.sink.clone()
    }

    pub fn index(&self) -> Option<&Arc<dyn IndexDriver>> {
        self.index.as_ref()
    }

    pub fn require_index(&self) -> Result<&Arc<dyn IndexDriver>> {
        self.index
            .as_ref()
            .ok_or_else(|| VigilError::configuration("no index configured (system.index)"))
    }

    /// Fail unless every location is reachable.
    pub fn check_available(&self, locations: &[Arc<dyn StorageLocation>]) -> Result<()> {
        for location in locations {
            location.is_available()?;
        }
        Ok(())
    }

    /// Upsert the file's index entry from its in-memory metadata.
    pub async fn index_file(&self, file: &FileRecord) -> Result<()> {
        let Some(driver) = &self.index else {
            return Ok(());
        };
        let record = file
            .metadata()
            .ok_or_else(|| VigilError::metadata(file.path(), "no metadata to index"))?;
        let definitions = self.services.definitions_for_location(file.location().name());
        driver.index(file.index_key()?, record, &definitions).await?;
        Ok(())
    }
}
