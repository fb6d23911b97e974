//! Shared fixtures: a temporary location, its configuration, and test services.
#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use vigil::metadata_io::MetadataSerializer;
use vigil::{
    AppContext, CapturingSink, FileRecord, PreservationService, ServiceError, ServiceRegistry,
    VigilConfig,
};
use vigil_model::{EventKind, MetadataRecord};

/// md5("abc")
pub const ABC_MD5: &str = "900150983cd24fb0d6963f7d28e17f72";

pub struct TestEnv {
    pub temp: TempDir,
    pub data: PathBuf,
    pub md: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let data = temp.path().join("data/loc1");
        let md = temp.path().join("md/loc1");
        fs::create_dir_all(&data).unwrap();
        fs::create_dir_all(&md).unwrap();
        Self { temp, data, md }
    }

    /// Configuration with `services` (raw YAML under `services:`) mapped to
    /// loc1 in the order given by `mapped`.
    pub fn config_yaml(&self, services: &str, mapped: &[&str], with_index: bool) -> String {
        let mut yaml = format!(
            "locations:\n  loc1:\n    path: {}\n    metadata_path: {}\n",
            self.data.display(),
            self.md.display()
        );
        if !services.is_empty() {
            yaml.push_str("services:\n");
            yaml.push_str(services);
            yaml.push_str(&format!(
                "service_mappings:\n  - locations: loc1\n    services: [{}]\n",
                mapped.join(", ")
            ));
        }
        if with_index {
            yaml.push_str(&format!(
                "system:\n  index:\n    adapter: sqlite\n    connection: {}\n    page_size: 2\n",
                self.temp.path().join("index.sqlite3").display()
            ));
        }
        yaml
    }

    /// Daily md5 fixity check on loc1.
    pub fn fixity_yaml(&self, with_index: bool) -> String {
        self.config_yaml(
            "  fixity:\n    kind: fixity-check\n    frequency: 1 day\n    properties:\n      algorithms: [md5]\n",
            &["fixity"],
            with_index,
        )
    }

    pub fn context(&self, yaml: &str, registry: &ServiceRegistry) -> (AppContext, Arc<CapturingSink>) {
        let config = VigilConfig::parse(yaml, self.temp.path()).unwrap();
        let sink = Arc::new(CapturingSink::new());
        let ctx = AppContext::new(config, registry, sink.clone()).unwrap();
        (ctx, sink)
    }

    pub fn fixity_context(&self, with_index: bool) -> (AppContext, Arc<CapturingSink>) {
        self.context(&self.fixity_yaml(with_index), &ServiceRegistry::with_builtins())
    }

    pub fn write(&self, relative: &str, contents: &[u8]) -> PathBuf {
        let path = self.data.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    pub fn metadata_file(&self, relative: &str) -> PathBuf {
        self.md.join(format!("{}.vmd.yml", relative))
    }

    pub fn metadata(&self, relative: &str) -> MetadataRecord {
        MetadataSerializer.load(&self.metadata_file(relative)).unwrap()
    }

    pub fn save_metadata(&self, relative: &str, record: &MetadataRecord) {
        MetadataSerializer
            .persist(record, &self.metadata_file(relative))
            .unwrap();
    }

    pub fn path_arg(&self, relative: &str) -> String {
        self.data.join(relative).display().to_string()
    }
}

/// Counts runs; applies to verify only.
#[derive(Default)]
pub struct CountingService {
    pub runs: AtomicUsize,
}

impl CountingService {
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PreservationService for CountingService {
    fn is_applicable(&self, event: EventKind) -> bool {
        event == EventKind::Verify
    }

    async fn perform(&self, _file: &FileRecord, _event: EventKind) -> Result<(), ServiceError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fails recoverably for files whose name contains "bad".
pub struct FlakyService;

#[async_trait]
impl PreservationService for FlakyService {
    fn is_applicable(&self, event: EventKind) -> bool {
        event.runs_services()
    }

    async fn perform(&self, file: &FileRecord, _event: EventKind) -> Result<(), ServiceError> {
        let name = file.path().file_name().unwrap_or_default().to_string_lossy();
        if name.contains("bad") {
            return Err(ServiceError::preservation("replica unreachable"));
        }
        Ok(())
    }
}

/// Fails unrecoverably for every file.
pub struct ExplodingService;

#[async_trait]
impl PreservationService for ExplodingService {
    fn is_applicable(&self, event: EventKind) -> bool {
        event.runs_services()
    }

    async fn perform(&self, _file: &FileRecord, _event: EventKind) -> Result<(), ServiceError> {
        Err(ServiceError::Unrecoverable(anyhow::anyhow!("storage backend crashed")))
    }
}

/// Replaces the location's metadata root with a plain file, then fails
/// unrecoverably, so the record cannot be saved afterwards.
pub struct WreckingService;

#[async_trait]
impl PreservationService for WreckingService {
    fn is_applicable(&self, event: EventKind) -> bool {
        event == EventKind::Verify
    }

    async fn perform(&self, file: &FileRecord, _event: EventKind) -> Result<(), ServiceError> {
        let root = file.location().metadata_path();
        fs::remove_dir_all(root).map_err(|e| ServiceError::Unrecoverable(e.into()))?;
        fs::write(root, b"").map_err(|e| ServiceError::Unrecoverable(e.into()))?;
        Err(ServiceError::Unrecoverable(anyhow::anyhow!("storage backend crashed")))
    }
}

/// Registry with the built-ins plus `counting`, `flaky`, `exploding` and
/// `wrecking` kinds.
/// The counting service instance is shared so tests can observe it.
pub fn test_registry(counter: Arc<CountingService>) -> ServiceRegistry {
    let mut registry = ServiceRegistry::with_builtins();
    registry.register("counting", move |_| Ok(counter.clone() as Arc<dyn PreservationService>));
    registry.register("flaky", |_| Ok(Arc::new(FlakyService)));
    registry.register("exploding", |_| Ok(Arc::new(ExplodingService)));
    registry.register("wrecking", |_| Ok(Arc::new(WreckingService)));
    registry
}

pub fn sorted(mut paths: Vec<PathBuf>) -> Vec<PathBuf> {
    paths.sort();
    paths
}
