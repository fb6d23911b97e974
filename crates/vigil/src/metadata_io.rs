//! Durable metadata documents.

use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::debug;
use vigil_model::MetadataRecord;

use crate::error::{Result, VigilError};

/// Reads and writes metadata records as YAML documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataSerializer;

impl MetadataSerializer {
    pub fn load(&self, path: &Path) -> Result<MetadataRecord> {
        let text = fs::read_to_string(path).map_err(|e| {
            VigilError::metadata(path, format!("cannot read metadata: {}", e))
        })?;
        serde_yaml::from_str(&text)
            .map_err(|e| VigilError::metadata(path, format!("malformed metadata: {}", e)))
    }

    /// Write `record` to `path`, replacing any existing document atomically.
    pub fn persist(&self, record: &MetadataRecord, path: &Path) -> Result<()> {
        let text = serde_yaml::to_string(record)
            .map_err(|e| VigilError::metadata(path, format!("cannot serialize metadata: {}", e)))?;

        let parent = path
            .parent()
            .ok_or_else(|| VigilError::metadata(path, "metadata path has no parent directory"))?;
        fs::create_dir_all(parent)?;

        let file_name = path
            .file_name()
            .ok_or_else(|| VigilError::metadata(path, "metadata path has no file name"))?;
        let mut tmp_name = std::ffi::OsString::from(".");
        tmp_name.push(file_name);
        tmp_name.push(format!(".tmp-{}", std::process::id()));
        let tmp_path = parent.join(tmp_name);

        let written = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(text.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp_path, path)
        })();
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        debug!(path = %path.display(), "Persisted metadata");
        Ok(())
    }

    pub fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_persist_then_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("md").join("a").join("file.txt.vmd.yml");

        let mut record = MetadataRecord::new();
        record.registered_at = Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        record.checksums.insert("sha256".into(), "abc123".into());
        record.file_size = Some(42);
        record.set_property("collection", json!("maps")).unwrap();
        record.add_service("fixity").stale_replicas = true;

        let serializer = MetadataSerializer;
        serializer.persist(&record, &path).unwrap();
        assert!(serializer.exists(&path));

        let loaded = serializer.load(&path).unwrap();
        assert_eq!(loaded, record);

        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_document_uses_durable_field_names() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f.vmd.yml");

        let mut record = MetadataRecord::new();
        record.registered_at = Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        record.update_service_as_performed_at("fixity", Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap());
        MetadataSerializer.persist(&record, &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("registered:"));
        assert!(text.contains("services:"));
        assert!(text.contains("run_needed: false"));
        assert!(text.contains("timestamp:"));
    }

    #[test]
    fn test_missing_and_malformed_are_metadata_errors() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing.vmd.yml");
        assert!(matches!(
            MetadataSerializer.load(&missing),
            Err(VigilError::Metadata { .. })
        ));

        let bad = temp.path().join("bad.vmd.yml");
        fs::write(&bad, "registered: [not, a, time]\n").unwrap();
        assert!(matches!(
            MetadataSerializer.load(&bad),
            Err(VigilError::Metadata { .. })
        ));
    }
}
