//! Built-in fixity check.
//!
//! Recomputes digests of a file's content and compares them with the
//! checksums recorded at registration.
//!
//! ```yaml
//! services:
//!   fixity:
//!     kind: fixity-check
//!     frequency: 6 months
//!     properties:
//!       algorithms: [sha256, md5]   # default: every recorded algorithm
//!       absent_digest: fail         # or: ignore
//! ```

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256, Sha384, Sha512};
use tracing::debug;
use vigil_model::{EventKind, ServiceDefinition};

use super::{PreservationService, ServiceError};
use crate::error::{Result, VigilError};
use crate::record::FileRecord;

pub const KIND: &str = "fixity-check";

const BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Md5,
    Sha256,
    Sha384,
    Sha512,
    Blake3,
}

impl Algorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Md5 => "md5",
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha384 => "sha384",
            Algorithm::Sha512 => "sha512",
            Algorithm::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "md5" => Ok(Algorithm::Md5),
            "sha256" => Ok(Algorithm::Sha256),
            "sha384" => Ok(Algorithm::Sha384),
            "sha512" => Ok(Algorithm::Sha512),
            "blake3" => Ok(Algorithm::Blake3),
            other => Err(format!("unsupported digest algorithm '{}'", other)),
        }
    }
}

/// What to do when the record has no digest for a configured algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsentDigest {
    Fail,
    Ignore,
}

/// Running digest for one algorithm.
enum Hasher {
    Md5(md5::Context),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    fn new(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Md5 => Hasher::Md5(md5::Context::new()),
            Algorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            Algorithm::Sha384 => Hasher::Sha384(Sha384::new()),
            Algorithm::Sha512 => Hasher::Sha512(Sha512::new()),
            Algorithm::Blake3 => Hasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Md5(ctx) => ctx.consume(data),
            Hasher::Sha256(h) => h.update(data),
            Hasher::Sha384(h) => h.update(data),
            Hasher::Sha512(h) => h.update(data),
            Hasher::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn finish(self) -> String {
        match self {
            Hasher::Md5(ctx) => format!("{:x}", ctx.compute()),
            Hasher::Sha256(h) => format!("{:x}", h.finalize()),
            Hasher::Sha384(h) => format!("{:x}", h.finalize()),
            Hasher::Sha512(h) => format!("{:x}", h.finalize()),
            Hasher::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

/// Digest `path` with every algorithm in one pass.
pub fn compute_digests(path: &Path, algorithms: &[Algorithm]) -> io::Result<Vec<(Algorithm, String)>> {
    let mut file = File::open(path)?;
    let mut hashers: Vec<(Algorithm, Hasher)> =
        algorithms.iter().map(|&a| (a, Hasher::new(a))).collect();

    let mut buffer = vec![0u8; BUFFER_SIZE];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        for (_, hasher) in hashers.iter_mut() {
            hasher.update(&buffer[..n]);
        }
    }

    Ok(hashers
        .into_iter()
        .map(|(algorithm, hasher)| (algorithm, hasher.finish()))
        .collect())
}

#[derive(Debug, Clone)]
pub struct FixityCheckService {
    /// Empty means every recorded algorithm
    algorithms: Vec<Algorithm>,
    absent_digest: AbsentDigest,
}

impl FixityCheckService {
    pub fn new(algorithms: Vec<Algorithm>, absent_digest: AbsentDigest) -> Self {
        Self {
            algorithms,
            absent_digest,
        }
    }

    pub fn from_definition(definition: &ServiceDefinition) -> Result<Self> {
        let invalid = |msg: String| VigilError::configuration(format!("service '{}': {}", definition.name, msg));

        let algorithms = match definition.property("algorithms") {
            None => Vec::new(),
            Some(Value::String(name)) => vec![name.parse::<Algorithm>().map_err(invalid)?],
            Some(Value::Array(names)) => names
                .iter()
                .map(|v| {
                    v.as_str()
                        .ok_or_else(|| invalid("algorithms must be strings".to_string()))?
                        .parse::<Algorithm>()
                        .map_err(invalid)
                })
                .collect::<Result<Vec<_>>>()?,
            Some(_) => return Err(invalid("algorithms must be a list".to_string())),
        };

        let absent_digest = match definition.property("absent_digest").and_then(Value::as_str) {
            None | Some("fail") => AbsentDigest::Fail,
            Some("ignore") => AbsentDigest::Ignore,
            Some(other) => {
                return Err(invalid(format!(
                    "absent_digest must be 'fail' or 'ignore', got '{}'",
                    other
                )))
            }
        };

        Ok(Self::new(algorithms, absent_digest))
    }

    /// Pairs of (algorithm, expected digest) to verify.
    fn expectations(&self, file: &FileRecord) -> std::result::Result<Vec<(Algorithm, String)>, ServiceError> {
        let record = file
            .metadata()
            .ok_or_else(|| anyhow::anyhow!("metadata for {} not loaded", file.path().display()))?;

        if self.algorithms.is_empty() {
            let mut expected = Vec::new();
            for (name, digest) in &record.checksums {
                let algorithm: Algorithm = name.parse().map_err(ServiceError::Preservation)?;
                expected.push((algorithm, digest.to_ascii_lowercase()));
            }
            if expected.is_empty() && self.absent_digest == AbsentDigest::Fail {
                return Err(ServiceError::preservation("no checksums recorded"));
            }
            return Ok(expected);
        }

        let mut expected = Vec::new();
        for &algorithm in &self.algorithms {
            match record.checksums.get(algorithm.name()) {
                Some(digest) => expected.push((algorithm, digest.to_ascii_lowercase())),
                None if self.absent_digest == AbsentDigest::Ignore => {}
                None => {
                    return Err(ServiceError::preservation(format!(
                        "no {} digest recorded",
                        algorithm
                    )))
                }
            }
        }
        Ok(expected)
    }
}

#[async_trait]
impl PreservationService for FixityCheckService {
    fn is_applicable(&self, event: EventKind) -> bool {
        matches!(event, EventKind::Preserve | EventKind::Verify)
    }

    async fn perform(&self, file: &FileRecord, _event: EventKind) -> std::result::Result<(), ServiceError> {
        let expected = self.expectations(file)?;
        if expected.is_empty() {
            return Ok(());
        }

        let physical: PathBuf = file.physical_path().map_err(anyhow::Error::new)?;
        if physical.is_dir() {
            return Err(ServiceError::preservation(format!(
                "{} is a composite object; fixity-check only supports single files",
                physical.display()
            )));
        }
        if !physical.exists() {
            return Err(ServiceError::preservation(format!(
                "{} does not exist",
                physical.display()
            )));
        }

        let algorithms: Vec<Algorithm> = expected.iter().map(|(a, _)| *a).collect();
        let target = physical.clone();
        let actual = tokio::task::spawn_blocking(move || compute_digests(&target, &algorithms))
            .await
            .context("digest task failed")?
            .with_context(|| format!("reading {}", physical.display()))?;

        let mismatched: Vec<String> = expected
            .iter()
            .zip(actual.iter())
            .filter(|((_, want), (_, got))| want != got)
            .map(|((algorithm, want), (_, got))| format!("{} expected {} but was {}", algorithm, want, got))
            .collect();

        if !mismatched.is_empty() {
            return Err(ServiceError::preservation(format!(
                "fixity mismatch: {}",
                mismatched.join("; ")
            )));
        }

        debug!(path = %physical.display(), algorithms = expected.len(), "Fixity verified");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_known_digests() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("abc.txt");
        fs::write(&path, b"abc").unwrap();

        let digests = compute_digests(&path, &[Algorithm::Md5, Algorithm::Sha256]).unwrap();
        assert_eq!(digests[0].1, "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(
            digests[1].1,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!("SHA-256".parse::<Algorithm>(), Ok(Algorithm::Sha256));
        assert_eq!("blake3".parse::<Algorithm>(), Ok(Algorithm::Blake3));
        assert!("crc32".parse::<Algorithm>().is_err());
    }

    #[test]
    fn test_from_definition() {
        let definition = ServiceDefinition::new("fixity", KIND)
            .with_property("algorithms", json!(["sha256", "md5"]))
            .with_property("absent_digest", json!("ignore"));
        let service = FixityCheckService::from_definition(&definition).unwrap();
        assert_eq!(service.algorithms, vec![Algorithm::Sha256, Algorithm::Md5]);
        assert_eq!(service.absent_digest, AbsentDigest::Ignore);

        let bad = ServiceDefinition::new("fixity", KIND).with_property("absent_digest", json!("maybe"));
        assert!(matches!(
            FixityCheckService::from_definition(&bad),
            Err(VigilError::Configuration(_))
        ));

        let unknown = ServiceDefinition::new("fixity", KIND).with_property("algorithms", json!(["crc32"]));
        assert!(FixityCheckService::from_definition(&unknown).is_err());
    }

    #[test]
    fn test_applies_to_preserve_and_verify() {
        let service = FixityCheckService::new(Vec::new(), AbsentDigest::Fail);
        assert!(service.is_applicable(EventKind::Preserve));
        assert!(service.is_applicable(EventKind::Verify));
        assert!(!service.is_applicable(EventKind::Register));
        assert!(!service.is_applicable(EventKind::Deregister));
    }
}
