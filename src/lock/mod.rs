//! Lock descriptor: the pinned dependency set the resolver stage installs
//!
//! A descriptor is the pair `pyproject.toml` + `poetry.lock` found at the
//! project root. Loading it parses both files; [`resolve::check`] then proves
//! the lock is internally consistent before any stage is planned.

pub mod manifest;
pub mod poetry;
pub mod resolve;
pub mod version;

use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::error::BuildError;

pub use manifest::ProjectManifest;
pub use poetry::{Branch, LockFile, LockedPackage, Requirement};
pub use resolve::{check, LockReport};
pub use version::{Constraint, Version};

pub const MANIFEST_FILE: &str = "pyproject.toml";
pub const LOCK_FILE: &str = "poetry.lock";

#[derive(Debug, Error)]
pub enum LockError {
    #[error("{file} is malformed: {reason}")]
    Malformed { file: String, reason: String },

    #[error("Invalid version '{0}'")]
    InvalidVersion(String),

    #[error("Invalid version constraint '{0}'")]
    InvalidConstraint(String),

    #[error("Package {package} is not pinned to an exact version (found '{version}')")]
    Unpinned { package: String, version: String },

    #[error("Package {package} is locked more than once ({})", .versions.join(", "))]
    DuplicatePackage {
        package: String,
        versions: Vec<String>,
    },

    #[error("{package} requires {dependency} {constraint}, which is not in the lock")]
    MissingDependency {
        package: String,
        dependency: String,
        constraint: String,
    },

    #[error("{package} requires {dependency} {constraint}, but the lock pins {locked}")]
    Conflict {
        package: String,
        dependency: String,
        constraint: String,
        locked: String,
    },

    #[error("pyproject.toml lists {dependency} {constraint}, which is not in the lock")]
    MissingDirect {
        dependency: String,
        constraint: String,
    },

    #[error("pyproject.toml requires {dependency} {constraint}, but the lock pins {locked}")]
    DirectConflict {
        dependency: String,
        constraint: String,
        locked: String,
    },

    #[error("{}", summarize(.0))]
    Multiple(Vec<LockError>),
}

fn summarize(errors: &[LockError]) -> String {
    let mut out = format!("{} lock problems", errors.len());
    for err in errors {
        out.push_str("\n  - ");
        out.push_str(&err.to_string());
    }
    out
}

/// Normalize a distribution name the way package indexes compare them
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            pending_sep = true;
            continue;
        }
        if pending_sep && !out.is_empty() {
            out.push('-');
        }
        pending_sep = false;
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// Manifest and lock, parsed and fingerprinted
#[derive(Debug, Clone)]
pub struct LockDescriptor {
    pub root: PathBuf,
    pub manifest: ProjectManifest,
    pub lock: LockFile,
    /// SHA-256 over both files, hex encoded
    pub digest: String,
}

impl LockDescriptor {
    /// Load the descriptor from a project root.
    ///
    /// Missing files are transfer failures; unparsable files are resolution
    /// failures.
    pub fn load(root: &Path) -> Result<Self, BuildError> {
        let manifest_path = root.join(MANIFEST_FILE);
        let lock_path = root.join(LOCK_FILE);

        let manifest_src = read_input(&manifest_path)?;
        let lock_src = read_input(&lock_path)?;

        let manifest = ProjectManifest::parse(&manifest_src)?;
        let lock = LockFile::parse(&lock_src)?;
        let digest = fingerprint(&manifest_src, &lock_src);

        debug!(
            packages = lock.packages.len(),
            digest = %digest,
            "Loaded lock descriptor from {}",
            root.display()
        );

        Ok(Self {
            root: root.to_path_buf(),
            manifest,
            lock,
            digest,
        })
    }

    pub fn short_digest(&self) -> &str {
        &self.digest[..12.min(self.digest.len())]
    }
}

fn read_input(path: &Path) -> Result<String, BuildError> {
    if !path.is_file() {
        return Err(BuildError::transfer(path, "file not found"));
    }
    fs::read_to_string(path).map_err(|e| BuildError::transfer(path, e.to_string()))
}

fn fingerprint(manifest: &str, lock: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(MANIFEST_FILE.as_bytes());
    hasher.update([0u8]);
    hasher.update(manifest.as_bytes());
    hasher.update([0u8]);
    hasher.update(LOCK_FILE.as_bytes());
    hasher.update([0u8]);
    hasher.update(lock.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
pub(crate) mod fixtures {
    pub const MANIFEST: &str = r#"[tool.poetry]
name = "hackathon-api"
version = "0.1.0"
description = "Backend service"

[tool.poetry.dependencies]
python = "^3.11"
fastapi = "^0.110.0"
uvicorn = {version = "^0.29.0", extras = ["standard"]}

[tool.poetry.group.dev.dependencies]
pytest = "^8.0"
"#;

    pub const LOCK: &str = r#"[[package]]
name = "fastapi"
version = "0.110.0"
description = "FastAPI framework"
optional = false
python-versions = ">=3.8"

[package.dependencies]
pydantic = ">=1.7.4,!=1.8,!=1.8.1,!=2.0.0,!=2.0.1,!=2.1.0,<3.0.0"
starlette = ">=0.36.3,<0.37.0"
typing-extensions = ">=4.8.0"

[[package]]
name = "pydantic"
version = "2.6.4"
optional = false
python-versions = ">=3.8"

[package.dependencies]
typing-extensions = ">=4.6.1"

[[package]]
name = "starlette"
version = "0.36.3"
optional = false
python-versions = ">=3.8"

[package.dependencies]
anyio = ">=3.4.0,<5"

[[package]]
name = "anyio"
version = "4.3.0"
optional = false
python-versions = ">=3.8"

[[package]]
name = "typing-extensions"
version = "4.10.0"
optional = false
python-versions = ">=3.8"

[[package]]
name = "uvicorn"
version = "0.29.0"
optional = false
python-versions = ">=3.8"

[package.dependencies]
click = ">=7.0"
colorama = {version = ">=0.4", optional = true, markers = "sys_platform == \"win32\""}

[[package]]
name = "click"
version = "8.1.7"
optional = false
python-versions = ">=3.7"

[metadata]
lock-version = "2.0"
python-versions = "^3.11"
content-hash = "5f1c"
"#;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Typing_Extensions"), "typing-extensions");
        assert_eq!(normalize_name("zope.interface"), "zope-interface");
        assert_eq!(normalize_name("a--b__c"), "a-b-c");
    }

    #[test]
    fn test_load_descriptor() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), fixtures::MANIFEST).unwrap();
        fs::write(dir.path().join(LOCK_FILE), fixtures::LOCK).unwrap();

        let descriptor = LockDescriptor::load(dir.path()).unwrap();
        assert_eq!(descriptor.lock.packages.len(), 7);
        assert_eq!(descriptor.digest.len(), 64);
        assert_eq!(descriptor.short_digest().len(), 12);
        assert_eq!(descriptor.manifest.name.as_deref(), Some("hackathon-api"));
    }

    #[test]
    fn test_digest_is_stable_and_sensitive() {
        let a = fingerprint(fixtures::MANIFEST, fixtures::LOCK);
        let b = fingerprint(fixtures::MANIFEST, fixtures::LOCK);
        let c = fingerprint(fixtures::MANIFEST, &fixtures::LOCK.replace("8.1.7", "8.1.6"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_missing_lock_is_transfer_failure() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), fixtures::MANIFEST).unwrap();

        let err = LockDescriptor::load(dir.path()).unwrap_err();
        assert!(matches!(err, BuildError::Transfer { .. }));
        assert!(err.to_string().contains(LOCK_FILE));
    }

    #[test]
    fn test_malformed_lock_is_resolution_failure() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), fixtures::MANIFEST).unwrap();
        fs::write(dir.path().join(LOCK_FILE), "[[package]\nname=").unwrap();

        let err = LockDescriptor::load(dir.path()).unwrap_err();
        assert!(matches!(err, BuildError::Resolution(_)));
    }

    #[test]
    fn test_multiple_errors_display() {
        let err = LockError::Multiple(vec![
            LockError::InvalidVersion("x".to_string()),
            LockError::InvalidConstraint("y".to_string()),
        ]);
        let text = err.to_string();
        assert!(text.starts_with("2 lock problems"));
        assert!(text.contains("Invalid version 'x'"));
    }
}
