//! Build-level error taxonomy
//!
//! Every failure in the pipeline is fatal and aborts the whole build. The
//! variants here are coarse on purpose: they tell the caller which part of the
//! pipeline refused to continue, and each one maps to its own process exit
//! code so orchestrating tools can tell them apart.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::identity::IdentityError;
use crate::lock::LockError;

#[derive(Debug, Error)]
pub enum BuildError {
    /// The lock descriptor is malformed or cannot be satisfied
    #[error("Dependency resolution failed: {0}")]
    Resolution(#[from] LockError),

    /// A required input is missing from the build context
    #[error("Missing build input {path}: {reason}")]
    Transfer { path: PathBuf, reason: String },

    /// The execution identity collides with a privileged identity or is malformed
    #[error("Execution identity rejected: {0}")]
    Identity(#[from] IdentityError),

    /// File ownership or runtime identity would end up privileged
    #[error("Permission invariant violated: {0}")]
    Permission(String),

    /// Any other plan invariant violation
    #[error("Plan validation failed: {0}")]
    Validation(String),

    /// The container engine refused or failed the build
    #[error("Container engine error: {0}")]
    Daemon(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BuildError {
    pub fn transfer(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Transfer {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Process exit code for this failure class
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::Resolution(_) => 2,
            BuildError::Transfer { .. } => 3,
            BuildError::Identity(_) | BuildError::Permission(_) => 4,
            BuildError::Validation(_) => 5,
            BuildError::Daemon(_) => 6,
            BuildError::Config(_) => 7,
        }
    }

    /// Find the build error behind an `anyhow` chain, if there is one
    pub fn find(err: &anyhow::Error) -> Option<&BuildError> {
        err.chain().find_map(|cause| cause.downcast_ref::<BuildError>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_exit_codes_are_distinct_per_class() {
        let errors = [
            BuildError::Resolution(LockError::Unpinned {
                package: "fastapi".to_string(),
                version: ">=0.100".to_string(),
            }),
            BuildError::transfer("src", "not found"),
            BuildError::Permission("root".to_string()),
            BuildError::Validation("bad".to_string()),
            BuildError::Daemon("down".to_string()),
        ];
        let codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        assert_eq!(codes, vec![2, 3, 4, 5, 6]);
        assert!(codes.iter().all(|c| *c != 0));
    }

    #[test]
    fn test_find_through_context() {
        let result: anyhow::Result<()> = Err(BuildError::transfer("poetry.lock", "missing"))
            .context("Phase LockPhase failed");
        let err = result.unwrap_err();
        let found = BuildError::find(&err).expect("build error in chain");
        assert_eq!(found.exit_code(), 3);
    }

    #[test]
    fn test_find_returns_none_for_foreign_errors() {
        let err = anyhow::anyhow!("something else");
        assert!(BuildError::find(&err).is_none());
    }
}
