//! Dependency resolver stage
//!
//! Installs the locked main dependency group into a fresh virtual environment
//! and nothing else. The resolver tool itself lives in a separate tool
//! environment so that it never ends up inside the environment artifact.

use tracing::{debug, info};

use crate::config::SlimboxConfig;
use crate::error::BuildError;
use crate::lock::{self, LockDescriptor, LockReport, LOCK_FILE, MANIFEST_FILE};
use crate::plan::{EnvironmentArtifact, Stage, StageBuilder, StageRole};

pub const STAGE_NAME: &str = "resolver";

/// Isolated environment holding the resolver tool
pub const TOOL_ENV: &str = "/opt/poetry";
pub const TOOL_CACHE: &str = "/tmp/poetry_cache";

/// Output of planning the resolver stage
#[derive(Debug, Clone)]
pub struct ResolverStage {
    pub stage: Stage,
    pub artifact: EnvironmentArtifact,
    pub report: LockReport,
}

/// Plan the resolver stage for a lock descriptor.
///
/// The descriptor is checked first; an inconsistent lock aborts before any
/// instruction exists.
pub fn plan(config: &SlimboxConfig, descriptor: &LockDescriptor) -> Result<ResolverStage, BuildError> {
    let report = lock::check(descriptor)?;
    info!(
        packages = report.packages,
        direct = report.direct,
        "Lock descriptor is consistent"
    );

    let artifact = EnvironmentArtifact::new(config.env_path.as_str());
    let mut stage = StageBuilder::new(STAGE_NAME, StageRole::Resolver, config.builder_image.as_str());

    stage
        .env("POETRY_NO_INTERACTION", "1")
        .env("POETRY_VIRTUALENVS_CREATE", "false")
        .env("POETRY_CACHE_DIR", TOOL_CACHE)
        .env("PIP_NO_CACHE_DIR", "1")
        .env("PIP_DISABLE_PIP_VERSION_CHECK", "1")
        .env("VIRTUAL_ENV", artifact.path.as_str())
        .workdir(&config.workdir)
        .run(format!(
            "python -m venv {tool} && {tool}/bin/pip install poetry=={version}",
            tool = TOOL_ENV,
            version = config.poetry_version
        ))
        .run(format!("python -m venv {}", artifact.path))
        .copy(&[MANIFEST_FILE, LOCK_FILE], "./", None)
        .run(format!(
            "{}/bin/poetry install --no-root --only main --no-interaction --no-ansi && rm -rf $POETRY_CACHE_DIR",
            TOOL_ENV
        ));

    let stage = stage.finish();
    debug!(
        instructions = stage.instructions.len(),
        artifact = %artifact.path,
        "Planned resolver stage"
    );

    Ok(ResolverStage {
        stage,
        artifact,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::fixtures;
    use crate::lock::LockError;
    use crate::plan::Instruction;
    use std::fs;
    use tempfile::TempDir;

    fn descriptor(manifest: &str, lock: &str) -> (TempDir, LockDescriptor) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), manifest).unwrap();
        fs::write(dir.path().join(LOCK_FILE), lock).unwrap();
        let descriptor = LockDescriptor::load(dir.path()).unwrap();
        (dir, descriptor)
    }

    #[test]
    fn test_installs_dependencies_only() {
        let (_dir, descriptor) = descriptor(fixtures::MANIFEST, fixtures::LOCK);
        let resolver = plan(&SlimboxConfig::default(), &descriptor).unwrap();

        assert_eq!(resolver.artifact.path, "/app/.venv");
        assert_eq!(resolver.stage.role, StageRole::Resolver);
        assert_eq!(resolver.report.packages, 7);

        let install = resolver
            .stage
            .instructions
            .last()
            .cloned()
            .unwrap();
        match install {
            Instruction::Run { command, privileged } => {
                assert!(!privileged);
                assert!(command.contains("install --no-root --only main"));
                assert!(command.ends_with("rm -rf $POETRY_CACHE_DIR"));
            }
            other => panic!("unexpected final instruction {:?}", other),
        }
    }

    #[test]
    fn test_copies_only_manifest_and_lock() {
        let (_dir, descriptor) = descriptor(fixtures::MANIFEST, fixtures::LOCK);
        let resolver = plan(&SlimboxConfig::default(), &descriptor).unwrap();

        let copies: Vec<_> = resolver.stage.copies().collect();
        assert_eq!(copies.len(), 1);
        assert_eq!(
            copies[0],
            &Instruction::Copy {
                from_stage: None,
                sources: vec!["pyproject.toml".to_string(), "poetry.lock".to_string()],
                dest: "./".to_string(),
                chown: None,
            }
        );
    }

    #[test]
    fn test_tool_kept_out_of_artifact() {
        let (_dir, descriptor) = descriptor(fixtures::MANIFEST, fixtures::LOCK);
        let config = SlimboxConfig {
            poetry_version: "1.7.1".to_string(),
            ..SlimboxConfig::default()
        };
        let resolver = plan(&config, &descriptor).unwrap();

        let runs: Vec<_> = resolver
            .stage
            .instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::Run { command, .. } => Some(command.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            runs[0],
            "python -m venv /opt/poetry && /opt/poetry/bin/pip install poetry==1.7.1"
        );
        assert_eq!(runs[1], "python -m venv /app/.venv");
    }

    #[test]
    fn test_inconsistent_lock_aborts() {
        let lock = fixtures::LOCK.replace("version = \"4.3.0\"", "version = \"2.0.0\"");
        let (_dir, descriptor) = descriptor(fixtures::MANIFEST, &lock);
        let err = plan(&SlimboxConfig::default(), &descriptor).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Resolution(LockError::Conflict { .. })
        ));
    }
}
