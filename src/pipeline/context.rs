//! State carried from one pipeline phase to the next

use anyhow::{anyhow, Result};
use std::path::PathBuf;

use crate::config::SlimboxConfig;
use crate::lock::{LockDescriptor, LockReport};
use crate::plan::BuildPlan;
use crate::stages::{AssemblyStage, ResolverStage};

/// Each phase fills in one slot and reads the ones before it
pub struct PipelineContext {
    pub project_root: PathBuf,
    pub config: SlimboxConfig,
    pub descriptor: Option<LockDescriptor>,
    pub resolver: Option<ResolverStage>,
    pub assembly: Option<AssemblyStage>,
    pub plan: Option<BuildPlan>,
    pub dockerfile: Option<String>,
    pub dockerignore: Option<String>,
}

/// Everything a successful planning run produces
#[derive(Debug, Clone)]
pub struct PlanOutput {
    pub plan: BuildPlan,
    pub report: LockReport,
    pub dockerfile: String,
    pub dockerignore: String,
}

fn missing(what: &str) -> anyhow::Error {
    anyhow!("Pipeline has no {} yet; phases ran out of order", what)
}

impl PipelineContext {
    pub fn new(project_root: impl Into<PathBuf>, config: SlimboxConfig) -> Self {
        Self {
            project_root: project_root.into(),
            config,
            descriptor: None,
            resolver: None,
            assembly: None,
            plan: None,
            dockerfile: None,
            dockerignore: None,
        }
    }

    pub fn descriptor(&self) -> Result<&LockDescriptor> {
        self.descriptor.as_ref().ok_or_else(|| missing("lock descriptor"))
    }

    pub fn resolver(&self) -> Result<&ResolverStage> {
        self.resolver.as_ref().ok_or_else(|| missing("resolver stage"))
    }

    pub fn plan(&self) -> Result<&BuildPlan> {
        self.plan.as_ref().ok_or_else(|| missing("build plan"))
    }

    /// Consume the context once every phase has run
    pub fn into_output(self) -> Result<PlanOutput> {
        let report = self.resolver.ok_or_else(|| missing("resolver stage"))?.report;
        Ok(PlanOutput {
            plan: self.plan.ok_or_else(|| missing("build plan"))?,
            report,
            dockerfile: self.dockerfile.ok_or_else(|| missing("Dockerfile"))?,
            dockerignore: self.dockerignore.ok_or_else(|| missing(".dockerignore"))?,
        })
    }
}
