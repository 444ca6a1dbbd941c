//! BuildPlan schema data structures
//!
//! A `BuildPlan` is the complete, declarative description of the two-stage
//! image: the stage graph, the instructions of every stage in order, and the
//! runtime contract (identity, port, command) the finished image promises.
//! Renderers and validation rules only ever read this structure.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::graph::StageGraph;
use crate::identity::ExecutionIdentity;

pub const PLAN_VERSION: &str = "1.0";

/// What a stage is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageRole {
    /// Installs the locked dependency set into the environment artifact
    Resolver,
    /// Produces the final image
    Runtime,
}

/// Container healthcheck settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Healthcheck {
    pub test: Vec<String>,
    pub interval: String,
    pub timeout: String,
    pub retries: u32,
}

/// One build instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    Env {
        key: String,
        value: String,
    },
    Label {
        key: String,
        value: String,
    },
    Workdir {
        path: String,
    },
    Run {
        command: String,
        /// Runs inside a privileged maintenance window
        #[serde(default)]
        privileged: bool,
    },
    Copy {
        /// Source stage; `None` copies from the build context
        #[serde(skip_serializing_if = "Option::is_none")]
        from_stage: Option<String>,
        sources: Vec<String>,
        dest: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        chown: Option<String>,
    },
    User {
        name: String,
    },
    Expose {
        port: u16,
    },
    Healthcheck(Healthcheck),
    Cmd {
        argv: Vec<String>,
    },
}

/// One stage of the build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub role: StageRole,
    pub base: String,
    pub instructions: Vec<Instruction>,
}

impl Stage {
    /// The user in effect after the last instruction; `None` means the base
    /// image default (root)
    pub fn final_user(&self) -> Option<&str> {
        self.instructions.iter().rev().find_map(|i| match i {
            Instruction::User { name } => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn copies(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions
            .iter()
            .filter(|i| matches!(i, Instruction::Copy { .. }))
    }
}

/// The resolver stage's output handed to the runtime stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentArtifact {
    pub path: String,
}

impl EnvironmentArtifact {
    pub fn new(path: impl Into<String>) -> Self {
        let path: String = path.into();
        Self {
            path: path.trim_end_matches('/').to_string(),
        }
    }

    /// Directory holding the environment's executables
    pub fn bin_dir(&self) -> String {
        format!("{}/bin", self.path)
    }
}

/// What the finished image promises to whoever runs it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeContract {
    pub identity: ExecutionIdentity,
    pub port: u16,
    pub command: Vec<String>,
    pub workdir: String,
    pub source_dest: String,
    pub reload: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_version: Option<String>,
    pub lock_digest: String,
    pub locked_packages: usize,
    pub environment: String,
}

/// Complete two-stage build description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPlan {
    pub version: String,
    pub metadata: PlanMetadata,
    pub graph: StageGraph,
    pub stages: Vec<Stage>,
    pub artifact: EnvironmentArtifact,
    pub runtime: RuntimeContract,
}

impl BuildPlan {
    pub fn stage(&self, role: StageRole) -> Option<&Stage> {
        self.stages.iter().find(|s| s.role == role)
    }

    pub fn resolver(&self) -> Option<&Stage> {
        self.stage(StageRole::Resolver)
    }

    pub fn runtime_stage(&self) -> Option<&Stage> {
        self.stage(StageRole::Runtime)
    }

    /// Serialize the plan to YAML format
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize BuildPlan to YAML")
    }

    /// Serialize the plan to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize BuildPlan to JSON")
    }
}

impl fmt::Display for BuildPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Build Plan")?;
        writeln!(f, "==========")?;
        if let Some(ref name) = self.metadata.project_name {
            match self.metadata.project_version {
                Some(ref version) => writeln!(f, "Project:     {} {}", name, version)?,
                None => writeln!(f, "Project:     {}", name)?,
            }
        }
        writeln!(
            f,
            "Lock:        {} packages (sha256 {})",
            self.metadata.locked_packages,
            &self.metadata.lock_digest[..12.min(self.metadata.lock_digest.len())]
        )?;
        writeln!(f, "Environment: {}", self.metadata.environment)?;
        writeln!(f)?;

        for stage in &self.stages {
            writeln!(f, "Stage {} ({:?}):", stage.name, stage.role)?;
            writeln!(f, "  Base Image:   {}", stage.base)?;
            writeln!(f, "  Instructions: {}", stage.instructions.len())?;
        }
        writeln!(f)?;

        for edge in self.graph.edges() {
            writeln!(f, "Artifact:    {} -> {} ({})", edge.from, edge.to, edge.path)?;
        }
        writeln!(f, "Identity:    {}", self.runtime.identity)?;
        writeln!(f, "Port:        {}", self.runtime.port)?;
        writeln!(f, "Command:     {}", self.runtime.command.join(" "))?;
        if self.runtime.reload {
            writeln!(f, "Warning:     reload-on-change is enabled")?;
        }
        Ok(())
    }
}
