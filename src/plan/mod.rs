//! Build plan model
//!
//! A plan is assembled stage by stage through [`StageBuilder`] and frozen into
//! a [`BuildPlan`] that renderers and validation rules consume.

pub mod builder;
pub mod graph;
pub mod privilege;
pub mod schema;

pub use builder::{StageBuilder, ROOT_USER};
pub use graph::{ArtifactEdge, StageGraph, StageNode};
pub use privilege::{cleanup_for, PrivilegedWindow};
pub use schema::{
    BuildPlan, EnvironmentArtifact, Healthcheck, Instruction, PlanMetadata, RuntimeContract,
    Stage, StageRole, PLAN_VERSION,
};
