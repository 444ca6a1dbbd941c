//! Stage planners
//!
//! Each planner turns configuration plus the lock descriptor into the
//! instructions of one stage. They never talk to a container engine.

pub mod assembly;
pub mod resolver;

pub use assembly::AssemblyStage;
pub use resolver::ResolverStage;

use crate::config::SlimboxConfig;
use crate::error::BuildError;
use crate::lock::LockDescriptor;
use crate::plan::{BuildPlan, PlanMetadata, StageGraph, PLAN_VERSION};

/// Join both stages into a plan, recording the artifact edge between them
pub fn compose(
    config: &SlimboxConfig,
    descriptor: &LockDescriptor,
    resolver: ResolverStage,
    assembly: AssemblyStage,
) -> Result<BuildPlan, BuildError> {
    let mut graph = StageGraph::new();
    graph.add_stage(&resolver.stage.name, resolver.stage.role)?;
    graph.add_stage(&assembly.stage.name, assembly.stage.role)?;
    graph.add_artifact(&resolver.stage.name, &assembly.stage.name, &resolver.artifact.path)?;
    graph.validate_pipeline()?;

    let metadata = PlanMetadata {
        project_name: descriptor.manifest.name.clone(),
        project_version: descriptor.manifest.version.clone(),
        lock_digest: descriptor.digest.clone(),
        locked_packages: resolver.report.packages,
        environment: config.environment.to_string(),
    };

    Ok(BuildPlan {
        version: PLAN_VERSION.to_string(),
        metadata,
        graph,
        stages: vec![resolver.stage, assembly.stage],
        artifact: resolver.artifact,
        runtime: assembly.runtime,
    })
}

#[cfg(test)]
mod tests {
    use crate::validation::test_support::valid_plan;

    #[test]
    fn test_compose_links_stages() {
        let plan = valid_plan();
        assert_eq!(plan.graph.topological_order().unwrap(), vec!["resolver", "runtime"]);
        assert_eq!(plan.graph.edges()[0].path, "/app/.venv");
        assert_eq!(plan.metadata.locked_packages, 7);
        assert_eq!(plan.metadata.environment, "production");
    }
}
