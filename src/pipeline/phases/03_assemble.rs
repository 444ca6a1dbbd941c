use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::pipeline::context::PipelineContext;
use crate::pipeline::phase_trait::WorkflowPhase;
use crate::stages::{self, assembly};

/// Plans the runtime stage and joins both stages into a plan
pub struct AssemblePhase;

#[async_trait]
impl WorkflowPhase for AssemblePhase {
    fn name(&self) -> &'static str {
        "AssemblePhase"
    }

    async fn execute(&self, context: &mut PipelineContext) -> Result<()> {
        let config = &context.config;
        if config.builder_image != config.runtime_image {
            warn!(
                builder = %config.builder_image,
                runtime = %config.runtime_image,
                "Builder and runtime images differ; the environment artifact may not run on the runtime interpreter"
            );
        }

        let descriptor = context.descriptor()?;
        let resolver = context.resolver()?;
        let assembly = assembly::plan(
            config,
            descriptor,
            &resolver.stage.name,
            &resolver.artifact,
        )?;
        let plan = stages::compose(config, descriptor, resolver.clone(), assembly.clone())?;

        context.assembly = Some(assembly);
        context.plan = Some(plan);
        Ok(())
    }
}
