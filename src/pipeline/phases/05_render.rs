use anyhow::Result;
use async_trait::async_trait;

use crate::pipeline::context::PipelineContext;
use crate::pipeline::phase_trait::WorkflowPhase;
use crate::render::{dockerfile, dockerignore};

/// Renders the Dockerfile and `.dockerignore`
pub struct RenderPhase;

#[async_trait]
impl WorkflowPhase for RenderPhase {
    fn name(&self) -> &'static str {
        "RenderPhase"
    }

    async fn execute(&self, context: &mut PipelineContext) -> Result<()> {
        let rendered = dockerfile::render(context.plan()?)?;
        context.dockerfile = Some(rendered);
        context.dockerignore = Some(dockerignore::render(&context.project_root));
        Ok(())
    }
}
