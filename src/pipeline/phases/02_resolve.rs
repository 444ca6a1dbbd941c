use anyhow::Result;
use async_trait::async_trait;

use crate::pipeline::context::PipelineContext;
use crate::pipeline::phase_trait::WorkflowPhase;
use crate::stages::resolver;

/// Checks the lock and plans the resolver stage
pub struct ResolvePhase;

#[async_trait]
impl WorkflowPhase for ResolvePhase {
    fn name(&self) -> &'static str {
        "ResolvePhase"
    }

    async fn execute(&self, context: &mut PipelineContext) -> Result<()> {
        let stage = resolver::plan(&context.config, context.descriptor()?)?;
        context.resolver = Some(stage);
        Ok(())
    }
}
