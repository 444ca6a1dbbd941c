use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::lock::LockDescriptor;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::phase_trait::WorkflowPhase;

/// Reads and fingerprints `pyproject.toml` and `poetry.lock`
pub struct LockPhase;

#[async_trait]
impl WorkflowPhase for LockPhase {
    fn name(&self) -> &'static str {
        "LockPhase"
    }

    async fn execute(&self, context: &mut PipelineContext) -> Result<()> {
        let descriptor = LockDescriptor::load(&context.project_root)?;
        debug!(digest = %descriptor.short_digest(), "Lock descriptor loaded");
        context.descriptor = Some(descriptor);
        Ok(())
    }
}
