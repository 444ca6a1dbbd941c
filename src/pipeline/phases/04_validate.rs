use anyhow::Result;
use async_trait::async_trait;

use crate::pipeline::context::PipelineContext;
use crate::pipeline::phase_trait::WorkflowPhase;
use crate::validation::Validator;

/// Checks the plan against every image invariant
pub struct ValidatePhase {
    validator: Validator,
}

impl ValidatePhase {
    pub fn new(validator: Validator) -> Self {
        Self { validator }
    }

    pub fn rule_count(&self) -> usize {
        self.validator.rule_names().len()
    }
}

impl Default for ValidatePhase {
    fn default() -> Self {
        Self::new(Validator::default())
    }
}

#[async_trait]
impl WorkflowPhase for ValidatePhase {
    fn name(&self) -> &'static str {
        "ValidatePhase"
    }

    async fn execute(&self, context: &mut PipelineContext) -> Result<()> {
        self.validator.validate(context.plan()?)?;
        Ok(())
    }
}
