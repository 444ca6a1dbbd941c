use super::context::{PipelineContext, PlanOutput};
use super::phase_trait::WorkflowPhase;
use super::phases::{AssemblePhase, LockPhase, RenderPhase, ResolvePhase, ValidatePhase};
use crate::config::SlimboxConfig;
use crate::progress::{NoOpHandler, ProgressEvent, ProgressHandler};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub struct PipelineOrchestrator {
    progress_handler: Arc<dyn ProgressHandler>,
}

impl Default for PipelineOrchestrator {
    fn default() -> Self {
        Self::new(Arc::new(NoOpHandler))
    }
}

impl PipelineOrchestrator {
    pub fn new(progress_handler: Arc<dyn ProgressHandler>) -> Self {
        Self { progress_handler }
    }

    /// Plan the image for the project at `project_root`.
    ///
    /// Phases run strictly one after another; the first failure aborts the
    /// run and nothing is returned.
    pub async fn execute(&self, project_root: &Path, config: SlimboxConfig) -> Result<PlanOutput> {
        let start = Instant::now();
        info!("Starting pipeline for: {}", project_root.display());
        self.progress_handler.on_progress(&ProgressEvent::Started {
            project_path: project_root.display().to_string(),
        });

        let mut context = PipelineContext::new(project_root, config);
        match self.run_phases(&mut context).await {
            Ok(()) => {}
            Err(e) => {
                self.progress_handler.on_progress(&ProgressEvent::Failed {
                    error: format!("{:#}", e),
                });
                return Err(e);
            }
        }

        let output = context.into_output()?;
        info!(
            stages = output.plan.stages.len(),
            packages = output.report.packages,
            "Pipeline complete"
        );
        self.progress_handler.on_progress(&ProgressEvent::Completed {
            total_time: start.elapsed(),
        });
        Ok(output)
    }

    async fn run_phases(&self, context: &mut PipelineContext) -> Result<()> {
        let validate = ValidatePhase::default();
        let rules = validate.rule_count();

        let workflow_phases: Vec<Box<dyn WorkflowPhase>> = vec![
            Box::new(LockPhase),
            Box::new(ResolvePhase),
            Box::new(AssemblePhase),
            Box::new(validate),
            Box::new(RenderPhase),
        ];

        for phase in workflow_phases {
            let phase_name = phase.name();
            debug!("Phase: {}", phase_name);
            self.progress_handler.on_progress(&ProgressEvent::PhaseStarted {
                phase: phase_name.to_string(),
            });

            let phase_start = Instant::now();
            phase
                .execute(context)
                .await
                .with_context(|| format!("Phase {} failed", phase_name))?;

            self.progress_handler.on_progress(&ProgressEvent::PhaseComplete {
                phase: phase_name.to_string(),
                duration: phase_start.elapsed(),
            });

            match phase_name {
                "ResolvePhase" => {
                    let report = &context.resolver()?.report;
                    self.progress_handler.on_progress(&ProgressEvent::LockChecked {
                        packages: report.packages,
                        skipped_conditional: report.skipped_conditional.len(),
                    });
                }
                "ValidatePhase" => {
                    self.progress_handler
                        .on_progress(&ProgressEvent::ValidationComplete { rules });
                }
                _ => {}
            }
        }
        Ok(())
    }
}
