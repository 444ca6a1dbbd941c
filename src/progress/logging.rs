//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { project_path } => {
                info!(project = %project_path, "Planning image");
            }
            ProgressEvent::PhaseStarted { phase } => {
                debug!(phase = %phase, "Starting phase");
            }
            ProgressEvent::PhaseComplete { phase, duration } => {
                debug!(
                    phase = %phase,
                    duration_ms = duration.as_millis(),
                    "Phase complete"
                );
            }
            ProgressEvent::LockChecked {
                packages,
                skipped_conditional,
            } => {
                info!(packages, skipped_conditional, "Lock descriptor checked");
            }
            ProgressEvent::ValidationComplete { rules } => {
                debug!(rules, "Plan validation complete");
            }
            ProgressEvent::ContextPacked { entries, bytes } => {
                info!(entries, bytes, "Build context packed");
            }
            ProgressEvent::DaemonOutput { line } => {
                debug!(target: "slimbox::daemon", "{}", line);
            }
            ProgressEvent::ImageBuilt { tag, id } => {
                info!(tag = %tag, id = id.as_deref().unwrap_or("-"), "Image built");
            }
            ProgressEvent::Completed { total_time } => {
                info!(total_time_ms = total_time.as_millis(), "Pipeline complete");
            }
            ProgressEvent::Failed { error } => {
                warn!(error = %error, "Pipeline failed");
            }
        }
    }
}
