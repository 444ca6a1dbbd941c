//! Progress handler trait and events

use std::time::Duration;

/// Events emitted while planning and building an image
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Planning started for a project
    Started { project_path: String },

    /// A pipeline phase started
    PhaseStarted { phase: String },

    /// A pipeline phase finished
    PhaseComplete { phase: String, duration: Duration },

    /// Lock descriptor checked
    LockChecked {
        packages: usize,
        skipped_conditional: usize,
    },

    /// Plan validation finished
    ValidationComplete { rules: usize },

    /// Build context packed for the daemon
    ContextPacked { entries: usize, bytes: usize },

    /// One line of daemon build output
    DaemonOutput { line: String },

    /// Image built and tagged
    ImageBuilt { tag: String, id: Option<String> },

    /// Pipeline completed successfully
    Completed { total_time: Duration },

    /// Pipeline failed
    Failed { error: String },
}

/// Trait for handling progress events
pub trait ProgressHandler: Send + Sync {
    /// Called when a progress event occurs
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    impl ProgressHandler for CountingHandler {
        fn on_progress(&self, _event: &ProgressEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_noop_handler() {
        let handler = NoOpHandler;
        handler.on_progress(&ProgressEvent::Started {
            project_path: "/test".to_string(),
        });
    }

    #[test]
    fn test_progress_events() {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = CountingHandler {
            count: count.clone(),
        };

        handler.on_progress(&ProgressEvent::Started {
            project_path: "/test".to_string(),
        });
        handler.on_progress(&ProgressEvent::LockChecked {
            packages: 7,
            skipped_conditional: 1,
        });
        handler.on_progress(&ProgressEvent::Completed {
            total_time: Duration::from_secs(1),
        });

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_event_debug() {
        let event = ProgressEvent::PhaseStarted {
            phase: "LockPhase".to_string(),
        };
        let debug_str = format!("{:?}", event);
        assert!(debug_str.contains("PhaseStarted"));
        assert!(debug_str.contains("LockPhase"));
    }
}
