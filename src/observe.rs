//! Observer trait for per-stage pipeline events.
//!
//! Inject an [`Arc<dyn PipelineObserver>`] via
//! [`crate::config::ProcessingConfigBuilder::observer`] to receive
//! real-time events as the pipeline runs each stage.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers
//! can forward events to a broadcast channel, a WebSocket, a database
//! record, or a terminal spinner — without the library knowing anything
//! about how the host application communicates. It also replaces any
//! process-wide timing registry: tests assert on the events they received,
//! not on global state.

use std::fmt;
use std::sync::Arc;

/// The pipeline stages an observer can be notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Context analysis of the source text.
    Analyze,
    /// OCR-noise correction.
    Clean,
    /// LaTeX generation.
    Format,
    /// Title recommendation.
    Title,
    /// Best-effort structure enhancement.
    Enhance,
    /// Key-information extraction.
    Extract,
    /// Exam question generation.
    ExamGenerate,
    /// LaTeX-to-PDF compilation.
    Compile,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Analyze => "analyze",
            Stage::Clean => "clean",
            Stage::Format => "format",
            Stage::Title => "title",
            Stage::Enhance => "enhance",
            Stage::Extract => "extract",
            Stage::ExamGenerate => "exam-generate",
            Stage::Compile => "compile",
        };
        f.write_str(name)
    }
}

/// Called by the pipeline as it enters and leaves each stage.
///
/// Implementations must be `Send + Sync`; independent requests may run
/// concurrently. All methods have default no-op implementations so callers
/// only override what they care about.
pub trait PipelineObserver: Send + Sync {
    /// Called just before a stage begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a stage produced its primary output.
    ///
    /// `output_len` is the byte length of the stage's text output, useful
    /// for progress displays that track volume.
    fn on_stage_complete(&self, stage: Stage, output_len: usize, duration_ms: u64) {
        let _ = (stage, output_len, duration_ms);
    }

    /// Called when a stage degraded to its fallback value instead of the
    /// model's output.
    fn on_stage_fallback(&self, stage: Stage, reason: &str) {
        let _ = (stage, reason);
    }
}

/// A no-op implementation for callers that don't need events.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Convenience alias matching the type stored in
/// [`crate::config::ProcessingConfig`].
pub type Observer = Arc<dyn PipelineObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct TrackingObserver {
        starts: AtomicUsize,
        completes: AtomicUsize,
        fallbacks: Mutex<Vec<(Stage, String)>>,
    }

    impl PipelineObserver for TrackingObserver {
        fn on_stage_start(&self, _stage: Stage) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        fn on_stage_complete(&self, _stage: Stage, _len: usize, _ms: u64) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }
        fn on_stage_fallback(&self, stage: Stage, reason: &str) {
            self.fallbacks
                .lock()
                .unwrap()
                .push((stage, reason.to_string()));
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let obs = NoopObserver;
        obs.on_stage_start(Stage::Clean);
        obs.on_stage_complete(Stage::Clean, 42, 10);
        obs.on_stage_fallback(Stage::Format, "validation failed");
    }

    #[test]
    fn tracking_observer_receives_events() {
        let obs = TrackingObserver {
            starts: AtomicUsize::new(0),
            completes: AtomicUsize::new(0),
            fallbacks: Mutex::new(vec![]),
        };

        obs.on_stage_start(Stage::Analyze);
        obs.on_stage_complete(Stage::Analyze, 100, 5);
        obs.on_stage_start(Stage::Clean);
        obs.on_stage_fallback(Stage::Clean, "empty completion");

        assert_eq!(obs.starts.load(Ordering::SeqCst), 2);
        assert_eq!(obs.completes.load(Ordering::SeqCst), 1);
        let fallbacks = obs.fallbacks.lock().unwrap();
        assert_eq!(fallbacks.len(), 1);
        assert_eq!(fallbacks[0].0, Stage::Clean);
    }

    #[test]
    fn stage_display_names() {
        assert_eq!(Stage::ExamGenerate.to_string(), "exam-generate");
        assert_eq!(Stage::Format.to_string(), "format");
    }

    #[test]
    fn arc_dyn_observer_works() {
        let obs: Arc<dyn PipelineObserver> = Arc::new(NoopObserver);
        obs.on_stage_start(Stage::Compile);
    }
}
