//! Configuration for document processing.
//!
//! All pipeline behaviour is controlled through [`ProcessingConfig`], built
//! via its [`ProcessingConfigBuilder`]. Keeping every knob in one struct
//! makes it trivial to share configs across requests and to see at a
//! glance why two runs behaved differently.
//!
//! Completion-service connection settings live separately in
//! [`crate::client::CompletionConfig`] — they belong to the client, which
//! is constructed once and shared, not to an individual processing run.

use crate::error::ScantexError;
use crate::observe::Observer;
use std::fmt;

/// Configuration for one document-processing pipeline.
///
/// Built via [`ProcessingConfig::builder()`] or
/// [`ProcessingConfig::default()`].
///
/// # Example
/// ```rust
/// use scantex::ProcessingConfig;
///
/// let config = ProcessingConfig::builder()
///     .skip_context(true)
///     .compile_runs(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ProcessingConfig {
    /// Skip the context-analysis stage and run the legacy two-step
    /// sequence (clean → format). Default: false.
    ///
    /// Context analysis costs one extra completion call per document but
    /// measurably improves correction of domain vocabulary and notation.
    /// Skip it for throwaway conversions or when the upstream service is
    /// rate-limited.
    pub skip_context: bool,

    /// Run the structure-enhancement pass in the complete pipeline.
    /// Default: true.
    pub enhance_structure: bool,

    /// Concurrent OCR extractions per request. Default: 3.
    ///
    /// OCR services rate-limit aggressively; three in-flight requests with
    /// pacing stays under typical free-tier limits while still cutting
    /// wall-clock time for multi-page scans.
    pub ocr_concurrency: usize,

    /// Pause after each OCR request in milliseconds. Default: 500.
    pub ocr_pacing_ms: u64,

    /// Fixed number of LaTeX compiler passes. Default: 2.
    ///
    /// Documents with cross-references need a second pass to resolve them.
    /// This is a fixed convention, not an adaptive retry.
    pub compile_runs: u32,

    /// Timeout per compiler pass in seconds. Default: 60.
    pub compile_timeout_secs: u64,

    /// Observer for per-stage events. Default: none.
    pub observer: Option<Observer>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            skip_context: false,
            enhance_structure: true,
            ocr_concurrency: 3,
            ocr_pacing_ms: 500,
            compile_runs: 2,
            compile_timeout_secs: 60,
            observer: None,
        }
    }
}

impl fmt::Debug for ProcessingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingConfig")
            .field("skip_context", &self.skip_context)
            .field("enhance_structure", &self.enhance_structure)
            .field("ocr_concurrency", &self.ocr_concurrency)
            .field("ocr_pacing_ms", &self.ocr_pacing_ms)
            .field("compile_runs", &self.compile_runs)
            .field("compile_timeout_secs", &self.compile_timeout_secs)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn PipelineObserver>"))
            .finish()
    }
}

impl ProcessingConfig {
    /// Create a new builder for `ProcessingConfig`.
    pub fn builder() -> ProcessingConfigBuilder {
        ProcessingConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ProcessingConfig`].
#[derive(Debug)]
pub struct ProcessingConfigBuilder {
    config: ProcessingConfig,
}

impl ProcessingConfigBuilder {
    pub fn skip_context(mut self, v: bool) -> Self {
        self.config.skip_context = v;
        self
    }

    pub fn enhance_structure(mut self, v: bool) -> Self {
        self.config.enhance_structure = v;
        self
    }

    pub fn ocr_concurrency(mut self, n: usize) -> Self {
        self.config.ocr_concurrency = n.max(1);
        self
    }

    pub fn ocr_pacing_ms(mut self, ms: u64) -> Self {
        self.config.ocr_pacing_ms = ms;
        self
    }

    pub fn compile_runs(mut self, runs: u32) -> Self {
        self.config.compile_runs = runs.max(1);
        self
    }

    pub fn compile_timeout_secs(mut self, secs: u64) -> Self {
        self.config.compile_timeout_secs = secs;
        self
    }

    pub fn observer(mut self, observer: Observer) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ProcessingConfig, ScantexError> {
        let c = &self.config;
        if c.ocr_concurrency == 0 {
            return Err(ScantexError::InvalidConfig(
                "OCR concurrency must be ≥ 1".into(),
            ));
        }
        if c.compile_runs == 0 {
            return Err(ScantexError::InvalidConfig(
                "Compile runs must be ≥ 1".into(),
            ));
        }
        if c.compile_timeout_secs == 0 {
            return Err(ScantexError::InvalidConfig(
                "Compile timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ProcessingConfig::default();
        assert!(!c.skip_context);
        assert!(c.enhance_structure);
        assert_eq!(c.ocr_concurrency, 3);
        assert_eq!(c.ocr_pacing_ms, 500);
        assert_eq!(c.compile_runs, 2);
        assert_eq!(c.compile_timeout_secs, 60);
    }

    #[test]
    fn builder_clamps_zero_concurrency() {
        let c = ProcessingConfig::builder()
            .ocr_concurrency(0)
            .build()
            .unwrap();
        assert_eq!(c.ocr_concurrency, 1);
    }

    #[test]
    fn builder_rejects_zero_compile_timeout() {
        let err = ProcessingConfig::builder()
            .compile_timeout_secs(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, ScantexError::InvalidConfig(_)));
    }

    #[test]
    fn debug_does_not_require_observer_debug() {
        use crate::observe::NoopObserver;
        use std::sync::Arc;
        let c = ProcessingConfig::builder()
            .observer(Arc::new(NoopObserver))
            .build()
            .unwrap();
        let repr = format!("{c:?}");
        assert!(repr.contains("<dyn PipelineObserver>"));
    }
}
