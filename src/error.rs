//! Error types for the scantex library.
//!
//! Only failures that make the whole request unusable are errors here.
//! Everything else — an LLM call that came back empty, a reply that fails
//! structural validation, a context analysis that timed out — degrades into
//! a named fallback variant on the stage's result type (see
//! [`crate::output::CleanOutcome`] and [`crate::output::FormatOutcome`]),
//! so callers can always distinguish "the model did this" from "we fell
//! back" without losing the document.
//!
//! The split mirrors the two real failure classes of the product: a scan
//! with no readable text cannot be processed at all, while a flaky upstream
//! model merely costs output quality.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the scantex library.
///
/// Stage-level degradations (empty model output, invalid generated LaTeX)
/// are not represented here; they surface as fallback variants on the
/// stage outcome types instead.
#[derive(Debug, Error)]
pub enum ScantexError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// No text was available to process: every OCR extraction failed, or
    /// the caller handed in an empty string.
    #[error("No text to process — all extractions failed or input was empty")]
    NothingToProcess,

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The HTTP client could not be constructed (bad endpoint, TLS setup).
    #[error("Failed to initialise completion client: {0}")]
    ClientInit(String),

    // ── Compile errors ────────────────────────────────────────────────────
    /// pdflatex is not installed or not on PATH.
    #[error(
        "pdflatex not found on PATH.\n\
         Install a LaTeX distribution (texlive-latex-base on Linux, MacTeX on macOS)."
    )]
    CompilerMissing,

    /// The compiler exited nonzero.
    #[error("LaTeX compilation failed on pass {pass}: {detail}")]
    CompileFailed { pass: u32, detail: String },

    /// A single compiler pass exceeded the configured timeout.
    #[error("LaTeX compilation timed out after {secs}s")]
    CompileTimeout { secs: u64 },

    /// The compiler exited cleanly but produced no PDF.
    #[error("No PDF artifact produced despite successful compilation")]
    NoArtifactProduced,

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_failed_display() {
        let e = ScantexError::CompileFailed {
            pass: 2,
            detail: "! Missing $ inserted".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("pass 2"), "got: {msg}");
        assert!(msg.contains("Missing $ inserted"));
    }

    #[test]
    fn compiler_missing_mentions_install_hint() {
        let msg = ScantexError::CompilerMissing.to_string();
        assert!(msg.contains("PATH"));
        assert!(msg.contains("texlive") || msg.contains("MacTeX"));
    }

    #[test]
    fn compile_timeout_display() {
        let e = ScantexError::CompileTimeout { secs: 60 };
        assert!(e.to_string().contains("60s"));
    }
}
