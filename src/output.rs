//! Result types produced by the document pipeline.
//!
//! Every stage that can degrade reports *how* it produced its output, not
//! just the output itself. A caller that sees `FellBackToOriginal` knows
//! the cleaning model never answered; a caller that sees `Cleaned` knows
//! it did. Collapsing both into a plain `String` would make the two
//! indistinguishable — which is exactly the situation these enums exist to
//! prevent.

use serde::{Deserialize, Serialize};

/// Optional per-request inputs supplied by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentRequest {
    /// Document title; when absent the pipeline recommends one.
    pub title: Option<String>,
    /// Document category, rendered as a heading by the fallback formatter.
    pub category: Option<String>,
    /// Free-form user remarks, passed through into prompts unmodified.
    pub remarks: Option<String>,
}

/// Outcome of the OCR-correction stage.
///
/// Invariant: for non-empty input the carried text is never empty — it is
/// either the model's cleaned output or exactly the original input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "text")]
pub enum CleanOutcome {
    /// The completion service returned usable corrected text.
    Cleaned(String),
    /// The service failed or returned nothing; the original text is kept.
    FellBackToOriginal(String),
    /// Input was empty or whitespace-only; no call was made.
    EmptyInput,
}

impl CleanOutcome {
    /// The text to feed into the next stage.
    pub fn text(&self) -> &str {
        match self {
            CleanOutcome::Cleaned(s) | CleanOutcome::FellBackToOriginal(s) => s,
            CleanOutcome::EmptyInput => "",
        }
    }

    /// Whether the model's output was discarded in favour of the input.
    pub fn is_fallback(&self) -> bool {
        matches!(self, CleanOutcome::FellBackToOriginal(_))
    }
}

/// Outcome of the LaTeX-generation stage.
///
/// Invariant: every variant carries a structurally valid document
/// (`\documentclass`, `\begin{document}`, `\end{document}` all present).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "latex")]
pub enum FormatOutcome {
    /// The model produced a document that passed structural validation.
    Generated(String),
    /// The model's output failed validation (or never arrived); this is
    /// the deterministic fallback document built from the input text.
    Fallback(String),
    /// Input was empty; this is the minimal "Empty Document" placeholder.
    EmptyInput(String),
}

impl FormatOutcome {
    /// The LaTeX source, valid in every variant.
    pub fn latex(&self) -> &str {
        match self {
            FormatOutcome::Generated(s)
            | FormatOutcome::Fallback(s)
            | FormatOutcome::EmptyInput(s) => s,
        }
    }

    /// Whether the deterministic fallback path produced this document.
    pub fn is_fallback(&self) -> bool {
        matches!(self, FormatOutcome::Fallback(_))
    }
}

/// Locally computed document facts plus the model's free-form analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyInformation {
    /// The model's structured analysis, absent when the call failed.
    pub analysis: Option<String>,
    /// Whitespace-separated word count of the analyzed text.
    pub word_count: usize,
    /// Character count of the analyzed text.
    pub character_count: usize,
    /// Estimated reading time at ~200 words per minute.
    pub estimated_reading_minutes: usize,
    /// Failure detail when `analysis` is absent.
    pub error: Option<String>,
}

/// Wall-clock accounting for one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingStats {
    /// Context-analysis duration (0 when the stage was skipped).
    pub analyze_ms: u64,
    /// Cleaning duration.
    pub clean_ms: u64,
    /// LaTeX-generation duration.
    pub format_ms: u64,
    /// End-to-end duration including optional stages.
    pub total_ms: u64,
    /// Number of completion-service calls actually made.
    pub completion_calls: u32,
}

/// Everything one pipeline run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingOutput {
    /// Context summary, present only for the context-aware sequence.
    pub context_summary: Option<String>,
    /// Cleaning outcome; its text feeds the formatter.
    pub normalized: CleanOutcome,
    /// The generated (or fallback) LaTeX document.
    pub document: FormatOutcome,
    /// Recommended title, present only when the request carried none.
    pub recommended_title: Option<String>,
    /// Structure-enhanced text, present only for the complete pipeline.
    pub enhanced_text: Option<String>,
    /// Key-information extraction result, present only for the complete
    /// pipeline.
    pub key_information: Option<KeyInformation>,
    /// Timing and call accounting.
    pub stats: ProcessingStats,
}
