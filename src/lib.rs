//! # scantex
//!
//! Reconstruct scanned-document OCR text into a compilable LaTeX document
//! using an external LLM completion service.
//!
//! ## Why this crate?
//!
//! Raw OCR output from handwritten or photographed notes is noisy:
//! misread digits, broken math notation, mangled umlauts, lost structure.
//! Instead of rule-based cleanup, this crate runs a staged LLM pipeline —
//! classify the document, correct the text with that context, then
//! generate LaTeX against a pinned template contract — with a deterministic
//! fallback at every stage so a flaky model can degrade the output but
//! never lose the source content.
//!
//! ## Pipeline Overview
//!
//! ```text
//! images
//!  │
//!  ├─ 1. OCR      external engine, bounded fan-out, partial failure ok
//!  ├─ 2. Analyze  classify the document to bias later prompts (optional)
//!  ├─ 3. Clean    correct OCR noise; falls back to the original text
//!  ├─ 4. Format   generate LaTeX; validated, with a synthetic fallback
//!  ├─ 5. Title    recommend a title when the caller supplied none
//!  └─ 6. Compile  pdflatex in a disposable workdir (optional)
//! ```
//!
//! A parallel exam synthesizer shares the completion client and the LaTeX
//! contract: it generates a JSON question batch under an explicit
//! difficulty/task distribution and renders it deterministically.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scantex::{
//!     CompletionConfig, DocumentPipeline, DocumentRequest, HttpCompletionClient,
//!     ProcessingConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Arc::new(HttpCompletionClient::new(CompletionConfig {
//!         endpoint: "https://ai.example.com/chat/completions".into(),
//!         api_key: std::env::var("SCANTEX_API_KEY").ok(),
//!         ..Default::default()
//!     })?);
//!
//!     let pipeline = DocumentPipeline::new(client, ProcessingConfig::default());
//!     let output = pipeline
//!         .process("=== page1.png ===\n1,6N = m x , 2", &DocumentRequest::default())
//!         .await?;
//!
//!     println!("{}", output.document.latex());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `scantex` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! scantex = { version = "0.3", default-features = false }
//! ```
//!
//! ## Degradation, not failure
//!
//! Every LLM-backed stage reports *how* it produced its output
//! ([`CleanOutcome`], [`FormatOutcome`]), and every degraded path has a
//! deterministic, network-free fallback. The only hard errors are having
//! no text to process at all and a missing/failed PDF compiler when an
//! artifact was explicitly requested.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod client;
pub mod compile;
pub mod config;
pub mod error;
pub mod exam;
pub mod observe;
pub mod ocr;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use client::{
    reply_text, strip_reasoning, CompletionClient, CompletionConfig, HttpCompletionClient,
    InfoSource, Searchable, Snippet, ERROR_PREFIX,
};
pub use compile::compile_latex;
pub use config::{ProcessingConfig, ProcessingConfigBuilder};
pub use error::ScantexError;
pub use exam::{
    parse_question_batch, reconcile_distribution, render_exam, ExamBatch, ExamSpec,
    ExamSynthesizer, Question, QuestionKind, TaskType,
};
pub use observe::{NoopObserver, Observer, PipelineObserver, Stage};
pub use ocr::{combine_extractions, extract_all, OcrEngine, OcrExtraction, OcrImage};
pub use output::{
    CleanOutcome, DocumentRequest, FormatOutcome, KeyInformation, ProcessingOutput,
    ProcessingStats,
};
pub use process::DocumentPipeline;
