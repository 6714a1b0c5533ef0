//! Pipeline orchestration: sequence the stages into one processing run.
//!
//! Two supported sequences share every stage implementation:
//!
//! * **Context-aware** — `analyze → clean(ctx) → format(ctx)`. One extra
//!   completion call buys domain-aware corrections.
//! * **Legacy** — `clean → format`. No context analysis; used when the
//!   caller wants the cheapest possible run.
//!
//! Either sequence recommends a title from the *corrected* text when the
//! request carried none — corrected text gives far better signal than raw
//! OCR noise. [`DocumentPipeline::process_complete`] additionally runs the
//! best-effort enrichment passes.
//!
//! A lower stage degrading never aborts the request: every stage owns a
//! safe fallback. The only hard error is having nothing to process at all.

use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::client::CompletionClient;
use crate::config::ProcessingConfig;
use crate::error::ScantexError;
use crate::output::{CleanOutcome, DocumentRequest, ProcessingOutput, ProcessingStats};
use crate::pipeline::{clean, context, enrich, format, title};

/// The document-reconstruction pipeline.
///
/// Holds the shared completion client and configuration; each call to a
/// `process*` method is an independent request with its own request-scoped
/// values, so one pipeline can serve concurrent requests without locking.
pub struct DocumentPipeline {
    client: Arc<dyn CompletionClient>,
    config: ProcessingConfig,
}

impl DocumentPipeline {
    pub fn new(client: Arc<dyn CompletionClient>, config: ProcessingConfig) -> Self {
        Self { client, config }
    }

    /// Access the pipeline's configuration.
    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Run the standard sequence on `source_text`.
    ///
    /// Honours `config.skip_context`: with it set this is exactly
    /// [`process_legacy`](Self::process_legacy).
    ///
    /// # Errors
    /// [`ScantexError::NothingToProcess`] when `source_text` is empty —
    /// the single case with no sensible fallback.
    pub async fn process(
        &self,
        source_text: &str,
        request: &DocumentRequest,
    ) -> Result<ProcessingOutput, ScantexError> {
        if self.config.skip_context {
            self.run(source_text, request, false, false).await
        } else {
            self.run(source_text, request, true, false).await
        }
    }

    /// Run the legacy sequence (no context analysis).
    pub async fn process_legacy(
        &self,
        source_text: &str,
        request: &DocumentRequest,
    ) -> Result<ProcessingOutput, ScantexError> {
        self.run(source_text, request, false, false).await
    }

    /// Run the full sequence plus the best-effort enrichment passes
    /// (structure enhancement and key-information extraction).
    pub async fn process_complete(
        &self,
        source_text: &str,
        request: &DocumentRequest,
    ) -> Result<ProcessingOutput, ScantexError> {
        self.run(source_text, request, !self.config.skip_context, true)
            .await
    }

    async fn run(
        &self,
        source_text: &str,
        request: &DocumentRequest,
        with_context: bool,
        with_enrichment: bool,
    ) -> Result<ProcessingOutput, ScantexError> {
        if source_text.trim().is_empty() {
            return Err(ScantexError::NothingToProcess);
        }

        let total_start = Instant::now();
        let observer = self.config.observer.as_ref();
        let mut stats = ProcessingStats::default();
        info!(
            "Starting {} processing of {} chars",
            if with_context { "context-aware" } else { "legacy" },
            source_text.len()
        );

        // ── Step 1: Context analysis (optional) ──────────────────────────
        let context_summary = if with_context {
            let start = Instant::now();
            let summary = context::analyze(&self.client, source_text, observer).await;
            stats.analyze_ms = start.elapsed().as_millis() as u64;
            stats.completion_calls += 1;
            Some(summary)
        } else {
            None
        };

        // ── Step 2: Clean ────────────────────────────────────────────────
        let clean_start = Instant::now();
        let normalized = clean::clean(
            &self.client,
            source_text,
            context_summary.as_deref(),
            request.remarks.as_deref(),
            observer,
        )
        .await;
        stats.clean_ms = clean_start.elapsed().as_millis() as u64;
        if !matches!(normalized, CleanOutcome::EmptyInput) {
            stats.completion_calls += 1;
        }

        // ── Step 3: Optional enrichment of the corrected text ────────────
        let (final_text, enhanced_text, key_information) = if with_enrichment {
            let enhanced = if self.config.enhance_structure {
                enrich::enhance_structure(
                    &self.client,
                    normalized.text(),
                    request.title.as_deref(),
                    request.category.as_deref(),
                    observer,
                )
                .await
            } else {
                normalized.text().to_string()
            };
            if self.config.enhance_structure {
                stats.completion_calls += 1;
            }

            let key_info =
                enrich::extract_key_information(&self.client, &enhanced, observer).await;
            stats.completion_calls += 1;

            (enhanced.clone(), Some(enhanced), Some(key_info))
        } else {
            (normalized.text().to_string(), None, None)
        };

        // ── Step 4: Format to LaTeX ──────────────────────────────────────
        let format_start = Instant::now();
        let document = format::format(
            &self.client,
            &final_text,
            context_summary.as_deref(),
            request.title.as_deref(),
            request.category.as_deref(),
            request.remarks.as_deref(),
            observer,
        )
        .await;
        stats.format_ms = format_start.elapsed().as_millis() as u64;
        if !final_text.trim().is_empty() {
            stats.completion_calls += 1;
        }

        // ── Step 5: Title recommendation when none was supplied ──────────
        let recommended_title = if request.title.is_none() {
            let t = title::recommend_title(&self.client, normalized.text(), observer).await;
            if !normalized.text().trim().is_empty() {
                stats.completion_calls += 1;
            }
            Some(t)
        } else {
            None
        };

        stats.total_ms = total_start.elapsed().as_millis() as u64;
        info!(
            "Processing complete in {}ms ({} completion calls)",
            stats.total_ms, stats.completion_calls
        );

        Ok(ProcessingOutput {
            context_summary,
            normalized,
            document,
            recommended_title,
            enhanced_text,
            key_information,
            stats,
        })
    }
}
