//! OCR-noise correction with a fall-back-to-input policy.
//!
//! The one invariant this stage guarantees: **source content is never
//! lost**. Whatever the completion service does — times out, errors,
//! returns an empty string — the caller gets back either corrected text or
//! exactly the text it handed in, and the outcome variant says which.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::client::{reply_text, CompletionClient};
use crate::observe::{Observer, Stage};
use crate::output::CleanOutcome;
use crate::prompts;

/// Correct OCR noise in `raw_text`.
///
/// `context` (a summary from [`crate::pipeline::context::analyze`]) and
/// `remarks` (free-form user hints) are appended to the prompt when
/// present. Empty input short-circuits without a completion call.
pub async fn clean(
    client: &Arc<dyn CompletionClient>,
    raw_text: &str,
    context: Option<&str>,
    remarks: Option<&str>,
    observer: Option<&Observer>,
) -> CleanOutcome {
    if raw_text.trim().is_empty() {
        warn!("No text provided for cleaning");
        return CleanOutcome::EmptyInput;
    }

    let start = Instant::now();
    if let Some(obs) = observer {
        obs.on_stage_start(Stage::Clean);
    }
    debug!("Cleaning text of length {}", raw_text.len());

    let prompt = prompts::cleaning_prompt(raw_text, context, remarks);
    let reply = client.complete(&prompt, prompts::CLEANING_GUIDE).await;

    match reply_text(&reply) {
        Some(cleaned) => {
            debug!("Text cleaning complete, output length {}", cleaned.len());
            if let Some(obs) = observer {
                obs.on_stage_complete(
                    Stage::Clean,
                    cleaned.len(),
                    start.elapsed().as_millis() as u64,
                );
            }
            CleanOutcome::Cleaned(cleaned.to_string())
        }
        None => {
            warn!("Cleaning returned empty or failed, keeping original text");
            if let Some(obs) = observer {
                obs.on_stage_fallback(Stage::Clean, "empty or failed completion");
            }
            CleanOutcome::FellBackToOriginal(raw_text.to_string())
        }
    }
}
