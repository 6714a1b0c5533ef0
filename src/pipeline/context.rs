//! Context analysis: classify the source document before cleaning it.
//!
//! One short completion call that tells the later stages what they are
//! looking at — subject area, document type, structural shape. The result
//! is folded into the cleaning and formatting prompts, where it measurably
//! improves correction of domain vocabulary and math notation.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::client::{reply_text, CompletionClient};
use crate::observe::{Observer, Stage};
use crate::prompts;

/// Fixed summary used when analysis fails or returns nothing.
pub const DEFAULT_CONTEXT: &str = "General academic document with mathematical content.";

/// Classify `source_text` into a 2–3 sentence context summary.
///
/// Never fails: a dead or empty completion degrades to
/// [`DEFAULT_CONTEXT`], which downstream prompts treat as a harmless
/// generic bias.
pub async fn analyze(
    client: &Arc<dyn CompletionClient>,
    source_text: &str,
    observer: Option<&Observer>,
) -> String {
    let start = Instant::now();
    if let Some(obs) = observer {
        obs.on_stage_start(Stage::Analyze);
    }

    let prompt = prompts::context_analysis_prompt(source_text);
    let reply = client.complete(&prompt, prompts::CONTEXT_ANALYST).await;

    match reply_text(&reply) {
        Some(summary) => {
            debug!("Context analysis complete: {} chars", summary.len());
            if let Some(obs) = observer {
                obs.on_stage_complete(
                    Stage::Analyze,
                    summary.len(),
                    start.elapsed().as_millis() as u64,
                );
            }
            summary.to_string()
        }
        None => {
            warn!("Context analysis failed or returned nothing, using generic default");
            if let Some(obs) = observer {
                obs.on_stage_fallback(Stage::Analyze, "empty or failed completion");
            }
            DEFAULT_CONTEXT.to_string()
        }
    }
}
