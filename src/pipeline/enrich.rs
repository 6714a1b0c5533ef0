//! Best-effort enrichment passes for the complete pipeline.
//!
//! Both passes here are advisory: structure enhancement returns its input
//! unchanged when the model fails, and key-information extraction returns
//! an error-carrying result. Neither can abort a request.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::client::{reply_text, CompletionClient};
use crate::observe::{Observer, Stage};
use crate::output::KeyInformation;
use crate::prompts;

/// Words-per-minute assumption behind the reading-time estimate.
const READING_WPM: usize = 200;

/// Improve heading/section structure of `text` without changing content.
///
/// Returns the input unchanged on empty input, failed completion, or
/// empty reply.
pub async fn enhance_structure(
    client: &Arc<dyn CompletionClient>,
    text: &str,
    title: Option<&str>,
    category: Option<&str>,
    observer: Option<&Observer>,
) -> String {
    if text.trim().is_empty() {
        return text.to_string();
    }

    let start = Instant::now();
    if let Some(obs) = observer {
        obs.on_stage_start(Stage::Enhance);
    }

    let prompt = prompts::structure_prompt(text, title, category);
    let reply = client.complete(&prompt, prompts::STRUCTURE_GUIDE).await;

    match reply_text(&reply) {
        Some(enhanced) => {
            debug!("Structure enhancement complete");
            if let Some(obs) = observer {
                obs.on_stage_complete(
                    Stage::Enhance,
                    enhanced.len(),
                    start.elapsed().as_millis() as u64,
                );
            }
            enhanced.to_string()
        }
        None => {
            warn!("Structure enhancement returned nothing, keeping input text");
            if let Some(obs) = observer {
                obs.on_stage_fallback(Stage::Enhance, "empty or failed completion");
            }
            text.to_string()
        }
    }
}

/// Extract key information from `text`.
///
/// Word count, character count, and reading time are computed locally and
/// are always present; the model's analysis is attached when the call
/// succeeds, otherwise `error` says why it is missing.
pub async fn extract_key_information(
    client: &Arc<dyn CompletionClient>,
    text: &str,
    observer: Option<&Observer>,
) -> KeyInformation {
    if text.trim().is_empty() {
        return KeyInformation::default();
    }

    let word_count = text.split_whitespace().count();
    let mut info = KeyInformation {
        analysis: None,
        word_count,
        character_count: text.chars().count(),
        estimated_reading_minutes: word_count / READING_WPM,
        error: None,
    };

    let start = Instant::now();
    if let Some(obs) = observer {
        obs.on_stage_start(Stage::Extract);
    }

    let prompt = prompts::key_information_prompt(text);
    let reply = client.complete(&prompt, prompts::ANALYSIS_GUIDE).await;

    match reply_text(&reply) {
        Some(analysis) => {
            debug!("Key information extraction complete");
            if let Some(obs) = observer {
                obs.on_stage_complete(
                    Stage::Extract,
                    analysis.len(),
                    start.elapsed().as_millis() as u64,
                );
            }
            info.analysis = Some(analysis.to_string());
        }
        None => {
            warn!("Key information extraction returned nothing");
            if let Some(obs) = observer {
                obs.on_stage_fallback(Stage::Extract, "empty or failed completion");
            }
            info.error = Some("key information extraction failed".to_string());
        }
    }

    info
}
