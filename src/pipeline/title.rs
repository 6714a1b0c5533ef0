//! Title recommendation from corrected document text.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::client::{reply_text, CompletionClient};
use crate::observe::{Observer, Stage};
use crate::prompts;

/// Placeholder for empty input; no completion call is made.
pub const UNTITLED: &str = "Untitled Document";

/// Placeholder when the completion fails or returns nothing.
pub const FALLBACK_TITLE: &str = "Document Analysis";

/// Only this many leading characters of the text are sent, to bound
/// prompt size.
const SAMPLE_CHARS: usize = 2000;

/// Hard cap on the returned title length.
const MAX_TITLE_CHARS: usize = 100;

/// Recommend a concise title for `text`.
///
/// Uses only the first 2000 characters of the text for signal. The reply
/// is unquoted (one layer of surrounding single or double quotes) and
/// capped at 100 characters. Never fails — degraded paths return a fixed
/// placeholder.
pub async fn recommend_title(
    client: &Arc<dyn CompletionClient>,
    text: &str,
    observer: Option<&Observer>,
) -> String {
    if text.trim().is_empty() {
        warn!("No text provided for title recommendation");
        return UNTITLED.to_string();
    }

    let start = Instant::now();
    if let Some(obs) = observer {
        obs.on_stage_start(Stage::Title);
    }

    let sample = truncate_chars(text, SAMPLE_CHARS);
    let prompt = prompts::title_prompt(sample);
    let reply = client.complete(&prompt, prompts::TITLE_GUIDE).await;

    match reply_text(&reply) {
        Some(raw) => {
            let title = tidy_title(raw);
            if title.is_empty() {
                if let Some(obs) = observer {
                    obs.on_stage_fallback(Stage::Title, "reply reduced to nothing");
                }
                return FALLBACK_TITLE.to_string();
            }
            debug!("Recommended title: '{title}'");
            if let Some(obs) = observer {
                obs.on_stage_complete(Stage::Title, title.len(), start.elapsed().as_millis() as u64);
            }
            title
        }
        None => {
            warn!("Title recommendation failed or returned nothing");
            if let Some(obs) = observer {
                obs.on_stage_fallback(Stage::Title, "empty or failed completion");
            }
            FALLBACK_TITLE.to_string()
        }
    }
}

/// Strip one layer of surrounding quotes and cap the length.
fn tidy_title(raw: &str) -> String {
    let mut title = raw.trim();
    for quote in ['"', '\''] {
        if title.len() >= 2 && title.starts_with(quote) && title.ends_with(quote) {
            title = &title[1..title.len() - 1];
            break;
        }
    }
    truncate_chars(title, MAX_TITLE_CHARS).trim().to_string()
}

fn truncate_chars(s: &str, budget: usize) -> &str {
    match s.char_indices().nth(budget) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
