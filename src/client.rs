//! Completion-service boundary: build chat requests, retry transient
//! failures, and extract the user-facing answer.
//!
//! This module is intentionally thin on prompt content — all prompt
//! engineering lives in [`crate::prompts`] so it can change without
//! touching retry or parsing logic here.
//!
//! ## Failure contract
//!
//! [`CompletionClient::complete`] never fails with an `Err`. When the
//! upstream service is unreachable after all retries, it returns a string
//! prefixed with [`ERROR_PREFIX`]. Every pipeline stage funnels replies
//! through [`reply_text`], which maps both the error tag and blank output
//! to `None`, so each stage's single emptiness check doubles as its error
//! check and triggers that stage's own fallback.
//!
//! ## Retry strategy
//!
//! HTTP 429 / 5xx responses, connect errors, and timeouts are transient
//! and frequent under load. Exponential backoff (`retry_backoff_ms *
//! 2^attempt`) avoids thundering-herd: with 500 ms base and 3 retries the
//! wait sequence is 500 ms → 1 s → 2 s. Other 4xx statuses are permanent
//! (bad request, bad key) and are not retried.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::ScantexError;

/// Marker prefixing every irrecoverable-failure reply.
pub const ERROR_PREFIX: &str = "[error]";

/// Closing tag delimiting the upstream model's internal reasoning segment.
const THINK_CLOSE: &str = "</think>";

// ── Reply parsing ────────────────────────────────────────────────────────

/// Strip the reasoning segment from a raw completion.
///
/// The upstream service may embed its chain of thought as
/// `<think>…</think>` ahead of the actual answer. We split on the closing
/// tag and keep only the trailing user-facing text. Content without a
/// closing tag is returned unchanged — there is no reasoning segment to
/// discard.
pub fn strip_reasoning(content: &str) -> &str {
    match content.split_once(THINK_CLOSE) {
        Some((_, answer)) => answer.trim(),
        None => content.trim(),
    }
}

/// Interpret a completion reply, separating usable content from failure.
///
/// Returns `None` for error-tagged replies and for blank output; both mean
/// the caller must take its fallback path. This is the one place that
/// knows about the [`ERROR_PREFIX`] convention.
pub fn reply_text(reply: &str) -> Option<&str> {
    let trimmed = reply.trim();
    if trimmed.is_empty() || trimmed.starts_with(ERROR_PREFIX) {
        None
    } else {
        Some(trimmed)
    }
}

/// Pull the primary content string out of a chat-completion response body.
///
/// Handles the standard chat shape (`choices[0].message.content`) plus the
/// flat `text`/`response`/`output` shapes some gateways return. `None`
/// means the body carried no recognisable content at all.
fn extract_content(body: &Value) -> Option<String> {
    if let Some(choices) = body.get("choices").and_then(Value::as_array) {
        if let Some(first) = choices.first() {
            let message = first.get("message").or_else(|| first.get("delta"));
            if let Some(content) = message
                .and_then(|m| m.get("content"))
                .and_then(Value::as_str)
            {
                return Some(content.to_string());
            }
        }
    }
    for key in ["text", "response", "output"] {
        if let Some(s) = body.get(key).and_then(Value::as_str) {
            return Some(s.to_string());
        }
    }
    None
}

// ── Supporting-info payload ──────────────────────────────────────────────

/// One ranked snippet from a retrieval collaborator.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Snippet {
    /// Where the snippet came from (file path, archive entry, URL).
    pub source: String,
    /// The snippet text itself.
    pub content: String,
}

/// A retrieval collaborator that can answer a free-text query.
///
/// Consumed, never implemented here: the pipeline only folds the returned
/// snippets into the prompt. Implementations wrap whatever index the host
/// application maintains.
pub trait Searchable: Send + Sync {
    fn search(&self, query: &str) -> Vec<Snippet>;
}

/// Auxiliary context attached to a completion request.
///
/// Each variant has exactly one serialisation rule, so callers can hand in
/// whatever they have without the client guessing at shapes.
#[derive(Clone, Default)]
pub enum InfoSource {
    /// No supporting info; the prompt goes out as-is.
    #[default]
    None,
    /// A pre-rendered block of text.
    RawText(String),
    /// Ranked snippets, rendered source-then-content.
    StructuredSnippets(Vec<Snippet>),
    /// A live retrieval collaborator, queried with the prompt itself.
    Searchable(Arc<dyn Searchable>),
}

impl std::fmt::Debug for InfoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InfoSource::None => write!(f, "InfoSource::None"),
            InfoSource::RawText(s) => write!(f, "InfoSource::RawText({} chars)", s.len()),
            InfoSource::StructuredSnippets(v) => {
                write!(f, "InfoSource::StructuredSnippets({} snippets)", v.len())
            }
            InfoSource::Searchable(_) => write!(f, "InfoSource::Searchable(<dyn>)"),
        }
    }
}

impl InfoSource {
    /// Render the info payload to prompt text, truncated to `budget` chars.
    ///
    /// `query` is only consulted by the [`InfoSource::Searchable`] variant.
    /// Returns `None` when there is nothing worth appending.
    pub fn to_prompt_text(&self, query: &str, budget: usize) -> Option<String> {
        let rendered = match self {
            InfoSource::None => return None,
            InfoSource::RawText(s) => {
                if s.trim().is_empty() {
                    return None;
                }
                s.clone()
            }
            InfoSource::StructuredSnippets(snippets) => render_snippets(snippets)?,
            InfoSource::Searchable(searcher) => render_snippets(&searcher.search(query))?,
        };
        Some(truncate_chars(&rendered, budget))
    }
}

fn render_snippets(snippets: &[Snippet]) -> Option<String> {
    if snippets.is_empty() {
        return None;
    }
    Some(
        snippets
            .iter()
            .map(|s| format!("Source: {}\n{}", s.source, s.content))
            .collect::<Vec<_>>()
            .join("\n\n"),
    )
}

/// Truncate to at most `budget` characters without splitting a codepoint.
fn truncate_chars(s: &str, budget: usize) -> String {
    match s.char_indices().nth(budget) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

// ── The client trait ─────────────────────────────────────────────────────

/// Boundary to the external text-completion service.
///
/// Implementations must uphold the failure contract: never return `Err`,
/// tag irrecoverable failures with [`ERROR_PREFIX`] instead. Tests swap in
/// scripted implementations; production uses [`HttpCompletionClient`].
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send a prompt + system-instructions pair, return the user-facing
    /// answer with any reasoning segment already stripped.
    async fn complete(&self, prompt: &str, system: &str) -> String;

    /// Like [`complete`](Self::complete), with an auxiliary info payload
    /// appended to the prompt under a fixed "supporting info" framing.
    async fn complete_with_info(&self, prompt: &str, system: &str, info: &InfoSource) -> String {
        match info.to_prompt_text(prompt, DEFAULT_MAX_INFO_CHARS) {
            Some(rendered) => {
                let combined = format!(
                    "{}\n\nTo answer this prompt, the following info is provided:\n\n{}",
                    prompt.trim_end(),
                    rendered
                );
                self.complete(&combined, system).await
            }
            None => self.complete(prompt, system).await,
        }
    }
}

/// Character budget for the rendered info payload.
pub const DEFAULT_MAX_INFO_CHARS: usize = 2000;

// ── HTTP implementation ──────────────────────────────────────────────────

/// Connection settings for [`HttpCompletionClient`].
///
/// The endpoint and credential are injected here — the library never reads
/// them from the environment itself; the CLI shim does that once and passes
/// them in.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Chat-completions endpoint URL.
    pub endpoint: String,
    /// Bearer token, if the endpoint requires one.
    pub api_key: Option<String>,
    /// TCP connect timeout. Default: 5 s.
    pub connect_timeout: Duration,
    /// Full-response read timeout. Default: 20 s.
    pub read_timeout: Duration,
    /// Retry attempts on a transient failure. Default: 3.
    pub max_retries: u32,
    /// Initial backoff in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(20),
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

/// Production [`CompletionClient`] over HTTP.
///
/// Holds one `reqwest::Client` (a shared connection pool) for the life of
/// the client; the pool is stateless per request, so no locking is needed
/// across concurrent pipeline requests.
#[derive(Debug)]
pub struct HttpCompletionClient {
    http: reqwest::Client,
    config: CompletionConfig,
}

impl HttpCompletionClient {
    /// Build a client from explicit configuration.
    pub fn new(config: CompletionConfig) -> Result<Self, ScantexError> {
        if config.endpoint.trim().is_empty() {
            return Err(ScantexError::InvalidConfig(
                "Completion endpoint URL must not be empty".into(),
            ));
        }
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .build()
            .map_err(|e| ScantexError::ClientInit(e.to_string()))?;
        Ok(Self { http, config })
    }

    /// Whether an HTTP status warrants a retry.
    fn is_transient(status: reqwest::StatusCode) -> bool {
        matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
    }

    async fn send_once(&self, prompt: &str, system: &str) -> Result<String, TransientOrFatal> {
        let payload = json!({
            "messages": [
                { "role": "user", "content": prompt },
                { "role": "system", "content": system },
            ],
        });

        let mut request = self.http.post(&self.config.endpoint).json(&payload);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransientOrFatal::Transient(format!(
                    "Request timed out (connect {:?} / read {:?}): {e}",
                    self.config.connect_timeout, self.config.read_timeout
                ))
            } else if e.is_connect() {
                TransientOrFatal::Transient(format!(
                    "Connection error: {e}. Check network/proxy/firewall."
                ))
            } else {
                TransientOrFatal::Fatal(format!("Unexpected error during request: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = truncate_chars(&body, 500);
            let detail = format!("HTTP error: {status}. Body: {body}");
            return Err(if Self::is_transient(status) {
                TransientOrFatal::Transient(detail)
            } else {
                TransientOrFatal::Fatal(detail)
            });
        }

        let body: Value = response.json().await.map_err(|e| {
            TransientOrFatal::Fatal(format!("Response was not valid JSON: {e}"))
        })?;

        match extract_content(&body) {
            Some(content) => Ok(strip_reasoning(&content).to_string()),
            None => Err(TransientOrFatal::Fatal(
                "Response carried no content field".into(),
            )),
        }
    }
}

/// Internal retry classification for a single request attempt.
enum TransientOrFatal {
    Transient(String),
    Fatal(String),
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, prompt: &str, system: &str) -> String {
        let mut last_err = String::new();

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = self.config.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "Completion retry {}/{} after {}ms",
                    attempt, self.config.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.send_once(prompt, system).await {
                Ok(answer) => {
                    debug!(
                        "Completion ok: {} prompt chars, {} answer chars",
                        prompt.len(),
                        answer.len()
                    );
                    return answer;
                }
                Err(TransientOrFatal::Transient(detail)) => {
                    warn!("Completion attempt {} failed: {}", attempt + 1, detail);
                    last_err = detail;
                }
                Err(TransientOrFatal::Fatal(detail)) => {
                    warn!("Completion failed permanently: {}", detail);
                    return format!("{ERROR_PREFIX} {detail}");
                }
            }
        }

        format!("{ERROR_PREFIX} {last_err}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_reasoning_keeps_trailing_answer() {
        assert_eq!(
            strip_reasoning("<think>reasoning</think> final answer"),
            "final answer"
        );
    }

    #[test]
    fn strip_reasoning_without_tag_returns_full_content() {
        assert_eq!(strip_reasoning("just an answer"), "just an answer");
        // An opening tag without a close is not a reasoning segment.
        assert_eq!(strip_reasoning("<think>half open"), "<think>half open");
    }

    #[test]
    fn reply_text_rejects_error_tag_and_blank() {
        assert_eq!(reply_text("[error] connection refused"), None);
        assert_eq!(reply_text("   "), None);
        assert_eq!(reply_text(""), None);
        assert_eq!(reply_text("  real content "), Some("real content"));
    }

    #[test]
    fn extract_content_chat_shape() {
        let body = json!({
            "choices": [{ "message": { "content": "hello" } }]
        });
        assert_eq!(extract_content(&body).as_deref(), Some("hello"));
    }

    #[test]
    fn extract_content_flat_shapes() {
        assert_eq!(
            extract_content(&json!({ "text": "a" })).as_deref(),
            Some("a")
        );
        assert_eq!(
            extract_content(&json!({ "response": "b" })).as_deref(),
            Some("b")
        );
        assert_eq!(extract_content(&json!({ "unrelated": 1 })), None);
    }

    #[test]
    fn info_none_renders_nothing() {
        assert!(InfoSource::None.to_prompt_text("q", 100).is_none());
        assert!(InfoSource::RawText("  ".into())
            .to_prompt_text("q", 100)
            .is_none());
        assert!(InfoSource::StructuredSnippets(vec![])
            .to_prompt_text("q", 100)
            .is_none());
    }

    #[test]
    fn info_snippets_render_source_then_content() {
        let info = InfoSource::StructuredSnippets(vec![
            Snippet {
                source: "notes.pdf".into(),
                content: "F = ma".into(),
            },
            Snippet {
                source: "wiki".into(),
                content: "Second law".into(),
            },
        ]);
        let text = info.to_prompt_text("q", 2000).unwrap();
        assert!(text.starts_with("Source: notes.pdf\nF = ma"));
        assert!(text.contains("Source: wiki"));
    }

    #[test]
    fn info_respects_char_budget() {
        let info = InfoSource::RawText("abcdef".repeat(1000));
        let text = info.to_prompt_text("q", 50).unwrap();
        assert_eq!(text.chars().count(), 50);
    }

    #[test]
    fn info_searchable_is_queried_with_the_prompt() {
        struct Echo;
        impl Searchable for Echo {
            fn search(&self, query: &str) -> Vec<Snippet> {
                vec![Snippet {
                    source: "echo".into(),
                    content: query.to_string(),
                }]
            }
        }
        let info = InfoSource::Searchable(Arc::new(Echo));
        let text = info.to_prompt_text("mass of Sirius B", 2000).unwrap();
        assert!(text.contains("mass of Sirius B"));
    }

    #[test]
    fn truncate_respects_multibyte_boundaries() {
        let s = "äöü".repeat(10);
        let t = truncate_chars(&s, 5);
        assert_eq!(t.chars().count(), 5);
    }

    #[test]
    fn empty_endpoint_is_rejected() {
        let err = HttpCompletionClient::new(CompletionConfig::default()).unwrap_err();
        assert!(matches!(err, ScantexError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn complete_with_info_appends_supporting_block() {
        use std::sync::Mutex;

        struct Capture {
            prompts: Mutex<Vec<String>>,
        }
        #[async_trait]
        impl CompletionClient for Capture {
            async fn complete(&self, prompt: &str, _system: &str) -> String {
                self.prompts.lock().unwrap().push(prompt.to_string());
                "ok".into()
            }
        }

        let client = Capture {
            prompts: Mutex::new(vec![]),
        };
        let info = InfoSource::RawText("supporting fact".into());
        client.complete_with_info("the prompt", "sys", &info).await;
        client
            .complete_with_info("the prompt", "sys", &InfoSource::None)
            .await;

        let prompts = client.prompts.lock().unwrap();
        assert!(prompts[0].contains("the following info is provided"));
        assert!(prompts[0].contains("supporting fact"));
        assert!(!prompts[1].contains("the following info is provided"));
    }
}
