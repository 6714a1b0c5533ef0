//! LaTeX generation: structural validation, deterministic post-processing,
//! and a network-free fallback document.
//!
//! ## Why post-processing is necessary
//!
//! Even well-prompted models occasionally wrap the document in markdown
//! fences, echo a stray wrapper line before `\documentclass`, or leak
//! invisible Unicode into the output. The rules here are cheap,
//! deterministic string passes that fix model quirks without touching
//! content — the prompt stays focused on *what to produce*, not on
//! formatting edge-cases. Each rule is independently testable.
//!
//! ## The fallback ladder
//!
//! A reply that is missing any of the three structural markers after
//! post-processing is discarded entirely. The stage then builds a valid
//! document itself: pinned preamble, optional title block, optional
//! category heading, and the input text run through [`escape_latex`]. That
//! construction cannot fail and makes no external calls, so the stage
//! upholds its invariant — the returned document always validates.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::client::{reply_text, CompletionClient};
use crate::observe::{Observer, Stage};
use crate::output::FormatOutcome;
use crate::prompts::{self, LATEX_PREAMBLE};

/// Convert corrected text into a complete LaTeX document.
///
/// `context` selects the context-aware prompt variant; passing `None`
/// gives the legacy variant. Both share validation, post-processing, and
/// fallback behaviour. Empty input yields the minimal "Empty Document"
/// placeholder without a completion call.
pub async fn format(
    client: &Arc<dyn CompletionClient>,
    text: &str,
    context: Option<&str>,
    title: Option<&str>,
    category: Option<&str>,
    remarks: Option<&str>,
    observer: Option<&Observer>,
) -> FormatOutcome {
    if text.trim().is_empty() {
        warn!("No text provided for LaTeX generation");
        return FormatOutcome::EmptyInput(empty_document(title));
    }

    let start = Instant::now();
    if let Some(obs) = observer {
        obs.on_stage_start(Stage::Format);
    }
    debug!("Generating LaTeX for text of length {}", text.len());

    let prompt = prompts::latex_prompt(text, context, title, category, remarks);
    let reply = client.complete(&prompt, prompts::LATEX_FORMATTER).await;

    let fallback = |reason: &str| {
        warn!("LaTeX generation degraded ({reason}), building fallback document");
        if let Some(obs) = observer {
            obs.on_stage_fallback(Stage::Format, reason);
        }
        FormatOutcome::Fallback(fallback_document(text, title, category))
    };

    match reply_text(&reply) {
        None => fallback("empty or failed completion"),
        Some(content) => {
            let document = postprocess(content);
            if validate_structure(&document) {
                debug!("LaTeX generation complete, {} chars", document.len());
                if let Some(obs) = observer {
                    obs.on_stage_complete(
                        Stage::Format,
                        document.len(),
                        start.elapsed().as_millis() as u64,
                    );
                }
                FormatOutcome::Generated(document)
            } else {
                fallback("structural validation failed")
            }
        }
    }
}

// ── Post-processing ──────────────────────────────────────────────────────

/// Apply the deterministic cleanup passes to a raw model reply.
///
/// Rules (applied in order):
/// 1. Strip outer markdown code fences
/// 2. Trim surrounding whitespace
/// 3. Remove invisible/undecodable characters
/// 4. If the result has more than 2 lines, drop the first and last line
///    (the wrapper line models tend to add or echo)
pub fn postprocess(input: &str) -> String {
    let s = strip_code_fences(input);
    let s = s.trim();
    let s = remove_invisible_chars(s);
    trim_wrapper_lines(&s)
}

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:latex|tex)?\n(.*)\n```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FFFD}',
        ],
        "",
    )
}

/// Drop the first and last line of a document with more than two lines.
///
/// Documents of two lines or fewer pass through unchanged.
fn trim_wrapper_lines(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    if lines.len() > 2 {
        lines[1..lines.len() - 1].join("\n")
    } else {
        input.to_string()
    }
}

// ── Validation ───────────────────────────────────────────────────────────

/// The three markers every usable document must contain.
const REQUIRED_MARKERS: [&str; 3] = [r"\documentclass", r"\begin{document}", r"\end{document}"];

/// Check the minimal document structure.
pub fn validate_structure(latex: &str) -> bool {
    REQUIRED_MARKERS.iter().all(|m| latex.contains(m))
}

// ── Fallback construction ────────────────────────────────────────────────

fn title_block(title: &str) -> String {
    format!(
        "\\title{{{}}}\n\\author{{scantex}}\n\\date{{\\today}}\n\\maketitle\n\n",
        escape_latex(title)
    )
}

/// Build the deterministic fallback document from the input text.
///
/// Always structurally valid; makes no external calls.
pub fn fallback_document(text: &str, title: Option<&str>, category: Option<&str>) -> String {
    let title_section = title
        .filter(|t| !t.trim().is_empty())
        .map(|t| title_block(t.trim()))
        .unwrap_or_default();

    let category_section = category
        .filter(|c| !c.trim().is_empty())
        .map(|c| format!("\\section*{{Category: {}}}\n\n", escape_latex(c.trim())))
        .unwrap_or_default();

    format!(
        "{LATEX_PREAMBLE}\n\n\\begin{{document}}\n\n{title_section}{category_section}{}\n\n\\end{{document}}\n",
        escape_latex(text)
    )
}

/// Build the minimal placeholder for empty input.
pub fn empty_document(title: Option<&str>) -> String {
    let title_section = title
        .filter(|t| !t.trim().is_empty())
        .map(|t| title_block(t.trim()))
        .unwrap_or_default();

    format!(
        "{LATEX_PREAMBLE}\n\n\\begin{{document}}\n\n{title_section}\\section{{Empty Document}}\n\n\
         No content was provided for processing.\n\n\\end{{document}}\n"
    )
}

// ── Character escaping ───────────────────────────────────────────────────

// Bare exponent/subscript runs like "^2", "_i", or "_2^3". Wrapped in
// inline math before literal escaping so they don't become the
// "Missing $ inserted" compiler error class.
static RE_BARE_MATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\^\d+|_[A-Za-z0-9]+)+").unwrap());

/// Escape text for safe use outside math mode.
///
/// Two passes in a fixed order: first, bare exponent/subscript runs that
/// are not already adjacent to a `$` delimiter are wrapped in inline math
/// (keeping their `^`/`_` live); then every remaining LaTeX special
/// character is escaped exactly once. Running the passes the other way
/// round would escape the carets before they could be recognised as math.
pub fn escape_latex(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut last = 0;

    for m in RE_BARE_MATH.find_iter(text) {
        let before = text[..m.start()].chars().next_back();
        let after = text[m.end()..].chars().next();
        // Already delimited math is left to the literal pass.
        if before == Some('$') || after == Some('$') {
            continue;
        }
        out.push_str(&escape_literals(&text[last..m.start()]));
        out.push('$');
        out.push_str(m.as_str());
        out.push('$');
        last = m.end();
    }
    out.push_str(&escape_literals(&text[last..]));
    out
}

/// Escape each LaTeX special character, one pass, no re-scanning.
///
/// A single character walk cannot double-escape: replacement text is
/// appended to the output and never re-examined.
fn escape_literals(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str(r"\textbackslash{}"),
            '{' => out.push_str(r"\{"),
            '}' => out.push_str(r"\}"),
            '$' => out.push_str(r"\$"),
            '&' => out.push_str(r"\&"),
            '%' => out.push_str(r"\%"),
            '#' => out.push_str(r"\#"),
            '^' => out.push_str(r"\textasciicircum{}"),
            '_' => out.push_str(r"\_"),
            '~' => out.push_str(r"\textasciitilde{}"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        reply: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionClient for Counting {
        async fn complete(&self, _prompt: &str, _system: &str) -> String {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    fn counting(reply: &str) -> Arc<Counting> {
        Arc::new(Counting {
            reply: reply.into(),
            calls: AtomicUsize::new(0),
        })
    }

    // ── Post-processing rules ────────────────────────────────────────────

    #[test]
    fn strip_fences_with_language() {
        let input = "```latex\n\\documentclass{article}\nbody\n```";
        assert_eq!(strip_code_fences(input), "\\documentclass{article}\nbody");
    }

    #[test]
    fn strip_fences_passthrough_without_fences() {
        assert_eq!(strip_code_fences("plain"), "plain");
    }

    #[test]
    fn two_line_document_is_unchanged() {
        assert_eq!(trim_wrapper_lines("A\nB"), "A\nB");
        assert_eq!(trim_wrapper_lines("only"), "only");
    }

    #[test]
    fn four_line_document_loses_first_and_last() {
        assert_eq!(trim_wrapper_lines("A\nB\nC\nD"), "B\nC");
    }

    #[test]
    fn three_line_document_keeps_only_middle() {
        assert_eq!(trim_wrapper_lines("A\nB\nC"), "B");
    }

    #[test]
    fn invisible_chars_are_removed() {
        assert_eq!(
            remove_invisible_chars("a\u{200B}b\u{FEFF}c\u{FFFD}d"),
            "abcd"
        );
    }

    #[test]
    fn validate_requires_all_three_markers() {
        assert!(validate_structure(
            "\\documentclass{article}\n\\begin{document}\nx\n\\end{document}"
        ));
        assert!(!validate_structure("\\documentclass{article}\nx"));
        assert!(!validate_structure(""));
    }

    // ── Escaping ─────────────────────────────────────────────────────────

    #[test]
    fn bare_exponent_and_subscript_are_math_wrapped() {
        assert_eq!(escape_latex("x^2"), "x$^2$");
        assert_eq!(escape_latex("a_i"), "a$_i$");
        // A combined run wraps as one fragment.
        assert_eq!(escape_latex("_2^3"), "$_2^3$");
    }

    #[test]
    fn literal_specials_escape_exactly_once() {
        assert_eq!(escape_latex("50% & #1 $5"), r"50\% \& \#1 \$5");
    }

    #[test]
    fn caret_without_digits_is_literal_escaped() {
        assert_eq!(escape_latex("a ^ b"), r"a \textasciicircum{} b");
    }

    #[test]
    fn already_delimited_math_is_not_rewrapped() {
        // The run adjacent to a $ is handled by the literal pass only;
        // no second pair of delimiters is inserted around it.
        let out = escape_latex("$x^2$");
        assert!(!out.contains("$$"), "got: {out}");
    }

    #[test]
    fn backslash_escape_is_not_rescanned() {
        // The braces inserted by \textbackslash{} must not themselves be escaped.
        assert_eq!(escape_latex(r"\"), r"\textbackslash{}");
    }

    // ── Fallback construction ────────────────────────────────────────────

    #[test]
    fn fallback_document_always_validates() {
        let doc = fallback_document("any old garbage % & _", None, None);
        assert!(validate_structure(&doc));
        assert!(doc.contains(r"\%"));
    }

    #[test]
    fn fallback_title_math_wraps_before_escaping() {
        let doc = fallback_document("body", Some("Measurement _2^3"), None);
        assert!(doc.contains("$_2^3$"), "got: {doc}");
        assert!(doc.contains(r"\maketitle"));
    }

    #[test]
    fn fallback_renders_category_heading() {
        let doc = fallback_document("body", None, Some("Physics"));
        assert!(doc.contains(r"\section*{Category: Physics}"));
    }

    #[test]
    fn empty_document_contains_marker_section() {
        let doc = empty_document(None);
        assert!(validate_structure(&doc));
        assert!(doc.contains(r"\section{Empty Document}"));
    }

    // ── Stage behaviour ──────────────────────────────────────────────────

    #[tokio::test]
    async fn garbage_reply_triggers_valid_fallback() {
        let inner = counting("this is not latex at all");
        let client: Arc<dyn CompletionClient> = inner.clone();
        let outcome = format(&client, "the text", None, None, None, None, None).await;
        assert!(outcome.is_fallback());
        assert!(validate_structure(outcome.latex()));
        assert!(outcome.latex().contains("the text"));
    }

    #[tokio::test]
    async fn valid_reply_survives_wrapper_trim() {
        // The model echoes a wrapper line before and after the document;
        // post-processing removes exactly those.
        let reply = "Here is your document:\n\\documentclass{article}\n\\begin{document}\nHello\n\\end{document}\ntrailing note";
        let inner = counting(reply);
        let client: Arc<dyn CompletionClient> = inner.clone();
        let outcome = format(&client, "hello", None, None, None, None, None).await;
        match outcome {
            FormatOutcome::Generated(doc) => {
                assert!(validate_structure(&doc));
                assert!(doc.starts_with("\\documentclass"));
                assert!(doc.ends_with("\\end{document}"));
            }
            other => panic!("expected Generated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_input_returns_placeholder_without_a_call() {
        let inner = counting("should never be used");
        let client: Arc<dyn CompletionClient> = inner.clone();
        let outcome = format(&client, "  ", None, None, None, None, None).await;
        match &outcome {
            FormatOutcome::EmptyInput(doc) => {
                assert!(doc.contains("Empty Document"));
                assert!(validate_structure(doc));
            }
            other => panic!("expected EmptyInput, got {other:?}"),
        }
        assert_eq!(inner.calls.load(Ordering::SeqCst), 0);
    }
}
