//! Integration tests for the document pipeline and exam synthesizer.
//!
//! Every test runs against a scripted completion client — no network, no
//! API keys. The scripts model the interesting upstream behaviours: clean
//! answers, reasoning-wrapped answers, garbage, and outright failure.

use async_trait::async_trait;
use scantex::{
    pipeline::format, reconcile_distribution, strip_reasoning, CleanOutcome, CompletionClient,
    DocumentPipeline, DocumentRequest, ExamSpec, ExamSynthesizer, FormatOutcome,
    PipelineObserver, ProcessingConfig, Stage,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test double ──────────────────────────────────────────────────────────────

/// Pops one scripted reply per call and counts calls; an exhausted script
/// behaves like a dead upstream (error-tagged reply).
struct ScriptedClient {
    replies: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    fn new<const N: usize>(replies: [&str; N]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, _prompt: &str, _system: &str) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "[error] upstream unavailable".to_string())
    }
}

fn pipeline(client: Arc<ScriptedClient>) -> DocumentPipeline {
    DocumentPipeline::new(client, ProcessingConfig::default())
}

/// Opt-in log output for debugging failing tests: RUST_LOG=debug cargo test
fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A structurally valid reply, wrapped the way models tend to wrap it:
/// one chatty line before the document and one after. Post-processing
/// drops exactly those two.
fn wrapped_document(body: &str) -> String {
    format!(
        "Here is the LaTeX document:\n\
         \\documentclass{{article}}\n\
         \\usepackage[utf8]{{inputenc}}\n\
         \\usepackage{{amsmath,amssymb}}\n\
         \\begin{{document}}\n\
         {body}\n\
         \\end{{document}}\n\
         Let me know if you need changes."
    )
}

fn assert_valid_latex(doc: &str, context: &str) {
    for marker in [r"\documentclass", r"\begin{document}", r"\end{document}"] {
        assert!(doc.contains(marker), "[{context}] missing {marker}: {doc}");
    }
}

// ── Fallback invariants ──────────────────────────────────────────────────────

/// Cleaning either returns the model's non-empty output or exactly the
/// original text — never empty, never something unrelated.
#[tokio::test]
async fn clean_fallback_invariant_under_total_failure() {
    let raw = "1,6N = m x , 2 — precious and irreplaceable";
    let client = ScriptedClient::new([]); // every call fails
    let out = pipeline(client)
        .process(raw, &DocumentRequest::default())
        .await
        .expect("degraded stages must not abort the request");

    assert!(out.normalized.is_fallback());
    assert_eq!(out.normalized.text(), raw);
    assert!(!out.normalized.text().is_empty());
}

/// The formatter's output always validates, even when the model returns
/// marker-free garbage.
#[tokio::test]
async fn format_structural_invariant_under_garbage_replies() {
    for garbage in [
        "total nonsense with no markers",
        "\\documentclass{article} but nothing else",
        "```latex\nstill not a document\n```",
    ] {
        let client = ScriptedClient::new(["ctx", "cleaned text", garbage, "Title"]);
        let out = pipeline(client)
            .process("raw text", &DocumentRequest::default())
            .await
            .unwrap();

        assert!(out.document.is_fallback(), "reply: {garbage:?}");
        assert_valid_latex(out.document.latex(), "garbage-reply");
        assert!(out.document.latex().contains("cleaned text"));
    }
}

// ── Post-processing boundary ─────────────────────────────────────────────────

#[test]
fn line_trim_leaves_two_line_document_unchanged() {
    assert_eq!(format::postprocess("A\nB"), "A\nB");
}

#[test]
fn line_trim_drops_first_and_last_of_four() {
    assert_eq!(format::postprocess("A\nB\nC\nD"), "B\nC");
}

// ── Distribution reconciliation ──────────────────────────────────────────────

#[test]
fn reconciliation_matches_total_and_rounding_bound() {
    let cases: &[(usize, Vec<u32>)] = &[
        (10, vec![25, 25, 25, 15, 10]),
        (7, vec![33, 33, 34]),
        (1, vec![20, 20, 20, 20, 20]),
        (13, vec![40, 30, 20, 5, 5]),
        (99, vec![30, 40, 30]),
    ];

    for (total, percents) in cases {
        let counts = reconcile_distribution(*total, percents);
        assert_eq!(
            counts.iter().sum::<usize>(),
            *total,
            "sum mismatch for {total} × {percents:?}"
        );
        for (i, &count) in counts.iter().enumerate() {
            let ideal = *total as f64 * percents[i] as f64 / 100.0;
            assert!(
                (count as f64 - ideal).abs() <= 1.0,
                "category {i} of {percents:?}: got {count}, ideal {ideal}"
            );
        }
    }
}

// ── Think-tag stripping ──────────────────────────────────────────────────────

#[test]
fn think_tag_is_stripped_from_replies() {
    assert_eq!(
        strip_reasoning("<think>reasoning</think> final answer"),
        "final answer"
    );
    assert_eq!(
        strip_reasoning("no reasoning segment here"),
        "no reasoning segment here"
    );
}

// ── Escaping boundary ────────────────────────────────────────────────────────

#[test]
fn escaping_wraps_math_fragments_and_escapes_specials_once() {
    let doc = format::fallback_document(
        "Costs rose 5% & item #3 was $5",
        Some("Measurement _2^3"),
        None,
    );

    // Title: the subscript/exponent run becomes inline math.
    assert!(doc.contains("$_2^3$"), "got: {doc}");

    // Body: each special escaped exactly once.
    assert!(doc.contains(r"5\% \& item \#3 was \$5"), "got: {doc}");
    assert!(!doc.contains(r"\\%"), "double-escaped percent: {doc}");
}

// ── End-to-end scenario ──────────────────────────────────────────────────────

/// The scanned-homework scenario: OCR mangles an equation, the model
/// corrects it, the formatter wraps it in a valid document.
#[tokio::test]
async fn end_to_end_corrects_ocr_noise_into_valid_document() {
    init_logs();
    let cleaned = r"1.6N = m \cdot x^2";
    let latex_reply = wrapped_document(r"Given: $1.6N = m \cdot x^2$");

    let client = ScriptedClient::new([
        "Physics homework in German, mechanics.", // analyze
        cleaned,                                  // clean
        &latex_reply,                             // format
        "Mechanics Homework",                     // title
    ]);
    let inner = Arc::clone(&client);

    let out = pipeline(client)
        .process("1,6N = m x , 2", &DocumentRequest::default())
        .await
        .unwrap();

    assert_eq!(out.normalized, CleanOutcome::Cleaned(cleaned.into()));
    match &out.document {
        FormatOutcome::Generated(doc) => {
            assert_valid_latex(doc, "e2e");
            assert!(doc.contains(r"1.6N = m \cdot x^2"));
            assert!(!doc.contains("x , 2"), "residual OCR artifact: {doc}");
        }
        other => panic!("expected Generated, got {other:?}"),
    }
    assert_eq!(out.recommended_title.as_deref(), Some("Mechanics Homework"));
    assert_eq!(inner.calls(), 4);
}

/// Reasoning segments in any reply are invisible to the pipeline.
#[tokio::test]
async fn reasoning_segments_never_leak_into_output() {
    struct ThinkingClient;

    #[async_trait]
    impl CompletionClient for ThinkingClient {
        async fn complete(&self, _prompt: &str, _system: &str) -> String {
            // A well-behaved client strips reasoning before returning;
            // model replies arrive here already split.
            strip_reasoning("<think>let me ponder</think> pondered answer").to_string()
        }
    }

    let client: Arc<dyn CompletionClient> = Arc::new(ThinkingClient);
    let pipeline = DocumentPipeline::new(client, ProcessingConfig::default());
    let out = pipeline
        .process("raw", &DocumentRequest::default())
        .await
        .unwrap();

    assert_eq!(out.normalized.text(), "pondered answer");
    assert!(!out.document.latex().contains("let me ponder"));
}

// ── Empty input ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_format_input_yields_placeholder_with_zero_calls() {
    let client = ScriptedClient::new(["never used"]);
    let inner = Arc::clone(&client);
    let client: Arc<dyn CompletionClient> = client;

    let outcome = format::format(&client, "", None, None, None, None, None).await;
    match outcome {
        FormatOutcome::EmptyInput(doc) => {
            assert_valid_latex(&doc, "empty-input");
            assert!(doc.contains("Empty Document"));
        }
        other => panic!("expected EmptyInput, got {other:?}"),
    }
    assert_eq!(inner.calls(), 0);
}

#[tokio::test]
async fn empty_source_text_is_the_only_hard_error() {
    let client = ScriptedClient::new([]);
    let err = pipeline(client)
        .process("", &DocumentRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, scantex::ScantexError::NothingToProcess));
}

// ── Exam pipeline ────────────────────────────────────────────────────────────

#[tokio::test]
async fn exam_generation_renders_deterministic_document() {
    let batch_json = r#"[
        {"question": "State F = ma.", "type": "free_text",
         "answer": "Newton's second law", "difficulty": 2, "task_type": "memory"},
        {"question": "Pick the force unit.", "type": "single_choice",
         "choices": ["Newton", "Joule"], "answer": "Newton",
         "difficulty": 5, "task_type": "transfer"}
    ]"#;

    let client = ScriptedClient::new([batch_json]);
    let synth = ExamSynthesizer::new(client);
    let batch = synth
        .generate("Newton's laws", &ExamSpec::default())
        .await
        .unwrap();

    let doc = batch.render("Physics Mock Exam", "scantex");
    assert_valid_latex(&doc, "exam");
    assert!(doc.contains(r"\section*{Question 1}"));
    assert!(doc.contains(r"\section*{Question 2}"));
    assert!(doc.contains(r"\badge{easy}{Easy}"));
    assert!(doc.contains(r"\badge{hard}{Hard}"));
    assert!(doc.contains(r"\item Newton"));
    assert!(doc.contains(r"\noindent\rule{\textwidth}{0.4pt}"));
    // Rendering twice gives byte-identical output.
    assert_eq!(doc, batch.render("Physics Mock Exam", "scantex"));
}

#[tokio::test]
async fn exam_parse_failure_yields_error_marked_document() {
    let client = ScriptedClient::new(["Sorry, I'd rather write prose."]);
    let synth = ExamSynthesizer::new(client);
    let batch = synth.generate("topic", &ExamSpec::default()).await.unwrap();

    assert!(batch.is_failed());
    let doc = batch.render("T", "A");
    assert!(doc.starts_with("% Error:"));
    assert!(doc.contains("Sorry, I'd rather write prose."));
}

// ── Observer wiring ──────────────────────────────────────────────────────────

#[tokio::test]
async fn observer_sees_completions_and_fallbacks() {
    #[derive(Default)]
    struct Recorder {
        completed: Mutex<Vec<Stage>>,
        fallbacks: Mutex<Vec<Stage>>,
    }

    impl PipelineObserver for Recorder {
        fn on_stage_complete(&self, stage: Stage, _len: usize, _ms: u64) {
            self.completed.lock().unwrap().push(stage);
        }
        fn on_stage_fallback(&self, stage: Stage, _reason: &str) {
            self.fallbacks.lock().unwrap().push(stage);
        }
    }

    let recorder = Arc::new(Recorder::default());
    let config = ProcessingConfig::builder()
        .observer(Arc::clone(&recorder) as Arc<dyn PipelineObserver>)
        .build()
        .unwrap();

    // Analysis and cleaning succeed; formatting gets garbage and degrades.
    let client = ScriptedClient::new(["ctx", "cleaned", "not latex", "Title"]);
    let pipeline = DocumentPipeline::new(client, config);
    pipeline
        .process("raw", &DocumentRequest::default())
        .await
        .unwrap();

    let completed = recorder.completed.lock().unwrap().clone();
    let fallbacks = recorder.fallbacks.lock().unwrap().clone();
    assert!(completed.contains(&Stage::Analyze));
    assert!(completed.contains(&Stage::Clean));
    assert!(completed.contains(&Stage::Title));
    assert_eq!(fallbacks, vec![Stage::Format]);
}
