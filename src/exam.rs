//! Mock-exam synthesis: generate a question batch via the completion
//! service, render it deterministically into a LaTeX exam document.
//!
//! The synthesizer moves through a small state machine:
//!
//! ```text
//! ExamSpec ──▶ generate ──▶ ExamBatch::Generated(questions) ──▶ render ──▶ LaTeX
//!                   └──────▶ ExamBatch::Failed(parse error)  ──▶ render ──▶ error-marked LaTeX
//! ```
//!
//! Generation is the only model call; rendering is pure. The model is
//! instructed to emit a strict JSON array and nothing else — the rendered
//! document is built entirely locally, so layout never depends on how the
//! model felt about LaTeX that day. Unparseable output degrades to a
//! visibly error-marked placeholder document rather than a panic, keeping
//! the raw reply inspectable.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::client::{reply_text, CompletionClient};
use crate::error::ScantexError;
use crate::observe::{Observer, Stage};
use crate::prompts;

// ── Question model ───────────────────────────────────────────────────────

/// How a question expects to be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    SingleChoice,
    FreeText,
}

impl QuestionKind {
    /// Whether this kind renders an options list.
    pub fn has_choices(self) -> bool {
        matches!(self, QuestionKind::MultipleChoice | QuestionKind::SingleChoice)
    }
}

/// The cognitive skill a question targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Memory,
    Interpretation,
    Transfer,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskType::Memory => "memory",
            TaskType::Interpretation => "interpretation",
            TaskType::Transfer => "transfer",
        };
        f.write_str(s)
    }
}

/// One exam item, matching the JSON schema pinned in the generation prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "question")]
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    /// Present only for choice kinds; order is the display order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
    /// Expected or reference answer.
    pub answer: String,
    /// 1 (easy) to 5 (very difficult).
    pub difficulty: u8,
    pub task_type: TaskType,
}

/// Parameters for one exam-generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamSpec {
    /// Exact number of questions to generate.
    pub total_questions: usize,
    /// Percentage split per difficulty level 1..=5; must sum to 100.
    pub difficulty_distribution: [u32; 5],
    /// Percentage split for memory/interpretation/transfer; must sum to 100.
    pub task_distribution: [u32; 3],
}

impl ExamSpec {
    /// Validate the distribution sums and question count.
    pub fn validate(&self) -> Result<(), ScantexError> {
        if self.total_questions == 0 {
            return Err(ScantexError::InvalidConfig(
                "total_questions must be ≥ 1".into(),
            ));
        }
        let dsum: u32 = self.difficulty_distribution.iter().sum();
        if dsum != 100 {
            return Err(ScantexError::InvalidConfig(format!(
                "difficulty_distribution must sum to 100, got {dsum}"
            )));
        }
        let tsum: u32 = self.task_distribution.iter().sum();
        if tsum != 100 {
            return Err(ScantexError::InvalidConfig(format!(
                "task_distribution must sum to 100, got {tsum}"
            )));
        }
        Ok(())
    }
}

impl Default for ExamSpec {
    fn default() -> Self {
        Self {
            total_questions: 10,
            difficulty_distribution: [25, 25, 25, 15, 10],
            task_distribution: [30, 40, 30],
        }
    }
}

// ── Distribution reconciliation ──────────────────────────────────────────

/// Turn a percentage split into exact per-category counts summing to
/// `total`.
///
/// Floors every ideal share, then hands the leftover questions one each to
/// the categories that lost the largest fractional part (ties broken by
/// larger percentage, then lower index). Every count ends within 1 of its
/// ideal share and the sum is exactly `total`.
pub fn reconcile_distribution(total: usize, percents: &[u32]) -> Vec<usize> {
    debug_assert_eq!(percents.iter().sum::<u32>(), 100);

    let mut counts: Vec<usize> = percents
        .iter()
        .map(|&p| total * p as usize / 100)
        .collect();
    let mut remainder = total - counts.iter().sum::<usize>();

    let mut order: Vec<usize> = (0..percents.len()).collect();
    order.sort_by_key(|&i| {
        let fractional = (total * percents[i] as usize) % 100;
        std::cmp::Reverse((fractional, percents[i] as usize))
    });

    for &i in &order {
        if remainder == 0 {
            break;
        }
        counts[i] += 1;
        remainder -= 1;
    }
    counts
}

// ── Batch parsing ────────────────────────────────────────────────────────

/// Why a model reply could not become a question batch.
#[derive(Debug, Error)]
pub enum QuestionParseError {
    #[error("completion failed or returned nothing")]
    EmptyReply,
    #[error("reply was not a JSON question array: {0}")]
    InvalidJson(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BatchShape {
    Bare(Vec<Question>),
    Wrapped { questions: Vec<Question> },
}

/// Parse a model reply into a question batch.
///
/// Tolerates a markdown code fence around the JSON and both the bare-array
/// and `{"questions": […]}` shapes; anything else is a typed error, never
/// a panic.
pub fn parse_question_batch(raw: &str) -> Result<Vec<Question>, QuestionParseError> {
    let trimmed = strip_json_fences(raw);
    if trimmed.is_empty() {
        return Err(QuestionParseError::EmptyReply);
    }
    match serde_json::from_str::<BatchShape>(trimmed) {
        Ok(BatchShape::Bare(questions)) | Ok(BatchShape::Wrapped { questions }) => Ok(questions),
        Err(e) => Err(QuestionParseError::InvalidJson(e.to_string())),
    }
}

fn strip_json_fences(raw: &str) -> &str {
    let s = raw.trim();
    let s = s
        .strip_prefix("```json")
        .or_else(|| s.strip_prefix("```"))
        .unwrap_or(s);
    let s = s.strip_suffix("```").unwrap_or(s);
    s.trim()
}

// ── The synthesizer ──────────────────────────────────────────────────────

/// Result of one generation request.
#[derive(Debug, Clone)]
pub enum ExamBatch {
    /// The model produced a parseable question batch.
    Generated(Vec<Question>),
    /// The reply could not be parsed; `raw` is kept for inspection.
    Failed { detail: String, raw: String },
}

impl ExamBatch {
    /// Render this batch into a LaTeX exam document.
    ///
    /// A failed batch renders the error-marked placeholder so callers can
    /// still inspect what the model actually said.
    pub fn render(&self, title: &str, author: &str) -> String {
        match self {
            ExamBatch::Generated(questions) => render_exam(questions, title, author),
            ExamBatch::Failed { detail, raw } => {
                format!("% Error: could not parse questions JSON ({detail})\n{raw}")
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ExamBatch::Failed { .. })
    }
}

/// Exam generation and answer evaluation over a shared completion client.
pub struct ExamSynthesizer {
    client: Arc<dyn CompletionClient>,
    observer: Option<Observer>,
}

impl ExamSynthesizer {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Generate a question batch for `source_text` (or topics) under the
    /// requested distributions.
    ///
    /// # Errors
    /// Only for an invalid `spec`; model and parse failures surface as
    /// [`ExamBatch::Failed`].
    pub async fn generate(
        &self,
        source_text: &str,
        spec: &ExamSpec,
    ) -> Result<ExamBatch, ScantexError> {
        spec.validate()?;

        let start = std::time::Instant::now();
        if let Some(obs) = &self.observer {
            obs.on_stage_start(Stage::ExamGenerate);
        }

        let prompt = prompts::exam_prompt(
            source_text,
            spec.total_questions,
            &spec.difficulty_distribution,
            &spec.task_distribution,
        );
        let reply = self.client.complete(&prompt, prompts::EXAM_CREATOR).await;

        let batch = match reply_text(&reply) {
            None => ExamBatch::Failed {
                detail: "completion failed or returned nothing".into(),
                raw: reply,
            },
            Some(content) => match parse_question_batch(content) {
                Ok(questions) => {
                    debug!("Generated {} questions", questions.len());
                    ExamBatch::Generated(questions)
                }
                Err(e) => {
                    warn!("Question batch did not parse: {e}");
                    ExamBatch::Failed {
                        detail: e.to_string(),
                        raw: content.to_string(),
                    }
                }
            },
        };

        if let Some(obs) = &self.observer {
            match &batch {
                ExamBatch::Generated(qs) => obs.on_stage_complete(
                    Stage::ExamGenerate,
                    qs.len(),
                    start.elapsed().as_millis() as u64,
                ),
                ExamBatch::Failed { detail, .. } => {
                    obs.on_stage_fallback(Stage::ExamGenerate, detail)
                }
            }
        }

        Ok(batch)
    }

    /// Score a user's answer against the reference answer.
    ///
    /// Returns the model's reply verbatim (the fixed rubric requests a
    /// JSON result shape); the caller parses or displays it. Like every
    /// completion, the reply may be error-tagged — check it with
    /// [`crate::client::reply_text`].
    pub async fn evaluate_answer(
        &self,
        question: &str,
        expected_answer: &str,
        user_answer: &str,
    ) -> String {
        let prompt = prompts::evaluation_prompt(question, expected_answer, user_answer);
        self.client.complete(&prompt, prompts::EXAM_EVALUATOR).await
    }
}

// ── Deterministic rendering ──────────────────────────────────────────────

/// Badge for a difficulty level: 1–2 easy, 3–4 medium, 5 hard.
fn difficulty_badge(level: u8) -> &'static str {
    match level {
        1 | 2 => "\\badge{easy}{Easy}",
        3 | 4 => "\\badge{medium}{Medium}",
        5 => "\\badge{hard}{Hard}",
        _ => "",
    }
}

/// Render a question batch into a complete LaTeX exam document.
///
/// Pure and deterministic: one `\section*` per question in input order,
/// lettered options for choice kinds, a ruled writing area for free text,
/// and the reference answer last.
pub fn render_exam(questions: &[Question], title: &str, author: &str) -> String {
    let mut latex: Vec<String> = vec![
        r"\documentclass[12pt]{article}".into(),
        r"\usepackage[utf8]{inputenc}".into(),
        r"\usepackage{enumitem}".into(),
        r"\usepackage{tcolorbox}".into(),
        r"\usepackage{geometry}".into(),
        r"\geometry{margin=1in}".into(),
        r"\usepackage{xcolor}".into(),
        r"\definecolor{easy}{HTML}{DFF0D8}".into(),
        r"\definecolor{medium}{HTML}{FCF8E3}".into(),
        r"\definecolor{hard}{HTML}{F2DEDE}".into(),
        r"\newcommand{\badge}[2]{\fcolorbox{#1}{#1}{\textbf{#2}}}".into(),
        r"\begin{document}".into(),
        format!(
            "\\begin{{center}}\\Huge\\textbf{{{title}}}\\\\[1ex]\\large {author}\\\\[2ex]\\normalsize\\today\\end{{center}}"
        ),
        r"\vspace{1em}".into(),
        r"\begin{tcolorbox}[colback=blue!5!white,colframe=blue!80!black,title=Instructions]".into(),
        "Answer all questions. For multiple choice, circle the correct option. \
         For free text, write your answer in the space provided."
            .into(),
        r"\end{tcolorbox}".into(),
        String::new(),
    ];

    for (i, q) in questions.iter().enumerate() {
        latex.push(format!("\\section*{{Question {}}}", i + 1));
        latex.push(q.text.clone());
        latex.push(format!("\\textit{{Task type:}} {} ", q.task_type));
        latex.push(difficulty_badge(q.difficulty).to_string());
        if q.kind.has_choices() && !q.choices.is_empty() {
            latex.push(r"\begin{enumerate}[label=\Alph*.]".into());
            for choice in &q.choices {
                latex.push(format!("  \\item {choice}"));
            }
            latex.push(r"\end{enumerate}".into());
        } else if q.kind == QuestionKind::FreeText {
            latex.push(r"\vspace{2em}".into());
            latex.push(r"\noindent\rule{\textwidth}{0.4pt}".into());
            latex.push(r"\vspace{2em}".into());
        }
        latex.push(format!("\\textbf{{Answer:}} {}", q.answer));
        latex.push(String::new());
    }

    latex.push(r"\end{document}".into());
    latex.join("\n")
}
