//! Prompts for every LLM-backed stage of the pipeline.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing a stage's behaviour (adding a
//!    correction rule, tightening the LaTeX contract) requires editing
//!    exactly one place.
//!
//! 2. **Testability** — unit tests can inspect the exact prompt a stage
//!    would send without a live completion endpoint, making prompt
//!    regressions easy to catch.
//!
//! Builder functions return the complete user prompt for a stage; the
//! matching `*_GUIDE` constant is the system-instructions half of the
//! request. Prompts that risk hitting an upstream response cache embed a
//! per-call request token (see [`cache_buster`]).

use uuid::Uuid;

/// Short random token prepended to cacheable prompts.
///
/// Repeated requests with identical text would otherwise be served a
/// byte-identical cached reply by the upstream service; eight hex chars of
/// a v4 UUID are enough to make every call unique.
pub fn cache_buster() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

// ── Context analysis ─────────────────────────────────────────────────────

/// System instructions for the context-analysis stage.
pub const CONTEXT_ANALYST: &str = "\
You are an expert document analyzer. Your task is to quickly understand the \
context and type of academic documents.

Guidelines:
- Identify the subject area and document type
- Note key mathematical or scientific concepts
- Recognize structural patterns (homework problems, lecture notes, etc.)
- Assess the academic level and complexity
- Be concise but informative
- Focus on information that will improve OCR correction and LaTeX formatting";

/// Build the context-analysis prompt for a source text.
pub fn context_analysis_prompt(source_text: &str) -> String {
    format!(
        "[Request ID: {}] Analyze the following OCR text and provide context understanding:\n\n\
         Text to analyze:\n{source_text}\n\n\
         Please provide a brief analysis covering:\n\
         1. Document type (homework, exam, notes, research, etc.)\n\
         2. Subject area (math, physics, chemistry, literature, etc.)\n\
         3. Key topics or concepts mentioned\n\
         4. Mathematical content type (equations, calculations, proofs, etc.)\n\
         5. Language and academic level\n\
         6. Structural elements (titles, sections, exercises, etc.)\n\n\
         Provide a concise analysis in 2-3 sentences that will help improve \
         text cleaning and LaTeX formatting.",
        cache_buster()
    )
}

// ── Text cleaning ────────────────────────────────────────────────────────

/// System instructions for the OCR-correction stage.
pub const CLEANING_GUIDE: &str = r"You are an expert text corrector specialized in cleaning OCR-parsed documents.
Your task is to correct inaccuracies, misread characters, and structural errors in raw OCR text.

Guidelines:
- Detect the main language (e.g., German, English, or another) and use it consistently.
- Correct typical OCR mistakes:
  - Replace misread numbers or letters (e.g., '1,6N' vs '16N', 'O' vs '0').
  - Fix broken mathematical notation (e.g., '10°' → '10^', 'x , 2' → 'x^2').
  - Normalize spacing and punctuation.
- If a word, number, or symbol cannot be confidently inferred, keep it but mark it as `[UNCLEAR: ...]`.
- Do not translate the content into another language unless the OCR clearly switched incorrectly mid-text.
- Preserve the logical meaning and paragraph structure of the original text.
- Output only the corrected plain text. Do not add LaTeX, formatting, or explanations.
- Ensure the final text is coherent and readable.";

/// Build the cleaning prompt.
///
/// The context summary and user remarks, when present, are appended after
/// the text so domain-specific vocabulary and notation get corrected more
/// accurately.
pub fn cleaning_prompt(raw_text: &str, context: Option<&str>, remarks: Option<&str>) -> String {
    let mut prompt = format!(
        "[Request ID: {}] Please clean up the following OCR text. Do not add content by yourself. \
         Do not give any explanations. Just return the cleaned text.\n\n{raw_text}",
        cache_buster()
    );

    let mut appended = false;
    if let Some(ctx) = context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str("\n\nContext analysis: ");
        prompt.push_str(ctx.trim());
        appended = true;
    }
    if let Some(r) = remarks.filter(|r| !r.trim().is_empty()) {
        prompt.push_str("\nUser remarks: ");
        prompt.push_str(r.trim());
        appended = true;
    }
    if appended {
        prompt.push_str(
            "\n\nUse this context to make more accurate corrections, especially for technical \
             terms, mathematical notation, and subject-specific vocabulary.",
        );
    }

    prompt
}

// ── LaTeX generation ─────────────────────────────────────────────────────

/// The exact preamble the formatter pins in its prompt and the fallback
/// document reuses verbatim.
///
/// Keeping prompt and fallback on one constant guarantees the two paths
/// can never drift apart and produce documents with different package sets.
pub const LATEX_PREAMBLE: &str = r"\documentclass{article}
\usepackage[utf8]{inputenc}
\usepackage{amsmath,amssymb}
\usepackage{csquotes}
\usepackage{hyperref}
\usepackage{graphicx}
\usepackage{geometry}";

/// System instructions for the LaTeX-formatting stage.
pub const LATEX_FORMATTER: &str = r"You are an expert LaTeX formatter.
Your job is to transform messy OCR-parsed text into a clean, compilable LaTeX document.

Rules:
- Always output a complete LaTeX file with preamble, \begin{document}, and \end{document}.
- If the first line looks like a title, use \title{} and \maketitle.
- Headings/subheadings → \section{} / \subsection{}.
- Lists:
  - Lines starting with '-' or '•' → itemize.
  - Numbered lines (1., 2., a)) → enumerate.
- Mathematical expressions (e.g., x^2, a/b, ∑, ∫, <=, >=) → convert into LaTeX math mode ($...$ or \[...\]).
- Escape LaTeX special characters (% & _ # $ { }).
- If text is unreadable or uncertain, wrap it in \texttt{[UNCLEAR: ...]}.
- Preserve paragraph breaks.
- Do not explain. Output **only the LaTeX code**.
- Ensure the final output compiles without errors.";

/// Build the LaTeX-generation prompt.
///
/// `context` switches between the context-aware and the legacy variant;
/// both pin the same preamble and rule set, the context-aware variant
/// additionally tells the model what kind of document it is working on.
pub fn latex_prompt(
    text: &str,
    context: Option<&str>,
    title: Option<&str>,
    category: Option<&str>,
    remarks: Option<&str>,
) -> String {
    let mut prompt = format!(
        "[Request ID: {}] Please convert the OCR text into a clean, compilable LaTeX document.\n\n\
         Specific formatting rules:\n\
         - Use this preamble exactly:\n\n{LATEX_PREAMBLE}\n\n\
         - Insert \\title{{}}, \\author{{}} (if available), and \\date{{}} if the OCR text \
           contains them. Always add \\maketitle after \\begin{{document}}.\n\
         - Convert headings into \\section{{}} and \\subsection{{}}.\n\
         - Place each exercise or problem statement into its own subsection if possible.\n\
         - Format math cleanly using \\[ ... \\] for displayed equations and $...$ for inline math.\n\
         - Always use proper decimal notation: `1,234.56` (dot for decimals, comma for thousands).\n\
         - If the OCR produces strange fragments or broken characters, replace them with \
           \\texttt{{[UNCLEAR: ...]}} inside the text, not inside math mode.\n\
         - Escape LaTeX special characters (% & _ # $ {{ }}).\n\
         - Ensure equations are readable and consistent (e.g., \\frac for fractions, \
           \\cdot for multiplication).\n\
         - Only return the LaTeX code, no explanations.",
        cache_buster()
    );

    let mut extra = Vec::new();
    if let Some(t) = title.filter(|t| !t.trim().is_empty()) {
        extra.push(format!("Document title: {}", t.trim()));
    }
    if let Some(c) = category.filter(|c| !c.trim().is_empty()) {
        extra.push(format!("Document category: {}", c.trim()));
    }
    if let Some(r) = remarks.filter(|r| !r.trim().is_empty()) {
        extra.push(format!("User remarks: {}", r.trim()));
    }
    if !extra.is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(&extra.join("\n"));
    }

    if let Some(ctx) = context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str(&format!(
            "\n\nContext Analysis: {}\n\n\
             Use this context to make better formatting decisions and ensure mathematical \
             notation is appropriate for the subject area.",
            ctx.trim()
        ));
    }

    prompt.push_str("\n\nOCR Text:\n");
    prompt.push_str(text);
    prompt
}

// ── Title recommendation ─────────────────────────────────────────────────

/// System instructions for the title-recommendation stage.
pub const TITLE_GUIDE: &str = "\
You are an expert at creating document titles. Generate concise, professional \
titles that accurately reflect document content.

Guidelines:
- Maximum 8 words
- Clear and descriptive
- Captures main topic/subject
- Uses appropriate language (match document language)
- No unnecessary words or filler
- Output only the title, nothing else";

/// Build the title-recommendation prompt from a bounded text sample.
pub fn title_prompt(text_sample: &str) -> String {
    format!(
        "Based on the following document content, suggest a concise and descriptive \
         title (maximum 8 words).\n\n\
         Document content:\n{text_sample}\n\n\
         Please provide a title that:\n\
         - Captures the main topic or subject\n\
         - Is concise and professional\n\
         - Uses the same language as the document content\n\n\
         Respond with only the title, no explanations or additional text."
    )
}

// ── Structure enhancement ────────────────────────────────────────────────

/// System instructions for the best-effort structure-enhancement pass.
pub const STRUCTURE_GUIDE: &str = "\
You are a document structure expert. Your task is to improve the organization \
and readability of text while preserving all original content.

Guidelines:
- Add clear headings and subheadings where appropriate
- Organize content into logical sections
- Improve paragraph breaks and flow
- Maintain all original information
- Do not add new content, only reorganize existing content
- Output clean, well-structured text without LaTeX formatting";

/// Build the structure-enhancement prompt.
pub fn structure_prompt(text: &str, title: Option<&str>, category: Option<&str>) -> String {
    let mut context_info = Vec::new();
    if let Some(t) = title.filter(|t| !t.trim().is_empty()) {
        context_info.push(format!("Document title: {}", t.trim()));
    }
    if let Some(c) = category.filter(|c| !c.trim().is_empty()) {
        context_info.push(format!("Document category: {}", c.trim()));
    }
    let context_string = if context_info.is_empty() {
        "No additional context provided.".to_string()
    } else {
        context_info.join("\n")
    };

    format!(
        "Please enhance the structure and organization of the following document text.\n\n\
         {context_string}\n\n\
         Text to enhance:\n{text}\n\n\
         Please improve the text by:\n\
         - Adding appropriate headings and subheadings where logical\n\
         - Organizing content into coherent sections\n\
         - Maintaining all original content and meaning"
    )
}

// ── Key-information extraction ───────────────────────────────────────────

/// System instructions for the key-information pass.
pub const ANALYSIS_GUIDE: &str = "\
You are a document analysis expert. Extract key information from documents \
and provide structured summaries.

Guidelines:
- Identify the main topic and subject matter
- Extract key concepts, terms, and facts
- Determine document type and purpose
- List important dates, numbers, or references
- Be factual and objective
- Output in a clear, structured format";

/// Build the key-information prompt.
pub fn key_information_prompt(text: &str) -> String {
    format!(
        "Analyze the following document text and extract key information.\n\n\
         Text to analyze:\n{text}\n\n\
         Please provide the following information in a structured format:\n\
         - Main topic/subject\n\
         - Key concepts or terms\n\
         - Document type (academic, business, legal, etc.)\n\
         - Language\n\
         - Any important dates, numbers, or facts\n\
         - Summary (2-3 sentences)"
    )
}

// ── Exam generation ──────────────────────────────────────────────────────

/// System instructions for exam generation.
///
/// The question schema embedded here must stay in sync with
/// [`crate::exam::Question`]; the parser rejects anything else.
pub const EXAM_CREATOR: &str = r#"You are an exam creator.
Your task is to generate a mock exam in strict JSON format based on the topics and parameters provided by the user.

Rules:
1. Input sources:
   - Source text(s): parsed OCR text or reference material.
   - Extra topics: provided by the user without source text.

2. Question schema:
   Each question must follow this structure:
   {
     "question": "The question text",
     "type": "multiple_choice | single_choice | free_text",
     "choices": ["Option A", "Option B", "Option C"],
     "answer": "Correct answer or expected response",
     "difficulty": 1-5,
     "task_type": "memory | interpretation | transfer"
   }
   "choices" is present only for multiple_choice and single_choice.

3. Parameters (always provided by the user):
   - "total_questions": total number of questions to generate (integer).
   - "difficulty_distribution": percentage split for difficulty levels.
   - "task_distribution": percentage split for task types.
   Use these percentages to distribute the questions. If rounding is needed,
   keep the final total equal to "total_questions".

4. Question design:
   - If a topic has source text, design text-specific questions.
   - If a topic has no source text, design general knowledge questions.
   - Mix question formats (multiple_choice, single_choice, free_text).
   - If OCR text is unclear, infer from context; if impossible, mark "[UNCLEAR]".
   - Keep exam language consistent with user input.

5. Output:
   - A single JSON array of exactly "total_questions" question objects.
   - No commentary, no markdown, no surrounding text."#;

/// Build the exam-generation prompt.
pub fn exam_prompt(
    source_text: &str,
    total_questions: usize,
    difficulty_distribution: &[u32; 5],
    task_distribution: &[u32; 3],
) -> String {
    let source_block = if source_text.trim().is_empty() {
        "No source text provided — design questions from general knowledge of the topics."
            .to_string()
    } else {
        format!("Source text (parsed from OCR):\n{source_text}")
    };

    format!(
        "{source_block}\n\n\
         Parameters:\n\
         {{\n\
         \"total_questions\": {total_questions},\n\
         \"difficulty_distribution\": {{\"1\":{}, \"2\":{}, \"3\":{}, \"4\":{}, \"5\":{}}},\n\
         \"task_distribution\": {{\"memory\":{}, \"interpretation\":{}, \"transfer\":{}}}\n\
         }}",
        difficulty_distribution[0],
        difficulty_distribution[1],
        difficulty_distribution[2],
        difficulty_distribution[3],
        difficulty_distribution[4],
        task_distribution[0],
        task_distribution[1],
        task_distribution[2],
    )
}

// ── Answer evaluation ────────────────────────────────────────────────────

/// System instructions for scoring a user's exam answer.
pub const EXAM_EVALUATOR: &str = r#"You are an expert exam evaluator.
Your job is to assess a user's answer against a given exam question and the expected correct answer.

Evaluation guidelines:
- Compare the user's answer with the reference answer (if provided).
- If no explicit reference answer is given, use general knowledge and the question context to evaluate correctness.
- Mark whether the answer is correct, partially correct, or incorrect.
- Give a short, constructive explanation why the evaluation was made.
- Assign a score between 0 and 1, where:
  - 1 = fully correct
  - 0.5 = partially correct
  - 0 = incorrect
- If the question is open-ended (interpretation, opinion, transfer), evaluate the reasoning quality, relevance, and clarity instead of only factual correctness.
- Always return results in JSON format with the following structure:

{
  "question": "...",
  "user_answer": "...",
  "evaluation": {
    "correctness": "correct | partially correct | incorrect",
    "score": 0.0-1.0,
    "explanation": "short explanation here"
  }
}"#;

/// Build the answer-evaluation prompt.
pub fn evaluation_prompt(question: &str, expected_answer: &str, user_answer: &str) -> String {
    format!(
        "Question: {question}\n\
         Expected Answer: {expected_answer}\n\
         User's Answer: {user_answer}"
    )
}
