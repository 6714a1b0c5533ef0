//! CLI binary for scantex.
//!
//! A thin shim over the library crate that maps CLI flags to the pipeline
//! types and prints results. Credentials and the endpoint are read from
//! the environment here — exactly once — and injected into the client.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use scantex::{
    compile_latex, CompletionConfig, DocumentPipeline, DocumentRequest, ExamSpec,
    ExamSynthesizer, HttpCompletionClient, PipelineObserver, ProcessingConfig, Stage,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── Spinner observer ─────────────────────────────────────────────────────────

/// Terminal observer: one spinner whose message tracks the current stage,
/// plus a log line per completed or degraded stage.
struct CliObserver {
    bar: ProgressBar,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl PipelineObserver for CliObserver {
    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_message(format!("{stage}…"));
    }

    fn on_stage_complete(&self, stage: Stage, output_len: usize, duration_ms: u64) {
        self.bar.println(format!(
            "  {} {:<14} {}  {}",
            green("✓"),
            stage.to_string(),
            dim(&format!("{output_len:>6} chars")),
            dim(&format!("{:.1}s", duration_ms as f64 / 1000.0)),
        ));
    }

    fn on_stage_fallback(&self, stage: Stage, reason: &str) {
        self.bar.println(format!(
            "  {} {:<14} fallback: {}",
            cyan("⚠"),
            stage.to_string(),
            reason
        ));
    }
}

// ── CLI definition ───────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # Reconstruct a LaTeX document from an OCR text dump
  scantex process scan.txt -o notes.tex

  # Legacy mode (skip context analysis), with user hints
  scantex process scan.txt --legacy --remarks "page 2 is a physics exercise"

  # Full pipeline output as JSON, plus a compiled PDF
  scantex process scan.txt --json --pdf notes.pdf

  # Generate a 10-question mock exam from source notes
  scantex exam --source notes.txt -o exam.tex

  # Custom distributions (difficulty 1-5 and memory/interpretation/transfer)
  scantex exam --questions 20 --difficulty 40,30,20,5,5 --tasks 40,30,30

ENVIRONMENT VARIABLES:
  SCANTEX_ENDPOINT   Chat-completions endpoint URL (required)
  SCANTEX_API_KEY    Bearer token for the endpoint (optional)
"#;

/// Reconstruct scanned-document OCR text into compilable LaTeX.
#[derive(Parser, Debug)]
#[command(
    name = "scantex",
    version,
    about = "Reconstruct scanned-document OCR text into compilable LaTeX",
    arg_required_else_help = true,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Chat-completions endpoint URL.
    #[arg(long, env = "SCANTEX_ENDPOINT", global = true)]
    endpoint: Option<String>,

    /// Bearer token for the endpoint.
    #[arg(long, env = "SCANTEX_API_KEY", global = true, hide_env_values = true)]
    api_key: Option<String>,

    /// Retries per completion call on transient failure.
    #[arg(long, env = "SCANTEX_MAX_RETRIES", default_value_t = 3, global = true)]
    max_retries: u32,

    /// Read timeout per completion call in seconds.
    #[arg(long, env = "SCANTEX_READ_TIMEOUT", default_value_t = 20, global = true)]
    read_timeout: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors and the result.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Turn a raw OCR text file into a LaTeX document.
    Process {
        /// Text file with raw OCR output ("-" for stdin).
        input: PathBuf,

        /// Write the LaTeX source to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Document title; recommended automatically when omitted.
        #[arg(long)]
        title: Option<String>,

        /// Document category, shown as a heading in the fallback layout.
        #[arg(long)]
        category: Option<String>,

        /// Free-form hints forwarded into the correction prompts.
        #[arg(long)]
        remarks: Option<String>,

        /// Skip context analysis (legacy two-step sequence).
        #[arg(long)]
        legacy: bool,

        /// Run the complete pipeline (structure enhancement + key info).
        #[arg(long)]
        complete: bool,

        /// Output the full result object as JSON instead of LaTeX.
        #[arg(long)]
        json: bool,

        /// Also compile the document and write the PDF here.
        #[arg(long)]
        pdf: Option<PathBuf>,
    },

    /// Generate a mock exam as a LaTeX document.
    Exam {
        /// Source-text file to base questions on (general knowledge
        /// questions when omitted).
        #[arg(long)]
        source: Option<PathBuf>,

        /// Number of questions to generate.
        #[arg(long, default_value_t = 10)]
        questions: usize,

        /// Difficulty split as five percentages summing to 100.
        #[arg(long, default_value = "25,25,25,15,10")]
        difficulty: String,

        /// Task-type split (memory,interpretation,transfer) summing to 100.
        #[arg(long, default_value = "30,40,30")]
        tasks: String,

        /// Exam title.
        #[arg(long, default_value = "Mock Exam")]
        title: String,

        /// Exam author line.
        #[arg(long, default_value = "scantex")]
        author: String,

        /// Write the LaTeX source to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also compile the exam and write the PDF here.
        #[arg(long)]
        pdf: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let endpoint = cli
        .endpoint
        .clone()
        .context("No completion endpoint configured. Set SCANTEX_ENDPOINT or pass --endpoint.")?;

    let client = Arc::new(
        HttpCompletionClient::new(CompletionConfig {
            endpoint,
            api_key: cli.api_key.clone(),
            read_timeout: Duration::from_secs(cli.read_timeout),
            max_retries: cli.max_retries,
            ..Default::default()
        })
        .context("Failed to initialise completion client")?,
    );

    match cli.command {
        Command::Process {
            ref input,
            ref output,
            ref title,
            ref category,
            ref remarks,
            legacy,
            complete,
            json,
            ref pdf,
        } => {
            let source_text = read_input(input).await?;

            let observer = if cli.quiet || json {
                None
            } else {
                Some(CliObserver::new())
            };

            let mut builder = ProcessingConfig::builder().skip_context(legacy);
            if let Some(ref obs) = observer {
                builder = builder.observer(Arc::clone(obs) as Arc<dyn PipelineObserver>);
            }
            let config = builder.build().context("Invalid configuration")?;

            let pipeline = DocumentPipeline::new(client, config);
            let request = DocumentRequest {
                title: title.clone(),
                category: category.clone(),
                remarks: remarks.clone(),
            };

            let result = if complete {
                pipeline.process_complete(&source_text, &request).await
            } else {
                pipeline.process(&source_text, &request).await
            };
            if let Some(ref obs) = observer {
                obs.finish();
            }
            let result = result.context("Processing failed")?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&result).context("Failed to serialise output")?
                );
            } else {
                write_text(output.as_deref(), result.document.latex()).await?;
            }

            if let Some(pdf_path) = pdf {
                let bytes = compile_latex(result.document.latex(), pipeline.config())
                    .await
                    .context("PDF compilation failed")?;
                tokio::fs::write(pdf_path, &bytes)
                    .await
                    .with_context(|| format!("Failed to write {}", pdf_path.display()))?;
                if !cli.quiet {
                    eprintln!("{} PDF written to {}", green("✔"), bold(&pdf_path.display().to_string()));
                }
            }

            if !cli.quiet && !json {
                if let Some(ref t) = result.recommended_title {
                    eprintln!("   recommended title: {}", bold(t));
                }
                eprintln!(
                    "   {} completion calls  —  {}ms total",
                    dim(&result.stats.completion_calls.to_string()),
                    result.stats.total_ms,
                );
            }
        }

        Command::Exam {
            ref source,
            questions,
            ref difficulty,
            ref tasks,
            ref title,
            ref author,
            ref output,
            ref pdf,
        } => {
            let source_text = match source {
                Some(path) => read_input(path).await?,
                None => String::new(),
            };

            let spec = ExamSpec {
                total_questions: questions,
                difficulty_distribution: parse_percentages::<5>(difficulty)
                    .context("Invalid --difficulty")?,
                task_distribution: parse_percentages::<3>(tasks).context("Invalid --tasks")?,
            };

            let synth = ExamSynthesizer::new(client);
            let batch = synth
                .generate(&source_text, &spec)
                .await
                .context("Exam generation failed")?;
            if batch.is_failed() && !cli.quiet {
                eprintln!(
                    "{} model reply did not parse as a question batch; writing error-marked document",
                    cyan("⚠")
                );
            }

            let latex = batch.render(title, author);
            write_text(output.as_deref(), &latex).await?;

            if let Some(pdf_path) = pdf {
                let config = ProcessingConfig::default();
                let bytes = compile_latex(&latex, &config)
                    .await
                    .context("PDF compilation failed")?;
                tokio::fs::write(pdf_path, &bytes)
                    .await
                    .with_context(|| format!("Failed to write {}", pdf_path.display()))?;
                if !cli.quiet {
                    eprintln!("{} PDF written to {}", green("✔"), bold(&pdf_path.display().to_string()));
                }
            }
        }
    }

    Ok(())
}

/// Read the input file, or stdin for "-".
async fn read_input(path: &PathBuf) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::Read::read_to_string(&mut io::stdin(), &mut buf).context("Failed to read stdin")?;
        Ok(buf)
    } else {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }
}

/// Write to the output file, or stdout when none is given.
async fn write_text(output: Option<&std::path::Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => {
            tokio::fs::write(path, text)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            Ok(())
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(text.as_bytes())
                .context("Failed to write to stdout")?;
            if !text.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
            Ok(())
        }
    }
}

/// Parse "25,25,25,15,10"-style percentage lists of a fixed length.
fn parse_percentages<const N: usize>(s: &str) -> Result<[u32; N]> {
    let parts: Vec<u32> = s
        .split(',')
        .map(|p| {
            p.trim()
                .parse::<u32>()
                .with_context(|| format!("Invalid percentage: '{}'", p.trim()))
        })
        .collect::<Result<Vec<_>>>()?;

    let arr: [u32; N] = parts
        .try_into()
        .map_err(|v: Vec<u32>| anyhow::anyhow!("Expected {N} percentages, got {}", v.len()))?;

    let sum: u32 = arr.iter().sum();
    if sum != 100 {
        anyhow::bail!("Percentages must sum to 100, got {sum}");
    }
    Ok(arr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_percentages_happy_path() {
        assert_eq!(
            parse_percentages::<5>("25,25,25,15,10").unwrap(),
            [25, 25, 25, 15, 10]
        );
        assert_eq!(parse_percentages::<3>(" 30, 40 ,30 ").unwrap(), [30, 40, 30]);
    }

    #[test]
    fn parse_percentages_rejects_wrong_arity() {
        assert!(parse_percentages::<5>("50,50").is_err());
    }

    #[test]
    fn parse_percentages_rejects_bad_sum() {
        assert!(parse_percentages::<3>("30,30,30").is_err());
    }
}
