//! LaTeX-to-PDF compilation in a disposable working area.
//!
//! Each invocation gets its own [`tempfile::TempDir`]; concurrent compiles
//! never share one, and the directory is discarded on return — success or
//! failure — so only the PDF bytes survive. Documents with cross-references
//! need two compiler passes to resolve them; the pass count is a fixed
//! convention, not an adaptive retry.

use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::ProcessingConfig;
use crate::error::ScantexError;

/// The compiler binary. Resolved via PATH at invocation time.
const COMPILER: &str = "pdflatex";

/// Compile `latex` to PDF bytes.
///
/// Runs `config.compile_runs` passes of pdflatex inside a fresh temporary
/// directory, each bounded by `config.compile_timeout_secs`. The working
/// area is removed when this function returns.
///
/// # Errors
/// - [`ScantexError::CompilerMissing`] when pdflatex is not on PATH
/// - [`ScantexError::CompileTimeout`] when a pass exceeds the timeout
/// - [`ScantexError::CompileFailed`] when the compiler exits nonzero
/// - [`ScantexError::NoArtifactProduced`] when no PDF appears despite a
///   clean exit
pub async fn compile_latex(latex: &str, config: &ProcessingConfig) -> Result<Vec<u8>, ScantexError> {
    let workdir = tempfile::TempDir::new()
        .map_err(|e| ScantexError::Internal(format!("tempdir: {e}")))?;
    let tex_path = workdir.path().join("document.tex");

    let mut tex_file = tokio::fs::File::create(&tex_path)
        .await
        .map_err(|e| ScantexError::Internal(format!("write tex file: {e}")))?;
    tex_file
        .write_all(latex.as_bytes())
        .await
        .map_err(|e| ScantexError::Internal(format!("write tex file: {e}")))?;
    tex_file
        .flush()
        .await
        .map_err(|e| ScantexError::Internal(format!("write tex file: {e}")))?;

    let pass_timeout = Duration::from_secs(config.compile_timeout_secs);

    for pass in 1..=config.compile_runs {
        debug!("Compilation pass {}/{}", pass, config.compile_runs);

        let child = Command::new(COMPILER)
            .arg("-interaction=nonstopmode")
            .arg("-halt-on-error")
            .arg("-output-directory")
            .arg(workdir.path())
            .arg(&tex_path)
            .current_dir(workdir.path())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ScantexError::CompilerMissing
                } else {
                    ScantexError::Internal(format!("spawn {COMPILER}: {e}"))
                }
            })?;

        let output = match timeout(pass_timeout, child.wait_with_output()).await {
            Ok(result) => result
                .map_err(|e| ScantexError::Internal(format!("wait for {COMPILER}: {e}")))?,
            Err(_) => {
                warn!("Compilation pass {} timed out", pass);
                return Err(ScantexError::CompileTimeout {
                    secs: config.compile_timeout_secs,
                });
            }
        };

        if !output.status.success() {
            let detail = extract_error_lines(&String::from_utf8_lossy(&output.stdout));
            warn!("Compilation failed on pass {}: {}", pass, detail);
            return Err(ScantexError::CompileFailed { pass, detail });
        }
    }

    let pdf_path = workdir.path().join("document.pdf");
    match tokio::fs::read(&pdf_path).await {
        Ok(bytes) => {
            info!("PDF generated, {} bytes", bytes.len());
            Ok(bytes)
        }
        Err(_) => Err(ScantexError::NoArtifactProduced),
    }
}

/// Pull the first compiler error lines out of a pdflatex transcript.
///
/// pdflatex reports errors on lines starting with `!`; the surrounding
/// chatter is noise. Falls back to a generic message when no error line
/// is found.
fn extract_error_lines(transcript: &str) -> String {
    let errors: Vec<&str> = transcript
        .lines()
        .filter(|line| line.starts_with('!'))
        .take(5)
        .collect();
    if errors.is_empty() {
        "compiler exited nonzero (no error line in transcript)".to_string()
    } else {
        errors.join("; ")
    }
}
