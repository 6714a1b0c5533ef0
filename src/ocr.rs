//! OCR collaborator boundary and the bounded fan-out driver.
//!
//! The actual image-to-text service lives behind [`OcrEngine`] — this
//! crate never implements OCR, it only drives an engine over a batch of
//! images and concatenates what came back. Partial failure is normal: a
//! blurry page simply contributes nothing, and the pipeline runs on the
//! concatenation of the successful extractions.
//!
//! Extraction runs up to [`crate::config::ProcessingConfig::ocr_concurrency`]
//! requests in flight with a short hold-down after each one. Upstream OCR
//! services rate-limit hard; three paced slots stays under typical limits
//! while still overlapping network latency across pages.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::ProcessingConfig;

/// Separator between texts from different images in the combined output.
const DOCUMENT_SEPARATOR: &str = "\n\n--- New Document ---\n\n";

/// One image handed to the OCR engine, tagged for diagnostic prefixing.
#[derive(Debug, Clone)]
pub struct OcrImage {
    /// Identifier used in the combined text's per-image header (usually
    /// the file name).
    pub id: String,
    /// Raw image bytes.
    pub bytes: Vec<u8>,
}

/// What the engine produced for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrExtraction {
    /// Whether the engine produced usable text.
    pub success: bool,
    /// The extracted text; empty when `success` is false.
    pub text: String,
}

impl OcrExtraction {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            success: true,
            text: text.into(),
        }
    }

    pub fn failure() -> Self {
        Self {
            success: false,
            text: String::new(),
        }
    }
}

/// Boundary to the external image-to-text service.
///
/// Implementations wrap whatever OCR backend the host application uses;
/// they must not panic on unreadable images — return
/// [`OcrExtraction::failure`] instead.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn extract(&self, image: &OcrImage) -> OcrExtraction;
}

/// Run the engine over every image, bounded and paced.
///
/// Results come back in input order, one per image, failures included —
/// callers decide what a partial batch means to them (the pipeline just
/// feeds the successes to [`combine_extractions`]).
pub async fn extract_all(
    engine: &Arc<dyn OcrEngine>,
    images: &[OcrImage],
    config: &ProcessingConfig,
) -> Vec<(String, OcrExtraction)> {
    info!("Extracting text from {} images", images.len());
    let pacing = Duration::from_millis(config.ocr_pacing_ms);

    let results: Vec<(String, OcrExtraction)> = stream::iter(images.iter().map(|image| {
        let engine = Arc::clone(engine);
        let image = image.clone();
        async move {
            let extraction = engine.extract(&image).await;
            if !extraction.success {
                warn!("OCR failed for image '{}'", image.id);
            }
            // Hold the slot briefly so consecutive requests on it are paced.
            sleep(pacing).await;
            (image.id, extraction)
        }
    }))
    .buffered(config.ocr_concurrency)
    .collect()
    .await;

    let successful = results.iter().filter(|(_, e)| e.success).count();
    info!(
        "OCR extraction complete: {}/{} images successful",
        successful,
        results.len()
    );
    results
}

/// Concatenate the successful extractions into one source text.
///
/// Each contribution is prefixed with its image identifier so later
/// stages (and humans debugging their output) can attribute text to a
/// page. Returns an empty string when nothing succeeded — the pipeline
/// turns that into its hard "nothing to process" error.
pub fn combine_extractions(results: &[(String, OcrExtraction)]) -> String {
    results
        .iter()
        .filter(|(_, e)| e.success && !e.text.trim().is_empty())
        .map(|(id, e)| format!("=== {id} ===\n{}", e.text.trim()))
        .collect::<Vec<_>>()
        .join(DOCUMENT_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Succeeds for images whose id does not start with "bad".
    struct FlakyEngine {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl OcrEngine for FlakyEngine {
        async fn extract(&self, image: &OcrImage) -> OcrExtraction {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if image.id.starts_with("bad") {
                OcrExtraction::failure()
            } else {
                OcrExtraction::success(format!("text from {}", image.id))
            }
        }
    }

    fn images(ids: &[&str]) -> Vec<OcrImage> {
        ids.iter()
            .map(|id| OcrImage {
                id: id.to_string(),
                bytes: vec![0u8; 4],
            })
            .collect()
    }

    fn fast_config() -> ProcessingConfig {
        ProcessingConfig::builder()
            .ocr_pacing_ms(0)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn extraction_preserves_input_order() {
        let engine: Arc<dyn OcrEngine> = Arc::new(FlakyEngine {
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        });
        let results = extract_all(
            &engine,
            &images(&["p1.png", "p2.png", "p3.png"]),
            &fast_config(),
        )
        .await;
        let ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["p1.png", "p2.png", "p3.png"]);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let inner = Arc::new(FlakyEngine {
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        });
        let engine: Arc<dyn OcrEngine> = inner.clone();
        let batch = images(&["a", "b", "c", "d", "e", "f", "g", "h"]);
        extract_all(&engine, &batch, &fast_config()).await;
        assert!(
            inner.max_in_flight.load(Ordering::SeqCst) <= 3,
            "more than 3 extractions were in flight"
        );
    }

    #[tokio::test]
    async fn combine_skips_failures_and_prefixes_ids() {
        let engine: Arc<dyn OcrEngine> = Arc::new(FlakyEngine {
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        });
        let results = extract_all(
            &engine,
            &images(&["p1.png", "bad.png", "p3.png"]),
            &fast_config(),
        )
        .await;
        let combined = combine_extractions(&results);

        assert!(combined.contains("=== p1.png ===\ntext from p1.png"));
        assert!(combined.contains("=== p3.png ==="));
        assert!(!combined.contains("bad.png"));
        assert!(combined.contains("--- New Document ---"));
    }

    #[test]
    fn combine_of_all_failures_is_empty() {
        let results = vec![
            ("a".to_string(), OcrExtraction::failure()),
            ("b".to_string(), OcrExtraction::failure()),
        ];
        assert_eq!(combine_extractions(&results), "");
    }

    #[test]
    fn combine_skips_blank_success_text() {
        let results = vec![
            ("a".to_string(), OcrExtraction::success("  ")),
            ("b".to_string(), OcrExtraction::success("real")),
        ];
        let combined = combine_extractions(&results);
        assert_eq!(combined, "=== b ===\nreal");
    }
}
