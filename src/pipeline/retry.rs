//! The render retry ladder.
//!
//! One surface is opened per request and printed at most
//! `1 + ladder.scales.len()` times:
//!
//! ```text
//! attempt 1  natural scale, CSS page size preferred
//! attempt 2  scale 0.9
//! attempt 3  scale 0.8
//! attempt 4  scale 0.7   ← its error is the one surfaced on exhaustion
//! ```
//!
//! The ladder stops at the first success. Every failure is logged with
//! document metrics and, when enabled, a screenshot. The surface is
//! released exactly once after the ladder ends, whatever the outcome.

use crate::config::{PageLayout, RetryLadder};
use crate::error::{PipelineError, RenderError};
use crate::output::RenderAttempt;
use crate::pipeline::diagnostics;
use crate::pipeline::engine::{PdfOptions, RenderEngine, RenderSurface};
use crate::progress::RenderProgressCallback;
use crate::request::RenderSource;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Per-request inputs to [`render_with_retry`].
#[derive(Debug, Clone)]
pub struct RetryPlan {
    pub layout: PageLayout,
    pub landscape: bool,
    pub ladder: RetryLadder,
    /// Directory for failure screenshots; `None` disables them.
    pub screenshot_dir: Option<PathBuf>,
}

impl RetryPlan {
    /// Print options for every attempt, in order.
    pub fn attempts(&self) -> Vec<PdfOptions> {
        std::iter::once(PdfOptions::initial(self.layout, self.landscape))
            .chain(
                self.ladder
                    .scales
                    .iter()
                    .map(|&s| PdfOptions::degraded(self.layout, self.landscape, s)),
            )
            .collect()
    }
}

/// A successful ladder run.
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    pub pdf: Vec<u8>,
    pub attempts: Vec<RenderAttempt>,
}

/// Open `source` on `engine` and print it, stepping down the ladder on
/// failure.
///
/// # Errors
/// - [`PipelineError::EngineUnavailable`] when the surface cannot be opened
/// - [`PipelineError::RenderExhausted`] carrying the last attempt's error
pub async fn render_with_retry(
    engine: &dyn RenderEngine,
    source: &RenderSource,
    plan: &RetryPlan,
    progress: &dyn RenderProgressCallback,
) -> Result<RetryOutcome, PipelineError> {
    let mut surface = engine
        .open(source)
        .await
        .map_err(PipelineError::EngineUnavailable)?;
    debug!("Render surface opened");

    let result = run_ladder(surface.as_mut(), source.html(), plan, progress).await;

    if let Err(e) = surface.release().await {
        warn!("Releasing render surface failed: {}", e);
    }

    result
}

async fn run_ladder(
    surface: &mut dyn RenderSurface,
    html: Option<&str>,
    plan: &RetryPlan,
    progress: &dyn RenderProgressCallback,
) -> Result<RetryOutcome, PipelineError> {
    let options = plan.attempts();
    let total = options.len();
    let mut attempts = Vec::with_capacity(total);
    let mut last_error: Option<RenderError> = None;

    for (i, opts) in options.iter().enumerate() {
        let n = i + 1;
        let scale = opts.effective_scale();
        progress.on_attempt_start(n, scale);
        if n > 1 {
            info!("Retrying PDF generation with scale={} ({}/{})", scale, n, total);
        }

        let start = Instant::now();
        let outcome = surface.pdf(opts).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(pdf) => {
                info!(
                    "PDF generated at scale={} on attempt {} ({} bytes, {}ms)",
                    scale,
                    n,
                    pdf.len(),
                    duration_ms
                );
                attempts.push(RenderAttempt {
                    scale,
                    succeeded: true,
                    error_detail: None,
                    duration_ms,
                });
                return Ok(RetryOutcome { pdf, attempts });
            }
            Err(e) => {
                error!("PDF attempt {} at scale={} failed: {}", n, scale, e);
                progress.on_attempt_failed(n, scale, &e.to_string());
                diagnostics::capture_failure(
                    surface,
                    html,
                    n,
                    scale,
                    plan.screenshot_dir.as_deref(),
                )
                .await;
                attempts.push(RenderAttempt {
                    scale,
                    succeeded: false,
                    error_detail: Some(e.to_string()),
                    duration_ms,
                });
                last_error = Some(e);
            }
        }
    }

    let last_error = last_error
        .unwrap_or_else(|| RenderError::RenderFailed("no render attempts configured".to_string()));
    error!("All {} PDF attempts failed; last error: {}", total, last_error);
    Err(PipelineError::RenderExhausted {
        attempts: attempts.len(),
        last_error,
    })
}
