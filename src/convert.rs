//! Request orchestration: validate, inline, render.
//!
//! [`Pipeline`] owns everything that lives longer than one request: the
//! configuration, the render engine, and the HTTP client used for remote
//! images. The server shares one `Arc<Pipeline>` across handlers; the CLI
//! builds one per invocation.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::output::{InlineReport, RenderOutput};
use crate::pipeline::chromium::{ChromiumEngine, ChromiumOptions};
use crate::pipeline::engine::RenderEngine;
use crate::pipeline::inline::AssetResolver;
use crate::pipeline::retry::{render_with_retry, RetryPlan};
use crate::progress::{NoopProgressCallback, RenderProgressCallback};
use crate::request::{RenderJob, RenderRequest, RenderSource};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// The rendering pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    engine: Arc<dyn RenderEngine>,
    resolver: AssetResolver,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("engine", &"<dyn RenderEngine>")
            .finish()
    }
}

impl Pipeline {
    /// Build a pipeline around an existing engine.
    pub fn new(config: PipelineConfig, engine: Arc<dyn RenderEngine>) -> Result<Self, PipelineError> {
        let resolver = AssetResolver::from_config(&config)?;
        Ok(Self {
            config,
            engine,
            resolver,
        })
    }

    /// Build a pipeline that renders with headless Chromium.
    ///
    /// # Errors
    /// [`PipelineError::EngineUnavailable`] when no browser can be located.
    pub fn with_chromium(
        config: PipelineConfig,
        options: ChromiumOptions,
    ) -> Result<Self, PipelineError> {
        let engine = ChromiumEngine::new(options).map_err(PipelineError::EngineUnavailable)?;
        Self::new(config, Arc::new(engine))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Turn a request into PDF bytes.
    ///
    /// Validation happens first and costs nothing but a length check; an
    /// invalid request never reaches the network or the engine. The rest of
    /// the work runs under the configured request deadline.
    ///
    /// # Errors
    /// - [`PipelineError::InvalidRequest`], [`PipelineError::PayloadTooLarge`],
    ///   [`PipelineError::InvalidUrl`] for bad input
    /// - [`PipelineError::EngineUnavailable`] when the engine cannot load the content
    /// - [`PipelineError::RenderExhausted`] when every attempt failed
    /// - [`PipelineError::DeadlineExceeded`] when the deadline expired
    pub async fn generate(&self, request: RenderRequest) -> Result<RenderOutput, PipelineError> {
        let job = request.validate(self.config.max_html_bytes)?;

        let secs = self.config.request_timeout_secs;
        match tokio::time::timeout(Duration::from_secs(secs), self.run(job)).await {
            Ok(result) => result,
            Err(_) => {
                error!("PDF generation exceeded the {}s deadline", secs);
                Err(PipelineError::DeadlineExceeded { secs })
            }
        }
    }

    async fn run(&self, job: RenderJob) -> Result<RenderOutput, PipelineError> {
        let total_start = Instant::now();
        let progress: &dyn RenderProgressCallback = match &self.config.progress_callback {
            Some(cb) => cb.as_ref(),
            None => &NoopProgressCallback,
        };

        if !job.failed_images.is_empty() {
            warn!(
                "Client could not inline {} images: {:?}",
                job.failed_images.len(),
                job.failed_images
            );
        }
        progress.on_request_start(job.skipped_images.len());

        // ── Step 1: Inline images ────────────────────────────────────────
        let (source, inline) = match job.source {
            RenderSource::Html(html) => {
                info!(
                    "Rendering HTML ({} bytes, {} skipped remote images)",
                    html.len(),
                    job.skipped_images.len()
                );
                let (html, report) = self
                    .resolver
                    .resolve(html, &job.skipped_images, progress)
                    .await;
                (RenderSource::Html(html), report)
            }
            RenderSource::Url(url) => {
                info!("Rendering URL {}", url);
                if !job.skipped_images.is_empty() {
                    debug!("Ignoring skipped_images for a URL source");
                }
                (RenderSource::Url(url), InlineReport::default())
            }
        };

        // ── Step 2: Render with retry ────────────────────────────────────
        let plan = RetryPlan {
            layout: self.config.layout,
            landscape: job.landscape,
            ladder: self.config.retry.clone(),
            screenshot_dir: self
                .config
                .capture_screenshots
                .then(|| self.config.debug_dir.clone()),
        };
        let outcome = render_with_retry(self.engine.as_ref(), &source, &plan, progress).await?;

        progress.on_render_complete(outcome.pdf.len(), outcome.attempts.len());
        let total_duration_ms = total_start.elapsed().as_millis() as u64;
        info!(
            "PDF ready: {} bytes after {} attempt(s), {}ms total",
            outcome.pdf.len(),
            outcome.attempts.len(),
            total_duration_ms
        );

        Ok(RenderOutput {
            pdf: outcome.pdf,
            attempts: outcome.attempts,
            inline,
            total_duration_ms,
        })
    }

    /// Render and write the PDF to `output_path`.
    ///
    /// Uses atomic write (temp file + rename) so a failed render never
    /// leaves a truncated PDF behind.
    pub async fn render_to_file(
        &self,
        request: RenderRequest,
        output_path: impl AsRef<Path>,
    ) -> Result<RenderOutput, PipelineError> {
        let output = self.generate(request).await?;
        let path = output_path.as_ref();
        let write_err = |e: std::io::Error| PipelineError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let tmp_path = path.with_extension("pdf.tmp");
        tokio::fs::write(&tmp_path, &output.pdf)
            .await
            .map_err(write_err)?;
        tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

        Ok(output)
    }
}
