//! CLI binary for folio-render.
//!
//! A thin shim over the library crate: `serve` runs the HTTP service,
//! `render` runs one request locally, `resize` batch-resizes an upload
//! directory.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use folio_render::{
    resize::resize_directory_in_background, server, ChromiumOptions, NormalizeOptions, Pipeline,
    PipelineConfig, ProgressCallback, RenderProgressCallback, RenderRequest,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner plus one log line per inlined image and per render attempt.
struct CliProgressCallback {
    bar: ProgressBar,
    failed_assets: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Loading content…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            failed_assets: AtomicUsize::new(0),
        })
    }
}

impl RenderProgressCallback for CliProgressCallback {
    fn on_request_start(&self, remote_images: usize) {
        self.bar.set_prefix("Inlining");
        self.bar.set_message(format!("{remote_images} remote images"));
    }

    fn on_asset_inlined(&self, source: &str, bytes: usize) {
        self.bar.println(format!(
            "  {} {}  {}",
            green("✓"),
            source,
            dim(&format!("{bytes} bytes"))
        ));
    }

    fn on_asset_failed(&self, source: &str, error: &str) {
        self.failed_assets.fetch_add(1, Ordering::SeqCst);
        self.bar
            .println(format!("  {} {}  {}", red("✗"), source, dim(error)));
    }

    fn on_attempt_start(&self, attempt: usize, scale: f64) {
        self.bar.set_prefix("Rendering");
        self.bar
            .set_message(format!("attempt {attempt} at scale {scale}"));
    }

    fn on_attempt_failed(&self, attempt: usize, scale: f64, error: &str) {
        self.bar.println(format!(
            "  {} attempt {} (scale {})  {}",
            red("✗"),
            attempt,
            scale,
            red(error)
        ));
    }

    fn on_render_complete(&self, pdf_bytes: usize, attempts: usize) {
        self.bar.finish_and_clear();
        let failed = self.failed_assets.load(Ordering::SeqCst);
        eprintln!(
            "{} PDF rendered  {}  {}",
            green("✔"),
            dim(&format!("{pdf_bytes} bytes, {attempts} attempt(s)")),
            if failed > 0 {
                red(&format!("{failed} image(s) left as-is"))
            } else {
                String::new()
            }
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP service
  folio serve --bind 0.0.0.0:8000 --static-root app/static

  # Render a local HTML file
  folio render resume.html -o resume.pdf

  # Render a live page in landscape
  folio render https://example.com/cv --landscape -o cv.pdf

  # Shrink every uploaded image to 512px wide
  folio resize app/static/images

ENVIRONMENT VARIABLES:
  CHROME_PATH             Path to a Chromium / Chrome executable
  FOLIO_CHROME_CACHE_DIR  Directory searched for a provisioned Chromium
  RUST_LOG                Log filter (overrides --verbose / --quiet)
"#;

#[derive(Parser, Debug)]
#[command(
    name = "folio",
    version,
    about = "Render HTML or URLs to print-ready PDFs with headless Chromium",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Debug-level logs.
    #[arg(short, long, global = true, env = "FOLIO_VERBOSE")]
    verbose: bool,

    /// Errors only.
    #[arg(short, long, global = true, env = "FOLIO_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve POST /api/v1/pdf/generate.
    Serve {
        #[arg(long, env = "FOLIO_BIND", default_value = "127.0.0.1:8000")]
        bind: SocketAddr,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Render one HTML file or URL to a PDF file.
    Render {
        /// HTML file path, or an http(s) URL.
        input: String,

        #[arg(short, long, env = "FOLIO_OUTPUT", default_value = "portfolio.pdf")]
        output: PathBuf,

        #[arg(long, env = "FOLIO_LANDSCAPE")]
        landscape: bool,

        /// Remote image URL to fetch and inline (repeatable).
        #[arg(long = "inline-remote", value_name = "URL")]
        inline_remote: Vec<String>,

        #[arg(long, env = "FOLIO_NO_PROGRESS")]
        no_progress: bool,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Downsize every image in a directory in place.
    Resize {
        dir: PathBuf,

        #[arg(long, env = "FOLIO_RESIZE_WIDTH", default_value_t = folio_render::config::UPLOAD_MAX_WIDTH)]
        width: u32,

        #[arg(long, env = "FOLIO_RESIZE_QUALITY", default_value_t = 90,
              value_parser = clap::value_parser!(u8).range(1..=100))]
        quality: u8,
    },
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Browser executable; searched for when omitted.
    #[arg(long, env = "FOLIO_CHROME")]
    chrome: Option<PathBuf>,

    /// Directory served under the /static/ prefix.
    #[arg(long, env = "FOLIO_STATIC_ROOT", default_value = "app/static")]
    static_root: PathBuf,

    #[arg(long, env = "FOLIO_FETCH_TIMEOUT", default_value_t = 10)]
    fetch_timeout: u64,

    #[arg(long, env = "FOLIO_REQUEST_TIMEOUT", default_value_t = 120)]
    request_timeout: u64,

    /// Comma-separated scales tried after the first attempt fails.
    #[arg(long, env = "FOLIO_RETRY_SCALES", value_delimiter = ',', default_value = "0.9,0.8,0.7")]
    retry_scales: Vec<f64>,

    /// Directory for failure screenshots.
    #[arg(long, env = "FOLIO_DEBUG_DIR")]
    debug_dir: Option<PathBuf>,

    #[arg(long, env = "FOLIO_NO_SCREENSHOTS")]
    no_screenshots: bool,
}

impl PipelineArgs {
    fn build(&self, progress: Option<ProgressCallback>) -> Result<Pipeline> {
        let mut builder = PipelineConfig::builder()
            .static_root(&self.static_root)
            .fetch_timeout_secs(self.fetch_timeout)
            .request_timeout_secs(self.request_timeout)
            .retry_scales(self.retry_scales.clone())
            .capture_screenshots(!self.no_screenshots);
        if let Some(dir) = &self.debug_dir {
            builder = builder.debug_dir(dir);
        }
        if let Some(cb) = progress {
            builder = builder.progress_callback(cb);
        }
        let config = builder.build().context("Invalid configuration")?;

        let options = ChromiumOptions {
            executable: self.chrome.clone(),
            ..ChromiumOptions::default()
        };
        Pipeline::with_chromium(config, options).context("Could not start the render engine")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = matches!(&cli.command, Command::Render { no_progress: false, .. })
        && !cli.quiet
        && !cli.verbose;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve { bind, pipeline } => {
            let pipeline = Arc::new(pipeline.build(None)?);
            tracing::info!("{:?}", pipeline.config());
            server::serve(pipeline, bind)
                .await
                .with_context(|| format!("Server on {bind} failed"))?;
        }

        Command::Render {
            input,
            output,
            landscape,
            inline_remote,
            no_progress: _,
            pipeline,
        } => {
            let progress: Option<ProgressCallback> = show_progress
                .then(|| CliProgressCallback::new() as Arc<dyn RenderProgressCallback>);
            let pipeline = pipeline.build(progress)?;

            let mut request = if input.starts_with("http://") || input.starts_with("https://") {
                RenderRequest::from_url(&input)
            } else {
                let html = tokio::fs::read_to_string(&input)
                    .await
                    .with_context(|| format!("Failed to read {input}"))?;
                RenderRequest::from_html(html)
            };
            request.landscape = landscape;
            request.skipped_images = inline_remote;

            let out = pipeline
                .render_to_file(request, &output)
                .await
                .context("Rendering failed")?;

            if !cli.quiet {
                eprintln!(
                    "{}  {} bytes  {}ms  →  {}",
                    green("✔"),
                    out.pdf.len(),
                    out.total_duration_ms,
                    bold(&output.display().to_string()),
                );
            }
        }

        Command::Resize {
            dir,
            width,
            quality,
        } => {
            let opts = NormalizeOptions {
                max_width: width,
                jpeg_quality: quality,
            };
            let summary = resize_directory_in_background(dir.clone(), opts)
                .await
                .with_context(|| format!("Failed to resize {}", dir.display()))?;
            if !cli.quiet {
                eprintln!(
                    "{} processed={}, skipped={}, failed={}",
                    if summary.failed == 0 { green("✔") } else { red("⚠") },
                    summary.processed,
                    summary.skipped,
                    summary.failed
                );
                for (path, err) in &summary.failures {
                    eprintln!("  {} {}  {}", red("✗"), path.display(), dim(err));
                }
            }
        }
    }

    Ok(())
}
