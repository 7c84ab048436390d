//! Headless Chromium implementation of [`RenderEngine`] over the DevTools
//! protocol (`chromiumoxide`).
//!
//! Every [`RenderEngine::open`] launches its own browser process: a page
//! that wedges the renderer can then only take its own request down. The
//! browser is started with `--no-sandbox`, `--disable-setuid-sandbox` and
//! `--disable-dev-shm-usage` so it runs inside unprivileged containers
//! whose `/dev/shm` is tiny. Each browser gets a fresh profile directory,
//! deleted on release, so cookies and caches never carry over between
//! requests.
//!
//! URL sources wait for the `networkIdle` lifecycle event of the main frame
//! (bounded by [`ChromiumOptions::network_idle_timeout_secs`]) before the
//! image and font settle script runs.
//!
//! ## Cleanup
//!
//! [`ChromiumSurface`] owns the browser, the page and the task driving the
//! CDP connection. The retry ladder releases it explicitly. If the owning
//! future is dropped instead (client disconnect, request deadline), `Drop`
//! spawns the same shutdown on the runtime so no Chromium process outlives
//! its request.

use crate::error::RenderError;
use crate::pipeline::engine::{PdfOptions, RenderEngine, RenderSurface};
use crate::request::RenderSource;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, EventLifecycleEvent, PrintToPdfParams, SetLifecycleEventsEnabledParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::{Stream, StreamExt};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Resolves once every `<img>` has loaded (or failed) and web fonts are in.
const SETTLE_SCRIPT: &str = r#"(async () => {
  const pending = Array.from(document.images)
    .filter((img) => !img.complete)
    .map((img) => new Promise((done) => { img.onload = done; img.onerror = done; }));
  await Promise.all(pending);
  if (document.fonts && document.fonts.ready) { await document.fonts.ready; }
  return document.images.length;
})()"#;

const SANDBOX_ARGS: [&str; 2] = ["--disable-setuid-sandbox", "--disable-dev-shm-usage"];

/// Launch and load settings for [`ChromiumEngine`].
#[derive(Debug, Clone)]
pub struct ChromiumOptions {
    /// Browser executable. `None` searches via `chrome_locate`.
    pub executable: Option<PathBuf>,
    /// Extra command-line switches appended after the built-in ones.
    pub extra_args: Vec<String>,
    pub launch_timeout_secs: u64,
    /// Upper bound for content load plus the settle script.
    pub load_timeout_secs: u64,
    /// How long a URL source may take to reach network idle. Expiry is
    /// logged and the page is printed as loaded.
    pub network_idle_timeout_secs: u64,
    /// Quiet period after load before the first print.
    pub settle_delay_ms: u64,
}

impl Default for ChromiumOptions {
    fn default() -> Self {
        Self {
            executable: None,
            extra_args: Vec::new(),
            launch_timeout_secs: 30,
            load_timeout_secs: 60,
            network_idle_timeout_secs: 30,
            settle_delay_ms: 500,
        }
    }
}

/// Launches one headless Chromium per request.
#[derive(Debug, Clone)]
pub struct ChromiumEngine {
    executable: PathBuf,
    options: ChromiumOptions,
}

impl ChromiumEngine {
    /// Resolve the browser executable and build the engine.
    ///
    /// # Errors
    /// [`RenderError::LoadFailed`] when no browser can be found.
    pub fn new(options: ChromiumOptions) -> Result<Self, RenderError> {
        let executable = chrome_locate::locate_chrome_or(options.executable.as_deref())
            .map_err(|e| RenderError::LoadFailed(e.to_string()))?;
        info!("Using browser at {}", executable.display());
        Ok(Self {
            executable,
            options,
        })
    }

    pub fn executable(&self) -> &std::path::Path {
        &self.executable
    }

    fn browser_config(&self, profile: &Path) -> Result<BrowserConfig, RenderError> {
        let mut builder = BrowserConfig::builder()
            .chrome_executable(&self.executable)
            .user_data_dir(profile)
            .no_sandbox()
            .launch_timeout(Duration::from_secs(self.options.launch_timeout_secs));
        for arg in SANDBOX_ARGS {
            builder = builder.arg(arg);
        }
        for arg in &self.options.extra_args {
            builder = builder.arg(arg.as_str());
        }
        builder.build().map_err(RenderError::LoadFailed)
    }

    async fn launch(&self) -> Result<ChromiumSurface, RenderError> {
        let profile = new_profile()?;
        let config = self.browser_config(profile.path())?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RenderError::LoadFailed(format!("browser launch: {e}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler event error: {}", e);
                }
            }
        });

        debug!("Browser launched with profile {}", profile.path().display());
        Ok(ChromiumSurface {
            browser: Some(browser),
            page: None,
            handler: Some(handler_task),
            profile: Some(profile),
            network_idle_timeout: Duration::from_secs(self.options.network_idle_timeout_secs),
            runtime: tokio::runtime::Handle::current(),
        })
    }
}

#[async_trait]
impl RenderEngine for ChromiumEngine {
    async fn open(&self, source: &RenderSource) -> Result<Box<dyn RenderSurface>, RenderError> {
        let mut surface = self.launch().await?;
        let load_timeout = Duration::from_secs(self.options.load_timeout_secs);

        let loaded = match tokio::time::timeout(load_timeout, surface.load(source)).await {
            Ok(result) => result,
            Err(_) => Err(RenderError::LoadFailed(format!(
                "content did not load within {}s",
                self.options.load_timeout_secs
            ))),
        };

        if let Err(e) = loaded {
            if let Err(close_err) = surface.shutdown().await {
                warn!("Browser cleanup after failed load: {}", close_err);
            }
            return Err(e);
        }

        if self.options.settle_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.options.settle_delay_ms)).await;
        }
        Ok(Box::new(surface))
    }
}

/// A browser with one loaded page.
pub struct ChromiumSurface {
    browser: Option<Browser>,
    page: Option<Page>,
    handler: Option<JoinHandle<()>>,
    /// Removed once the browser has exited.
    profile: Option<TempDir>,
    network_idle_timeout: Duration,
    runtime: tokio::runtime::Handle,
}

impl ChromiumSurface {
    fn page(&self) -> Result<&Page, RenderError> {
        self.page
            .as_ref()
            .ok_or_else(|| RenderError::RenderFailed("no page loaded".to_string()))
    }

    async fn load(&mut self, source: &RenderSource) -> Result<(), RenderError> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| RenderError::LoadFailed("browser already closed".to_string()))?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| RenderError::LoadFailed(format!("new page: {e}")))?;

        match source {
            RenderSource::Html(html) => {
                page.set_content(html.as_str())
                    .await
                    .map_err(|e| RenderError::LoadFailed(format!("set content: {e}")))?;
            }
            RenderSource::Url(url) => {
                let main_frame = page
                    .mainframe()
                    .await
                    .map_err(|e| RenderError::LoadFailed(format!("main frame: {e}")))?
                    .map(|id| id.inner().clone());
                let lifecycle = page
                    .event_listener::<EventLifecycleEvent>()
                    .await
                    .map_err(|e| RenderError::LoadFailed(format!("lifecycle listener: {e}")))?
                    .map(|ev| (ev.frame_id.inner().clone(), ev.name.clone()));
                page.execute(SetLifecycleEventsEnabledParams::new(true))
                    .await
                    .map_err(|e| RenderError::LoadFailed(format!("lifecycle events: {e}")))?;

                page.goto(url.as_str())
                    .await
                    .map_err(|e| RenderError::LoadFailed(format!("navigate to {url}: {e}")))?;
                page.wait_for_navigation()
                    .await
                    .map_err(|e| RenderError::LoadFailed(format!("wait for {url}: {e}")))?;

                let idle = tokio::time::timeout(
                    self.network_idle_timeout,
                    until_network_idle(lifecycle, main_frame.as_deref()),
                )
                .await;
                match idle {
                    Ok(true) => debug!("Network idle for {}", url),
                    Ok(false) => warn!("Lifecycle events ended before network idle for {}", url),
                    Err(_) => warn!(
                        "Network not idle after {}s for {}, printing as loaded",
                        self.network_idle_timeout.as_secs(),
                        url
                    ),
                }
            }
        }

        let settle = EvaluateParams::builder()
            .expression(SETTLE_SCRIPT)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(RenderError::LoadFailed)?;
        match page.evaluate_expression(settle).await {
            Ok(result) => debug!("Content settled ({:?} images)", result.value()),
            // Non-fatal: the print goes ahead with whatever has loaded.
            Err(e) => warn!("Settle script failed: {}", e),
        }

        self.page = Some(page);
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), RenderError> {
        let mut outcome = Ok(());

        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("Page close failed: {}", e);
            }
        }
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                outcome = Err(RenderError::RenderFailed(format!("browser close: {e}")));
                let _ = browser.kill().await;
            }
            if let Err(e) = browser.wait().await {
                debug!("Waiting for browser exit failed: {}", e);
            }
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        if let Some(profile) = self.profile.take() {
            if let Err(e) = profile.close() {
                debug!("Profile dir removal failed: {}", e);
            }
        }

        debug!("Browser released");
        outcome
    }
}

#[async_trait]
impl RenderSurface for ChromiumSurface {
    async fn pdf(&mut self, opts: &PdfOptions) -> Result<Vec<u8>, RenderError> {
        let page = self.page()?;
        page.pdf(print_params(opts))
            .await
            .map_err(|e| RenderError::RenderFailed(e.to_string()))
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, RenderError> {
        let page = self.page()?;
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        page.screenshot(params)
            .await
            .map_err(|e| RenderError::ScreenshotFailed(e.to_string()))
    }

    async fn content(&mut self) -> Result<String, RenderError> {
        let page = self.page()?;
        page.content()
            .await
            .map_err(|e| RenderError::RenderFailed(format!("read content: {e}")))
    }

    async fn release(mut self: Box<Self>) -> Result<(), RenderError> {
        self.shutdown().await
    }
}

impl Drop for ChromiumSurface {
    fn drop(&mut self) {
        if self.browser.is_none() && self.page.is_none() {
            return;
        }
        let page = self.page.take();
        let browser = self.browser.take();
        let handler = self.handler.take();
        let profile = self.profile.take();

        self.runtime.spawn(async move {
            if let Some(page) = page {
                let _ = page.close().await;
            }
            if let Some(mut browser) = browser {
                if let Err(e) = browser.close().await {
                    warn!("Background browser cleanup failed: {}", e);
                    let _ = browser.kill().await;
                }
                let _ = browser.wait().await;
            }
            if let Some(handler) = handler {
                handler.abort();
            }
            drop(profile);
            debug!("Browser released from drop");
        });
    }
}

/// A fresh, empty `--user-data-dir` for one browser.
fn new_profile() -> Result<TempDir, RenderError> {
    tempfile::Builder::new()
        .prefix("folio-chromium-")
        .tempdir()
        .map_err(|e| RenderError::LoadFailed(format!("browser profile dir: {e}")))
}

/// Consume `(frame_id, event_name)` lifecycle pairs until the frame that
/// navigated reports `networkIdle`. Events before the navigation's `init`
/// belong to the blank page and are ignored. `frame` of `None` accepts any
/// frame. Returns `false` if the stream ends first.
async fn until_network_idle<S>(events: S, frame: Option<&str>) -> bool
where
    S: Stream<Item = (String, String)>,
{
    futures::pin_mut!(events);
    let mut navigating = false;
    while let Some((frame_id, name)) = events.next().await {
        if frame.is_some_and(|f| f != frame_id) {
            continue;
        }
        match name.as_str() {
            "init" => navigating = true,
            "networkIdle" if navigating => return true,
            _ => {}
        }
    }
    false
}

/// DevTools print parameters for `opts`.
pub fn print_params(opts: &PdfOptions) -> PrintToPdfParams {
    let layout = &opts.layout;
    PrintToPdfParams {
        landscape: Some(opts.landscape),
        display_header_footer: Some(layout.display_header_footer),
        print_background: Some(layout.print_background),
        scale: opts.scale,
        paper_width: Some(layout.paper_width_in),
        paper_height: Some(layout.paper_height_in),
        margin_top: Some(layout.margin_in),
        margin_bottom: Some(layout.margin_in),
        margin_left: Some(layout.margin_in),
        margin_right: Some(layout.margin_in),
        prefer_css_page_size: Some(opts.prefer_css_page_size),
        ..Default::default()
    }
}
