//! Shared fixtures for the integration tests: a scripted render engine
//! that records what it was asked to do, and a tiny local image server.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::http::{header, StatusCode};
use axum::routing::get;
use axum::Router;
use folio_render::{PdfOptions, RenderEngine, RenderError, RenderSource, RenderSurface};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const FAKE_PDF: &[u8] = b"%PDF-1.7\n%fake\n%%EOF\n";

/// How the scripted surface answers print calls.
#[derive(Debug, Clone, Copy)]
pub enum Script {
    /// Fail this many prints, then succeed.
    SucceedAfter(usize),
    /// Fail every print.
    AlwaysFail,
    /// Never finish opening.
    HangOnOpen,
}

#[derive(Default)]
pub struct EngineLog {
    pub opened: Mutex<Vec<RenderSource>>,
    pub prints: Mutex<Vec<PdfOptions>>,
    pub screenshots: AtomicUsize,
    pub releases: AtomicUsize,
}

impl EngineLog {
    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    /// HTML handed to the engine by the last open.
    pub fn opened_html(&self) -> Option<String> {
        match self.opened.lock().unwrap().last()? {
            RenderSource::Html(h) => Some(h.clone()),
            RenderSource::Url(_) => None,
        }
    }

    pub fn scales(&self) -> Vec<Option<f64>> {
        self.prints.lock().unwrap().iter().map(|o| o.scale).collect()
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

pub struct ScriptedEngine {
    script: Script,
    pub log: Arc<EngineLog>,
}

impl ScriptedEngine {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            log: Arc::new(EngineLog::default()),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(Script::SucceedAfter(0))
    }
}

struct ScriptedSurface {
    failures_left: Option<usize>,
    log: Arc<EngineLog>,
}

#[async_trait]
impl RenderEngine for ScriptedEngine {
    async fn open(&self, source: &RenderSource) -> Result<Box<dyn RenderSurface>, RenderError> {
        self.log.opened.lock().unwrap().push(source.clone());
        let failures_left = match self.script {
            Script::SucceedAfter(n) => Some(n),
            Script::AlwaysFail => None,
            Script::HangOnOpen => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Some(0)
            }
        };
        Ok(Box::new(ScriptedSurface {
            failures_left,
            log: self.log.clone(),
        }))
    }
}

#[async_trait]
impl RenderSurface for ScriptedSurface {
    async fn pdf(&mut self, opts: &PdfOptions) -> Result<Vec<u8>, RenderError> {
        self.log.prints.lock().unwrap().push(opts.clone());
        match &mut self.failures_left {
            Some(0) => Ok(FAKE_PDF.to_vec()),
            Some(n) => {
                *n -= 1;
                Err(crash(opts))
            }
            None => Err(crash(opts)),
        }
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, RenderError> {
        self.log.screenshots.fetch_add(1, Ordering::SeqCst);
        Ok(png_bytes(4, 4))
    }

    async fn content(&mut self) -> Result<String, RenderError> {
        Ok("<html><body><img src=\"x.png\"></body></html>".to_string())
    }

    async fn release(self: Box<Self>) -> Result<(), RenderError> {
        self.log.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn crash(opts: &PdfOptions) -> RenderError {
    RenderError::RenderFailed(format!(
        "renderer crashed at scale {}",
        opts.effective_scale()
    ))
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 100, 50])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

/// A local image server on an ephemeral port.
///
/// - `/img.png`    : 2000×1000 PNG, counts hits
/// - `/small.png`  : 50×40 PNG
/// - `/slow.png`   : answers after 5 s
/// - `/missing.png`: 404
pub struct ImageServer {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
}

impl ImageServer {
    pub async fn start() -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let wide = png_bytes(2000, 1000);
        let small = png_bytes(50, 40);

        let counter = hits.clone();
        let app = Router::new()
            .route(
                "/img.png",
                get(move || {
                    let counter = counter.clone();
                    let wide = wide.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        ([(header::CONTENT_TYPE, "image/png")], wide)
                    }
                }),
            )
            .route(
                "/small.png",
                get(move || {
                    let small = small.clone();
                    async move { ([(header::CONTENT_TYPE, "image/png")], small) }
                }),
            )
            .route(
                "/slow.png",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
            .route("/missing.png", get(|| async { StatusCode::NOT_FOUND }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, hits }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}
