//! Integration tests for `Pipeline::generate` with a scripted render
//! engine: no browser needed. Remote images come from a local axum server.

mod common;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::{ImageServer, Script, ScriptedEngine, FAKE_PDF};
use folio_render::{
    Pipeline, PipelineConfig, PipelineError, RenderProgressCallback, RenderRequest, RenderSource,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

static RE_DATA_URI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"src="data:([^;]+);base64,([^"]+)""#).unwrap());

// ── Helpers ──────────────────────────────────────────────────────────────────

fn config(static_root: &Path, debug_dir: &Path) -> PipelineConfig {
    PipelineConfig::builder()
        .static_root(static_root)
        .debug_dir(debug_dir)
        .fetch_timeout_secs(1)
        .build()
        .unwrap()
}

fn pipeline_with(engine: ScriptedEngine, config: PipelineConfig) -> (Pipeline, Arc<common::EngineLog>) {
    let log = engine.log.clone();
    (Pipeline::new(config, Arc::new(engine)).unwrap(), log)
}

/// (mime, decoded bytes) of every data URI in `html`, in order.
fn data_uris(html: &str) -> Vec<(String, Vec<u8>)> {
    RE_DATA_URI
        .captures_iter(html)
        .map(|c| (c[1].to_string(), STANDARD.decode(&c[2]).unwrap()))
        .collect()
}

// ── Retry ladder ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn ladder_runs_in_order_and_succeeds_at_point_seven() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, log) = pipeline_with(
        ScriptedEngine::new(Script::SucceedAfter(3)),
        config(dir.path(), dir.path()),
    );

    let out = pipeline
        .generate(RenderRequest::from_html("<h1>CV</h1>"))
        .await
        .unwrap();

    assert_eq!(out.pdf, FAKE_PDF);
    assert_eq!(log.scales(), vec![None, Some(0.9), Some(0.8), Some(0.7)]);
    let trail: Vec<(f64, bool)> = out.attempts.iter().map(|a| (a.scale, a.succeeded)).collect();
    assert_eq!(
        trail,
        vec![(1.0, false), (0.9, false), (0.8, false), (0.7, true)]
    );
    assert_eq!(out.final_scale(), Some(0.7));
    assert_eq!(log.releases(), 1);

    // One screenshot per failed attempt.
    assert_eq!(log.screenshots.load(Ordering::SeqCst), 3);
    let shots: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("pdf_error_screenshot_"))
        .collect();
    assert_eq!(shots.len(), 3);
}

#[tokio::test]
async fn exhausted_ladder_surfaces_the_last_error() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, log) = pipeline_with(
        ScriptedEngine::new(Script::AlwaysFail),
        config(dir.path(), dir.path()),
    );

    let err = pipeline
        .generate(RenderRequest::from_html("<p>x</p>"))
        .await
        .unwrap_err();

    match &err {
        PipelineError::RenderExhausted {
            attempts,
            last_error,
        } => {
            assert_eq!(*attempts, 4);
            assert!(last_error.to_string().contains("scale 0.7"), "{last_error}");
        }
        other => panic!("expected RenderExhausted, got {other:?}"),
    }
    assert!(!err.is_client_error());
    assert_eq!(log.prints.lock().unwrap().len(), 4);
    assert_eq!(log.releases(), 1);
}

#[tokio::test]
async fn screenshots_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::builder()
        .static_root(dir.path())
        .debug_dir(dir.path())
        .capture_screenshots(false)
        .build()
        .unwrap();
    let (pipeline, log) = pipeline_with(ScriptedEngine::new(Script::AlwaysFail), config);

    let _ = pipeline.generate(RenderRequest::from_html("<p>x</p>")).await;

    assert_eq!(log.screenshots.load(Ordering::SeqCst), 0);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn custom_ladder_is_honoured() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::builder()
        .static_root(dir.path())
        .debug_dir(dir.path())
        .capture_screenshots(false)
        .retry_scales(vec![0.5])
        .build()
        .unwrap();
    let (pipeline, log) = pipeline_with(ScriptedEngine::new(Script::AlwaysFail), config);

    let err = pipeline
        .generate(RenderRequest::from_html("<p>x</p>"))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::RenderExhausted { attempts: 2, .. }));
    assert_eq!(log.scales(), vec![None, Some(0.5)]);
}

#[tokio::test]
async fn landscape_reaches_every_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, log) = pipeline_with(
        ScriptedEngine::new(Script::SucceedAfter(1)),
        config(dir.path(), dir.path()),
    );

    let mut request = RenderRequest::from_html("<p>wide</p>");
    request.landscape = true;
    pipeline.generate(request).await.unwrap();

    let prints = log.prints.lock().unwrap();
    assert_eq!(prints.len(), 2);
    assert!(prints.iter().all(|o| o.landscape));
    assert!(prints[0].prefer_css_page_size);
    assert!(!prints[1].prefer_css_page_size);
}

// ── Validation ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_request_never_reaches_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, log) = pipeline_with(ScriptedEngine::succeeding(), config(dir.path(), dir.path()));

    let err = pipeline.generate(RenderRequest::default()).await.unwrap_err();

    assert!(matches!(err, PipelineError::InvalidRequest));
    assert_eq!(log.open_count(), 0);
}

#[tokio::test]
async fn oversized_html_has_no_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let server = ImageServer::start().await;
    let (pipeline, log) = pipeline_with(ScriptedEngine::succeeding(), config(dir.path(), dir.path()));

    let img = server.url("/img.png");
    let mut html = format!(r#"<img src="{img}">"#);
    html.push_str(&"x".repeat(6 * 1024 * 1024));
    let mut request = RenderRequest::from_html(html);
    request.skipped_images = vec![img];

    let err = pipeline.generate(request).await.unwrap_err();

    assert!(matches!(err, PipelineError::PayloadTooLarge { .. }));
    assert!(err.is_client_error());
    assert_eq!(server.hits.load(Ordering::SeqCst), 0);
    assert_eq!(log.open_count(), 0);
}

#[tokio::test]
async fn url_request_is_navigated_without_inlining() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, log) = pipeline_with(ScriptedEngine::succeeding(), config(dir.path(), dir.path()));

    let out = pipeline
        .generate(RenderRequest::from_url("https://example.com/cv"))
        .await
        .unwrap();

    assert_eq!(out.pdf, FAKE_PDF);
    assert_eq!(
        log.opened.lock().unwrap().as_slice(),
        &[RenderSource::Url("https://example.com/cv".into())]
    );
    assert_eq!(out.inline.final_html_len, 0);
}

// ── Static inlining ──────────────────────────────────────────────────────────

#[tokio::test]
async fn static_images_are_inlined_and_bounded() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("images")).unwrap();
    std::fs::write(root.path().join("images/photo.png"), common::png_bytes(2048, 1024)).unwrap();
    std::fs::write(root.path().join("images/icon.png"), common::png_bytes(64, 64)).unwrap();

    let (pipeline, log) = pipeline_with(ScriptedEngine::succeeding(), config(root.path(), root.path()));

    let html = r#"<img src="/static/images/photo.png"><img src='https://portfolio.example/static/images/icon.png?v=2'><img src="/static/images/gone.png">"#;
    let out = pipeline.generate(RenderRequest::from_html(html)).await.unwrap();

    let rendered = log.opened_html().unwrap();
    assert!(!rendered.contains("/static/images/photo.png"));
    assert!(!rendered.contains("icon.png"));
    assert!(rendered.contains(r#"src="/static/images/gone.png""#));

    let uris = data_uris(&rendered);
    assert_eq!(uris.len(), 2);
    assert_eq!(uris[0].0, "image/png");
    let photo = image::load_from_memory(&uris[0].1).unwrap();
    assert_eq!((photo.width(), photo.height()), (1024, 512));
    let icon = image::load_from_memory(&uris[1].1).unwrap();
    assert_eq!((icon.width(), icon.height()), (64, 64));

    assert_eq!(out.inline.static_inlined, 2);
    assert_eq!(out.inline.static_failed, 1);
    assert_eq!(out.inline.final_html_len, rendered.len());
}

#[tokio::test]
async fn traversal_outside_static_root_is_not_read() {
    let outer = tempfile::tempdir().unwrap();
    let root = outer.path().join("static");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(outer.path().join("secret.png"), common::png_bytes(10, 10)).unwrap();

    let (pipeline, log) = pipeline_with(ScriptedEngine::succeeding(), config(&root, outer.path()));

    let html = r#"<img src="/static/%2e%2e/secret.png">"#;
    let out = pipeline.generate(RenderRequest::from_html(html)).await.unwrap();

    assert_eq!(log.opened_html().unwrap(), html);
    assert_eq!(out.inline.static_failed, 1);
}

// ── Remote reconciliation ────────────────────────────────────────────────────

#[tokio::test]
async fn skipped_remote_images_are_fetched_and_inlined() {
    let dir = tempfile::tempdir().unwrap();
    let server = ImageServer::start().await;
    let (pipeline, log) = pipeline_with(ScriptedEngine::succeeding(), config(dir.path(), dir.path()));

    let img = server.url("/img.png");
    let html = format!(r#"<img src="{img}"><p>again</p><img src="{img}">"#);
    let mut request = RenderRequest::from_html(html);
    request.skipped_images = vec![img.clone(), img.clone()];

    let out = pipeline.generate(request).await.unwrap();

    let rendered = log.opened_html().unwrap();
    assert!(!rendered.contains(&img));
    let uris = data_uris(&rendered);
    assert_eq!(uris.len(), 2);
    let decoded = image::load_from_memory(&uris[0].1).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (1024, 512));
    // Duplicates are fetched once.
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
    assert_eq!(out.inline.remote_inlined, 1);
}

#[tokio::test]
async fn slow_or_broken_remote_images_are_left_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let server = ImageServer::start().await;
    let (pipeline, log) = pipeline_with(ScriptedEngine::succeeding(), config(dir.path(), dir.path()));

    let small = server.url("/small.png");
    let slow = server.url("/slow.png");
    let missing = server.url("/missing.png");
    let html = format!(
        r#"<img src="{small}"><img src="{slow}"><img src="{missing}"><img src="ftp://files.example/a.png">"#
    );
    let mut request = RenderRequest::from_html(html);
    request.skipped_images = vec![
        small.clone(),
        slow.clone(),
        missing.clone(),
        "ftp://files.example/a.png".to_string(),
    ];

    let out = pipeline.generate(request).await.unwrap();

    let rendered = log.opened_html().unwrap();
    assert!(!rendered.contains(&small));
    assert!(rendered.contains(&format!(r#"src="{slow}""#)));
    assert!(rendered.contains(&format!(r#"src="{missing}""#)));
    assert!(rendered.contains(r#"src="ftp://files.example/a.png""#));
    assert_eq!(out.inline.remote_inlined, 1);
    assert_eq!(out.inline.remote_failed, 3);
    assert_eq!(out.pdf, FAKE_PDF);
}

fn assert_send<T: Send>(_: &T) {}

#[tokio::test]
async fn generate_runs_on_a_spawned_task() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("images")).unwrap();
    std::fs::write(dir.path().join("images/me.png"), common::png_bytes(40, 20)).unwrap();
    let server = ImageServer::start().await;
    let (pipeline, log) = pipeline_with(ScriptedEngine::succeeding(), config(dir.path(), dir.path()));
    let pipeline = Arc::new(pipeline);

    let small = server.url("/small.png");
    let mut request = RenderRequest::from_html(format!(
        r#"<img src="/static/images/me.png"><img src="{small}">"#
    ));
    request.skipped_images = vec![small];

    let fut = {
        let pipeline = pipeline.clone();
        async move { pipeline.generate(request).await }
    };
    assert_send(&fut);
    let out = tokio::spawn(fut).await.unwrap().unwrap();

    assert_eq!(out.inline.static_inlined, 1);
    assert_eq!(out.inline.remote_inlined, 1);
    assert_eq!(data_uris(&log.opened_html().unwrap()).len(), 2);
}

// ── Deadline and progress ────────────────────────────────────────────────────

#[tokio::test]
async fn request_deadline_is_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::builder()
        .static_root(dir.path())
        .debug_dir(dir.path())
        .request_timeout_secs(1)
        .build()
        .unwrap();
    let (pipeline, _log) = pipeline_with(ScriptedEngine::new(Script::HangOnOpen), config);

    let err = pipeline
        .generate(RenderRequest::from_html("<p>x</p>"))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::DeadlineExceeded { secs: 1 }));
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl RenderProgressCallback for Recorder {
    fn on_request_start(&self, remote_images: usize) {
        self.events.lock().unwrap().push(format!("start {remote_images}"));
    }

    fn on_attempt_start(&self, attempt: usize, scale: f64) {
        self.events.lock().unwrap().push(format!("attempt {attempt} {scale}"));
    }

    fn on_attempt_failed(&self, attempt: usize, _scale: f64, _error: &str) {
        self.events.lock().unwrap().push(format!("failed {attempt}"));
    }

    fn on_render_complete(&self, _pdf_bytes: usize, attempts: usize) {
        self.events.lock().unwrap().push(format!("done {attempts}"));
    }
}

#[tokio::test]
async fn progress_callback_sees_every_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let config = PipelineConfig::builder()
        .static_root(dir.path())
        .debug_dir(dir.path())
        .capture_screenshots(false)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let (pipeline, _log) = pipeline_with(ScriptedEngine::new(Script::SucceedAfter(1)), config);

    pipeline
        .generate(RenderRequest::from_html("<p>x</p>"))
        .await
        .unwrap();

    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec!["start 0", "attempt 1 1", "failed 1", "attempt 2 0.9", "done 2"]
    );
}

#[tokio::test]
async fn render_to_file_writes_the_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, _log) = pipeline_with(ScriptedEngine::succeeding(), config(dir.path(), dir.path()));
    let target = dir.path().join("out/cv.pdf");

    pipeline
        .render_to_file(RenderRequest::from_html("<p>x</p>"), &target)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&target).unwrap(), FAKE_PDF);
    assert!(!dir.path().join("out/cv.pdf.tmp").exists());
}
