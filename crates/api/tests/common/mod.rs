#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use emoscope_core::stage::FrameSource;
use emoscope_pipeline::collaborators::{
    AnalyzerParams, CollaboratorError, Collaborators, FeatureMatrix, FeatureTable,
    FrameRenderParams, FrameRenderer, PlotParams, PlotRenderer, RenderedFrames, VideoAnalyzer,
};
use emoscope_pipeline::registry::JobRegistry;
use emoscope_pipeline::service::AnalysisService;
use emoscope_pipeline::sink::ProgressSink;
use emoscope_pipeline::stages::StageContext;
use emoscope_pipeline::store::LocalArtifactStore;
use http_body_util::BodyExt;
use tower::ServiceExt;

use emoscope_api::config::ServerConfig;
use emoscope_api::router::build_app_router;
use emoscope_api::state::AppState;

/// Build a test `ServerConfig` rooted at `artifact_root`.
///
/// Uses `http://localhost:4200` as CORS origin (matching the dev default).
pub fn test_config(artifact_root: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:4200".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        worker_slots: 2,
        job_log_capacity: 500,
        job_retention_secs: 3600,
        data_page_size: 50,
        artifact_root: artifact_root.to_path_buf(),
        artifact_base_url: "/api/v1/artifacts/".to_string(),
        worker_program: "python3".to_string(),
        worker_scripts_dir: PathBuf::from("./workers"),
        model_artifacts_dir: PathBuf::from("./artifacts"),
    }
}

// ---------------------------------------------------------------------------
// Fake collaborators
// ---------------------------------------------------------------------------

/// Writes a small CSV. When gated, each call blocks until the gate is
/// released or its sender dropped.
#[derive(Default)]
pub struct FakeAnalyzer {
    pub gate: Option<Mutex<mpsc::Receiver<()>>>,
}

impl VideoAnalyzer for FakeAnalyzer {
    fn run(
        &self,
        _input: &Path,
        output: &Path,
        _params: &AnalyzerParams,
    ) -> Result<PathBuf, CollaboratorError> {
        if let Some(gate) = &self.gate {
            let _ = gate.lock().unwrap().recv();
        }
        std::fs::write(output, "frame,AU01\n0,0.5\n")?;
        Ok(output.to_path_buf())
    }
}

pub struct FakePlotter;

impl PlotRenderer for FakePlotter {
    fn render(
        &self,
        _input: &Path,
        output: &Path,
        _params: &PlotParams,
    ) -> Result<PathBuf, CollaboratorError> {
        std::fs::write(output, b"png")?;
        Ok(output.to_path_buf())
    }
}

/// Renders three frames for any source without reporting progress.
pub struct FakeFrameRenderer;

impl FrameRenderer for FakeFrameRenderer {
    fn render(
        &self,
        _input: &Path,
        output_prefix: &Path,
        params: &FrameRenderParams,
        _progress: &dyn ProgressSink,
    ) -> Result<RenderedFrames, CollaboratorError> {
        let prefix = output_prefix.to_string_lossy();
        let mut frames = Vec::new();
        for index in 0..3 {
            let path = PathBuf::from(format!("{prefix}_{index:04}.png"));
            std::fs::write(&path, b"png")?;
            frames.push(path);
        }
        Ok(RenderedFrames {
            fps: params.fps,
            frames,
        })
    }
}

pub struct FakeFeatureTable {
    pub rows: usize,
}

impl FeatureTable for FakeFeatureTable {
    fn load(&self, _input: &Path, _source: FrameSource) -> Result<FeatureMatrix, CollaboratorError> {
        Ok(FeatureMatrix {
            columns: vec!["valence".into(), "arousal".into()],
            rows: (0..self.rows).map(|i| vec![i as f64, 0.5]).collect(),
        })
    }
}

pub fn fake_collaborators(analyzer: FakeAnalyzer) -> Collaborators {
    Collaborators {
        analyzer: Arc::new(analyzer),
        plotter: Arc::new(FakePlotter),
        frames: Arc::new(FakeFrameRenderer),
        features: Arc::new(FakeFeatureTable { rows: 120 }),
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// A router over a temporary artifact directory plus handles into its
/// service for assertions.
pub struct TestApp {
    pub router: Router,
    pub service: Arc<AnalysisService>,
    pub dir: tempfile::TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with(FakeAnalyzer::default(), 2)
    }

    /// One worker slot and an analyzer that blocks until `gate` fires.
    pub fn gated() -> (mpsc::Sender<()>, Self) {
        let (tx, rx) = mpsc::channel();
        let analyzer = FakeAnalyzer {
            gate: Some(Mutex::new(rx)),
        };
        (tx, Self::with(analyzer, 1))
    }

    fn with(analyzer: FakeAnalyzer, worker_slots: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.worker_slots = worker_slots;

        let registry = Arc::new(JobRegistry::with_log_capacity(config.job_log_capacity));
        let store = Arc::new(LocalArtifactStore::new(
            config.artifact_root.clone(),
            config.artifact_base_url.clone(),
        ));
        let ctx = StageContext::new(registry, store, fake_collaborators(analyzer));
        let service = Arc::new(AnalysisService::new(
            ctx,
            config.worker_slots,
            config.data_page_size,
        ));

        let state = AppState {
            service: Arc::clone(&service),
        };
        let router = build_app_router(state, &config);

        Self {
            router,
            service,
            dir,
        }
    }

    /// Put an input artifact into the store.
    pub fn put(&self, name: &str) {
        std::fs::write(self.dir.path().join(name), b"input").unwrap();
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        get(self.router.clone(), uri).await
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> Response<Body> {
        post_json(self.router.clone(), uri, body).await
    }

    /// Submit to `/api/v1/analyze/{stage}` and return the new job id.
    pub async fn submit(&self, stage: &str, body: serde_json::Value) -> String {
        let response = self.post_json(&format!("/api/v1/analyze/{stage}"), body).await;
        assert_eq!(response.status(), axum::http::StatusCode::ACCEPTED);
        let json = body_json(response).await;
        json["data"]["job_id"].as_str().unwrap().to_string()
    }

    /// Poll `/api/v1/jobs/{id}` until the job is terminal and return its view.
    pub async fn wait_terminal(&self, job_id: &str) -> serde_json::Value {
        for _ in 0..500 {
            let json = body_json(self.get(&format!("/api/v1/jobs/{job_id}")).await).await;
            let status = json["data"]["status"].as_str().unwrap_or_default().to_string();
            if matches!(status.as_str(), "done" | "error" | "canceled") {
                return json["data"].clone();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} did not finish");
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_empty(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
