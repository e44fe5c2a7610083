#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use emoscope_core::job::JobView;
use emoscope_core::naming::frame_artifact_name;
use emoscope_core::stage::{FrameSource, StageRequest};
use emoscope_core::types::JobId;
use emoscope_pipeline::collaborators::{
    AnalyzerParams, CollaboratorError, Collaborators, FeatureMatrix, FeatureTable,
    FrameRenderParams, FrameRenderer, PlotParams, PlotRenderer, RenderedFrames, VideoAnalyzer,
};
use emoscope_pipeline::registry::JobRegistry;
use emoscope_pipeline::service::AnalysisService;
use emoscope_pipeline::sink::ProgressSink;
use emoscope_pipeline::stages::StageContext;
use emoscope_pipeline::store::LocalArtifactStore;

pub const BASE_URL: &str = "/api/v1/artifacts/";

// ---------------------------------------------------------------------------
// Fake collaborators
// ---------------------------------------------------------------------------

/// Writes a tiny CSV to the requested output. Counts its calls and, when
/// gated, blocks each call until the gate is released or dropped.
#[derive(Default)]
pub struct FakeAnalyzer {
    pub calls: AtomicUsize,
    pub gate: Option<Mutex<mpsc::Receiver<()>>>,
}

impl FakeAnalyzer {
    pub fn gated() -> (mpsc::Sender<()>, Self) {
        let (tx, rx) = mpsc::channel();
        let analyzer = Self {
            calls: AtomicUsize::new(0),
            gate: Some(Mutex::new(rx)),
        };
        (tx, analyzer)
    }
}

impl VideoAnalyzer for FakeAnalyzer {
    fn run(
        &self,
        _input: &Path,
        output: &Path,
        _params: &AnalyzerParams,
    ) -> Result<PathBuf, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _ = gate.lock().unwrap().recv();
        }
        std::fs::write(output, "frame,AU01,AU02\n0,0.1,0.2\n")?;
        Ok(output.to_path_buf())
    }
}

/// Succeeds by writing a placeholder image, or always fails.
pub struct FakePlotter {
    pub fail: bool,
}

impl PlotRenderer for FakePlotter {
    fn render(
        &self,
        _input: &Path,
        output: &Path,
        _params: &PlotParams,
    ) -> Result<PathBuf, CollaboratorError> {
        if self.fail {
            return Err(CollaboratorError::Failed("renderer crashed".into()));
        }
        std::fs::write(output, b"png")?;
        Ok(output.to_path_buf())
    }
}

/// Renders a fixed number of frames per source, reporting each through the
/// sink before returning. Sources missing from the map render nothing.
/// `fail_after` makes one source crash once it has streamed that many frames.
pub struct FakeFrameRenderer {
    pub frames_per_source: HashMap<FrameSource, usize>,
    pub name_artifacts: bool,
    pub report_progress: bool,
    pub fail_after: Option<(FrameSource, usize)>,
    pub calls: Mutex<Vec<FrameSource>>,
}

impl FakeFrameRenderer {
    pub fn new(frames_per_source: &[(FrameSource, usize)]) -> Self {
        Self {
            frames_per_source: frames_per_source.iter().copied().collect(),
            name_artifacts: false,
            report_progress: true,
            fail_after: None,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FrameRenderer for FakeFrameRenderer {
    fn render(
        &self,
        _input: &Path,
        output_prefix: &Path,
        params: &FrameRenderParams,
        progress: &dyn ProgressSink,
    ) -> Result<RenderedFrames, CollaboratorError> {
        self.calls.lock().unwrap().push(params.source);
        let mut total = self
            .frames_per_source
            .get(&params.source)
            .copied()
            .unwrap_or(0);
        if let Some(limit) = params.limit {
            total = total.min(limit);
        }

        let prefix = output_prefix.to_string_lossy().to_string();
        let mut frames = Vec::with_capacity(total);
        for index in 0..total {
            let path = PathBuf::from(frame_artifact_name(&prefix, index));
            std::fs::write(&path, b"png")?;
            if self.report_progress {
                let name = path.file_name().and_then(|n| n.to_str()).map(str::to_string);
                let artifact = if self.name_artifacts { name.as_deref() } else { None };
                progress.report(index + 1, total, artifact);
            }
            frames.push(path);
            if self.fail_after == Some((params.source, index + 1)) {
                return Err(CollaboratorError::Failed("renderer crashed mid-stream".into()));
            }
        }
        Ok(RenderedFrames {
            fps: params.fps,
            frames,
        })
    }
}

/// Produces `rows` rows over two columns; every seventh value is NaN. When
/// gated, `load` blocks until the gate is released or dropped.
pub struct FakeFeatureTable {
    pub rows: usize,
    pub gate: Option<Mutex<mpsc::Receiver<()>>>,
}

impl FakeFeatureTable {
    pub fn new(rows: usize) -> Self {
        Self { rows, gate: None }
    }

    pub fn gated(rows: usize) -> (mpsc::Sender<()>, Self) {
        let (tx, rx) = mpsc::channel();
        let table = Self {
            rows,
            gate: Some(Mutex::new(rx)),
        };
        (tx, table)
    }
}

impl FeatureTable for FakeFeatureTable {
    fn load(&self, _input: &Path, _source: FrameSource) -> Result<FeatureMatrix, CollaboratorError> {
        if let Some(gate) = &self.gate {
            let _ = gate.lock().unwrap().recv();
        }
        let rows = (0..self.rows)
            .map(|i| {
                let first = if i % 7 == 6 { f64::NAN } else { i as f64 };
                vec![first, i as f64 / 10.0]
            })
            .collect();
        Ok(FeatureMatrix {
            columns: vec!["valence".into(), "arousal".into()],
            rows,
        })
    }
}

pub fn fake_collaborators() -> Collaborators {
    Collaborators {
        analyzer: Arc::new(FakeAnalyzer::default()),
        plotter: Arc::new(FakePlotter { fail: false }),
        frames: Arc::new(FakeFrameRenderer::new(&[
            (FrameSource::Hmm, 4),
            (FrameSource::Real, 4),
        ])),
        features: Arc::new(FakeFeatureTable::new(125)),
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub service: AnalysisService,
    pub registry: Arc<JobRegistry>,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(collaborators: Collaborators, worker_slots: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(JobRegistry::new());
        let store = Arc::new(LocalArtifactStore::new(dir.path(), BASE_URL));
        let ctx = StageContext::new(Arc::clone(&registry), store, collaborators);
        let service = AnalysisService::new(ctx, worker_slots, 50);
        Self {
            service,
            registry,
            dir,
        }
    }

    /// Put an input artifact into the store.
    pub fn put(&self, name: &str) {
        std::fs::write(self.dir.path().join(name), b"input").unwrap();
    }

    pub fn artifact_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).is_file()
    }

    /// Poll until the job is terminal, recording every observed view.
    pub async fn poll_until_terminal(&self, id: JobId) -> Vec<JobView> {
        let mut trace = Vec::new();
        for _ in 0..1000 {
            let view = self.service.status(id).unwrap();
            let terminal = view.status.is_terminal();
            trace.push(view);
            if terminal {
                return trace;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {id} did not finish");
    }

    pub async fn wait_terminal(&self, id: JobId) -> JobView {
        self.poll_until_terminal(id)
            .await
            .pop()
            .unwrap()
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub fn extract(body: serde_json::Value) -> StageRequest {
    StageRequest::Extract(serde_json::from_value(body).unwrap())
}

pub fn plot(body: serde_json::Value) -> StageRequest {
    StageRequest::Plot(serde_json::from_value(body).unwrap())
}

pub fn frames(body: serde_json::Value) -> StageRequest {
    StageRequest::Frames(serde_json::from_value(body).unwrap())
}
