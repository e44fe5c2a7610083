//! Collaborators backed by external worker scripts.
//!
//! A script is run as `<program> <scripts_dir>/<script>` with one JSON
//! object on stdin. It answers with JSON lines on stdout, each tagged by
//! `type`:
//!
//! ```text
//! {"type":"progress","done":3,"total":120,"artifact":"clip_avatar_hmm_0002.png"}
//! {"type":"log","level":"info","message":"loaded model"}
//! {"type":"result","data":{...}}
//! {"type":"error","message":"...","kind":"missing_input"}
//! ```
//!
//! Lines that are not JSON are passed to `tracing` and otherwise ignored.
//! Exit code 3 means a missing input and 4 missing model artifacts, for
//! scripts that fail before they can emit an `error` line.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use emoscope_core::stage::FrameSource;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::collaborators::{
    AnalyzerParams, CollaboratorError, Collaborators, FeatureMatrix, FeatureTable,
    FrameRenderParams, FrameRenderer, PlotParams, PlotRenderer, RenderedFrames, VideoAnalyzer,
};
use crate::sink::ProgressSink;

const EXIT_MISSING_INPUT: i32 = 3;
const EXIT_MISSING_MODEL: i32 = 4;

/// Maximum size of one stdout line or of captured stderr (10 MiB).
///
/// Longer output is truncated; the rest of a stream is drained and dropped.
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Keep at most this much of a failed script's stderr in the error.
const STDERR_TAIL_BYTES: usize = 2048;

const EXTRACT_SCRIPT: &str = "extract_features.py";
const PLOT_SCRIPT: &str = "plot_emotions.py";
const FRAMES_SCRIPT: &str = "render_avatar_frames.py";
const FEATURE_TABLE_SCRIPT: &str = "feature_table.py";

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WorkerMessage {
    Progress {
        done: usize,
        total: usize,
        #[serde(default)]
        artifact: Option<String>,
    },
    Log {
        level: String,
        message: String,
    },
    Result {
        data: serde_json::Value,
    },
    Error {
        message: String,
        #[serde(default)]
        kind: Option<String>,
    },
}

/// What a script said on stdout before exiting.
#[derive(Default)]
struct Replies {
    result: Option<serde_json::Value>,
    failure: Option<(String, Option<String>)>,
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Spawns worker scripts and decodes their output.
///
/// Children are killed when their run is dropped, which happens on an I/O
/// error and when the runner's shutdown token fires.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    program: String,
    scripts_dir: PathBuf,
    model_dir: PathBuf,
    shutdown: CancellationToken,
}

impl ScriptRunner {
    pub fn new(
        program: impl Into<String>,
        scripts_dir: impl Into<PathBuf>,
        model_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            scripts_dir: scripts_dir.into(),
            model_dir: model_dir.into(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop every running script (and any started later) once `token` fires.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Blocking form of [`ScriptRunner::run_async`] for collaborator calls
    /// made from stage bodies.
    ///
    /// Drives the script on the ambient Tokio runtime, or on a private
    /// current-thread runtime when called outside one. Must not be called
    /// from an async task.
    pub fn run(
        &self,
        script: &str,
        input: &serde_json::Value,
        sink: Option<&dyn ProgressSink>,
    ) -> Result<serde_json::Value, CollaboratorError> {
        let work = self.run_async(script, input, sink);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle.block_on(work),
            Err(_) => tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?
                .block_on(work),
        }
    }

    /// Run `script` to completion and return the data of its `result` line.
    ///
    /// `progress` lines are forwarded to `sink` as they arrive.
    pub async fn run_async(
        &self,
        script: &str,
        input: &serde_json::Value,
        sink: Option<&dyn ProgressSink>,
    ) -> Result<serde_json::Value, CollaboratorError> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                tracing::warn!(script, "Worker script stopped at shutdown");
                Err(CollaboratorError::Failed(format!("{script} stopped: service shutting down")))
            }
            outcome = self.exchange(script, input, sink) => outcome,
        }
    }

    async fn exchange(
        &self,
        script: &str,
        input: &serde_json::Value,
        sink: Option<&dyn ProgressSink>,
    ) -> Result<serde_json::Value, CollaboratorError> {
        let script_path = self.scripts_dir.join(script);
        if !script_path.is_file() {
            return Err(CollaboratorError::Failed(format!(
                "worker script not found: {}",
                script_path.display()
            )));
        }
        let payload =
            serde_json::to_vec(input).map_err(|e| CollaboratorError::Protocol(e.to_string()))?;

        tracing::debug!(script, program = %self.program, "Spawning worker script");
        // Every early return below drops `child`, which kills the process.
        let mut child = Command::new(&self.program)
            .arg(&script_path)
            .env("EMOSCOPE_MODEL_DIR", &self.model_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            // A script may exit without reading its input.
            let _ = stdin.write_all(&payload).await;
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CollaboratorError::Protocol("stdout not captured".into()))?;
        let stderr = child.stderr.take();

        let (replies, stderr) = tokio::join!(
            read_replies(script, stdout, sink),
            read_capped(stderr)
        );
        let replies = replies?;
        let status = child.wait().await?;
        let stderr = String::from_utf8_lossy(&stderr);

        if let Some((message, kind)) = replies.failure {
            return Err(classify(kind.as_deref(), status.code(), message));
        }
        if !status.success() {
            let message = format!(
                "{script} exited with {status}: {}",
                tail(stderr.trim(), STDERR_TAIL_BYTES)
            );
            return Err(classify(None, status.code(), message));
        }
        replies
            .result
            .ok_or_else(|| CollaboratorError::Protocol(format!("{script} produced no result")))
    }
}

/// Decode stdout line by line. Bytes are decoded lossily and lines that are
/// not protocol messages are traced and skipped.
async fn read_replies<R: AsyncRead + Unpin>(
    script: &str,
    stdout: R,
    sink: Option<&dyn ProgressSink>,
) -> std::io::Result<Replies> {
    let mut reader = BufReader::new(stdout);
    let mut replies = Replies::default();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = (&mut reader)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_until(b'\n', &mut buf)
            .await?;
        if read == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<WorkerMessage>(line) {
            Ok(WorkerMessage::Progress {
                done,
                total,
                artifact,
            }) => {
                if let Some(sink) = sink {
                    sink.report(done, total, artifact.as_deref());
                }
            }
            Ok(WorkerMessage::Log { level, message }) => {
                tracing::debug!(script, level = %level, "{message}");
            }
            Ok(WorkerMessage::Result { data }) => replies.result = Some(data),
            Ok(WorkerMessage::Error { message, kind }) => replies.failure = Some((message, kind)),
            Err(_) => tracing::trace!(script, line = %line, "Unstructured worker output"),
        }
    }
    Ok(replies)
}

/// Read a stream into a buffer capped at [`MAX_OUTPUT_BYTES`], then drain
/// the rest so the writer never blocks on a full pipe.
async fn read_capped<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
        let _ = tokio::io::copy(&mut h, &mut tokio::io::sink()).await;
    }
    buf
}

fn classify(kind: Option<&str>, exit_code: Option<i32>, message: String) -> CollaboratorError {
    match (kind, exit_code) {
        (Some("missing_input"), _) | (None, Some(EXIT_MISSING_INPUT)) => {
            CollaboratorError::MissingInput(message)
        }
        (Some("missing_model"), _) | (None, Some(EXIT_MISSING_MODEL)) => {
            CollaboratorError::MissingModel(message)
        }
        _ => CollaboratorError::Failed(message),
    }
}

fn tail(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

fn decode<T: serde::de::DeserializeOwned>(
    script: &str,
    data: serde_json::Value,
) -> Result<T, CollaboratorError> {
    serde_json::from_value(data)
        .map_err(|e| CollaboratorError::Protocol(format!("{script} result: {e}")))
}

/// The four collaborators, all driven by `runner`.
pub fn script_collaborators(runner: Arc<ScriptRunner>) -> Collaborators {
    Collaborators {
        analyzer: Arc::new(ScriptVideoAnalyzer::new(Arc::clone(&runner))),
        plotter: Arc::new(ScriptPlotRenderer::new(Arc::clone(&runner))),
        frames: Arc::new(ScriptFrameRenderer::new(Arc::clone(&runner))),
        features: Arc::new(ScriptFeatureTable::new(runner)),
    }
}

// ---------------------------------------------------------------------------
// Implementations
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct WrittenArtifact {
    output: Option<PathBuf>,
}

pub struct ScriptVideoAnalyzer {
    runner: Arc<ScriptRunner>,
}

impl ScriptVideoAnalyzer {
    pub fn new(runner: Arc<ScriptRunner>) -> Self {
        Self { runner }
    }
}

impl VideoAnalyzer for ScriptVideoAnalyzer {
    fn run(
        &self,
        input: &Path,
        output: &Path,
        params: &AnalyzerParams,
    ) -> Result<PathBuf, CollaboratorError> {
        let data = self.runner.run(
            EXTRACT_SCRIPT,
            &json!({
                "input": input,
                "output": output,
                "target_fps": params.target_fps,
                "frame_stride": params.frame_stride,
                "confidence_threshold": params.confidence_threshold,
            }),
            None,
        )?;
        let written: WrittenArtifact = decode(EXTRACT_SCRIPT, data)?;
        Ok(written.output.unwrap_or_else(|| output.to_path_buf()))
    }
}

pub struct ScriptPlotRenderer {
    runner: Arc<ScriptRunner>,
}

impl ScriptPlotRenderer {
    pub fn new(runner: Arc<ScriptRunner>) -> Self {
        Self { runner }
    }
}

impl PlotRenderer for ScriptPlotRenderer {
    fn render(
        &self,
        input: &Path,
        output: &Path,
        params: &PlotParams,
    ) -> Result<PathBuf, CollaboratorError> {
        let data = self.runner.run(
            PLOT_SCRIPT,
            &json!({ "input": input, "output": output, "dpi": params.dpi }),
            None,
        )?;
        let written: WrittenArtifact = decode(PLOT_SCRIPT, data)?;
        Ok(written.output.unwrap_or_else(|| output.to_path_buf()))
    }
}

#[derive(Debug, Deserialize)]
struct FramesResult {
    fps: u32,
    #[serde(default)]
    frames: Vec<PathBuf>,
}

pub struct ScriptFrameRenderer {
    runner: Arc<ScriptRunner>,
}

impl ScriptFrameRenderer {
    pub fn new(runner: Arc<ScriptRunner>) -> Self {
        Self { runner }
    }
}

impl FrameRenderer for ScriptFrameRenderer {
    fn render(
        &self,
        input: &Path,
        output_prefix: &Path,
        params: &FrameRenderParams,
        progress: &dyn ProgressSink,
    ) -> Result<RenderedFrames, CollaboratorError> {
        let data = self.runner.run(
            FRAMES_SCRIPT,
            &json!({
                "input": input,
                "output_prefix": output_prefix,
                "source": params.source,
                "fps": params.fps,
                "dpi": params.dpi,
                "limit": params.limit,
            }),
            Some(progress),
        )?;
        let rendered: FramesResult = decode(FRAMES_SCRIPT, data)?;
        Ok(RenderedFrames {
            fps: rendered.fps,
            frames: rendered.frames,
        })
    }
}

pub struct ScriptFeatureTable {
    runner: Arc<ScriptRunner>,
}

impl ScriptFeatureTable {
    pub fn new(runner: Arc<ScriptRunner>) -> Self {
        Self { runner }
    }
}

#[derive(Debug, Deserialize)]
struct MatrixResult {
    columns: Vec<String>,
    rows: Vec<Vec<Option<f64>>>,
}

impl FeatureTable for ScriptFeatureTable {
    fn load(&self, input: &Path, source: FrameSource) -> Result<FeatureMatrix, CollaboratorError> {
        let data = self.runner.run(
            FEATURE_TABLE_SCRIPT,
            &json!({ "input": input, "source": source }),
            None,
        )?;
        let matrix: MatrixResult = decode(FEATURE_TABLE_SCRIPT, data)?;
        // JSON has no NaN; scripts send null for missing values.
        let rows = matrix
            .rows
            .into_iter()
            .map(|row| row.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
            .collect();
        Ok(FeatureMatrix {
            columns: matrix.columns,
            rows,
        })
    }
}
