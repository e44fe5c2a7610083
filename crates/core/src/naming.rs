//! Artifact naming conventions shared by stages and renderers.

use std::sync::LazyLock;

use regex::Regex;

/// Characters outside the artifact-name alphabet, in runs.
static UNSAFE_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid regex"));

/// Replace every run of characters outside `[A-Za-z0-9._-]` with `_`.
///
/// Returns `"out"` for an input that sanitizes to nothing.
pub fn safe_name(base: &str) -> String {
    let out = UNSAFE_RUN_RE.replace_all(base, "_");
    if out.is_empty() {
        "out".to_string()
    } else {
        out.into_owned()
    }
}

/// File stem of an artifact reference (`clip.final.mp4` -> `clip.final`).
pub fn stem(reference: &str) -> &str {
    match reference.rfind('.') {
        Some(0) | None => reference,
        Some(pos) => &reference[..pos],
    }
}

/// Name of the `index`-th (zero-based) frame rendered under `prefix`.
pub fn frame_artifact_name(prefix: &str, index: usize) -> String {
    format!("{prefix}_{index:04}.png")
}

/// Default CSV name produced by the extract stage for `input`.
pub fn analysis_csv_name(input: &str) -> String {
    format!("{}_analysis.csv", safe_name(stem(input)))
}

/// Default plot name produced by the plot stage for `input`.
pub fn emotions_plot_name(input: &str) -> String {
    format!("{}_emotions.png", safe_name(stem(input)))
}

/// Frame prefix for the frames stage, per avatar source.
pub fn avatar_frame_prefix(input: &str, source: &str) -> String {
    format!("{}_avatar_{}", safe_name(stem(input)), source)
}
