//! Emotions-over-time plot for a prior extraction CSV.

use emoscope_core::job::JobPatch;
use emoscope_core::naming::emotions_plot_name;
use emoscope_core::progress::PLOT;
use emoscope_core::stage::PlotRequest;
use serde::Serialize;

use super::{artifact_name, JobHandle, SoftFailure, StageContext, StageError};
use crate::collaborators::{CollaboratorError, PlotParams};

#[derive(Debug, Clone, Serialize)]
pub struct PlotOutcome {
    pub emo_url: Option<String>,
    pub soft_failures: Vec<SoftFailure>,
}

pub(super) fn run(
    ctx: &StageContext,
    job: &JobHandle<'_>,
    req: &PlotRequest,
) -> Result<PlotOutcome, StageError> {
    let input = ctx.locate_input(&req.input)?;
    job.step(&format!("Rendering emotions plot for {}", req.input), PLOT.start);

    let requested = req
        .output
        .clone()
        .unwrap_or_else(|| emotions_plot_name(&req.input));
    let params = PlotParams { dpi: req.dpi };
    let rendered = ctx
        .store
        .output_path(&requested)
        .map_err(CollaboratorError::from)
        .and_then(|output| ctx.collaborators.plotter.render(&input, &output, &params));

    let mut soft_failures = Vec::new();
    let emo_url = match rendered {
        Ok(written) => {
            let url = ctx.store.url_for(&artifact_name(&written, &requested));
            job.update(JobPatch {
                emo_url: Some(url.clone()),
                ..Default::default()
            });
            job.step("Emotions plot rendered", PLOT.end);
            Some(url)
        }
        Err(e) => {
            soft_failures.push(job.soft_failure("Emotions plot", e.to_string()));
            None
        }
    };

    Ok(PlotOutcome {
        emo_url,
        soft_failures,
    })
}
