//! ImageMagick `compare`.
//!
//! `compare -metric M a b out` prints the metric on stderr and exits 0 when
//! the images match, 1 when they differ and 2 or more on error.

use std::collections::BTreeMap;

use tracing::debug;

use super::{
    exit_reason, existing, first_number, path_arg, AdapterContext, AdapterResult, ToolOutput,
    ToolRunner,
};
use crate::domain::{keys, BackendFailure, BackendKind, MetricRecord};

const DIFF_IMAGE: &str = "imagemagick_diff.png";
const PSNR_CAP_DB: f64 = 100.0;

pub(super) async fn compare(runner: &dyn ToolRunner, ctx: &AdapterContext<'_>) -> AdapterResult {
    let diff_path = ctx.artifact(DIFF_IMAGE);
    let diff_arg = path_arg(&diff_path);

    let mut raw = BTreeMap::new();
    let mut approximation = None;

    let ssim_output = run_metric(runner, ctx, "SSIM", &diff_arg).await?;
    let ssim = match metric_value(&ssim_output) {
        Ok(ssim) => ssim,
        Err(reason) => {
            debug!(%reason, "SSIM metric unsupported, falling back to MSE");
            let mse_output = run_metric(runner, ctx, "MSE", &diff_arg).await?;
            let mse = metric_value(&mse_output).map_err(|reason| {
                if mse_output.exit_code >= 2 {
                    BackendFailure::execution(reason)
                } else {
                    BackendFailure::unparsable(reason)
                }
            })?;
            raw.insert(keys::MSE.to_string(), mse);
            let scale = ctx.approximations.mse_scale;
            approximation = Some(format!("ssim derived from mse: max(0, 1 - mse/{scale})"));
            ssim_from_mse(mse, scale)
        }
    };
    raw.insert(keys::SSIM.to_string(), ssim);

    // PSNR and MAE are auxiliary; a failure here does not fail the backend.
    if let Some(psnr) = auxiliary_metric(runner, ctx, "PSNR").await {
        raw.insert(keys::PSNR.to_string(), psnr.min(PSNR_CAP_DB));
    }
    if let Some(mae) = auxiliary_metric(runner, ctx, "MAE").await {
        raw.insert(keys::MAE.to_string(), mae);
    }

    let mut record = MetricRecord::succeeded(BackendKind::PixelDiff, raw, ssim * 100.0)
        .with_interpretation(interpret_ssim(ssim));
    if let Some(note) = approximation {
        record = record.with_approximation(note);
    }
    if let Some(path) = existing(diff_path).await {
        record = record.with_artifact(path);
    }
    Ok(record)
}

async fn run_metric(
    runner: &dyn ToolRunner,
    ctx: &AdapterContext<'_>,
    metric: &str,
    output: &str,
) -> Result<ToolOutput, BackendFailure> {
    let args = vec![
        "-metric".to_string(),
        metric.to_string(),
        path_arg(ctx.reference),
        path_arg(ctx.candidate),
        output.to_string(),
    ];
    Ok(runner.run(&ctx.command(args), ctx.timeout).await?)
}

async fn auxiliary_metric(runner: &dyn ToolRunner, ctx: &AdapterContext<'_>, metric: &str) -> Option<f64> {
    match run_metric(runner, ctx, metric, "null:").await {
        Ok(output) => metric_value(&output)
            .map_err(|reason| debug!(metric, %reason, "auxiliary metric skipped"))
            .ok(),
        Err(failure) => {
            debug!(metric, %failure, "auxiliary metric skipped");
            None
        }
    }
}

/// Extract the metric from a `compare` run, honoring its exit convention.
fn metric_value(output: &ToolOutput) -> Result<f64, String> {
    if output.exit_code >= 2 || output.exit_code < 0 {
        return Err(exit_reason(output));
    }
    first_number(&output.stderr)
        .or_else(|| first_number(&output.stdout))
        .ok_or_else(|| format!("no metric value in output: {:?}", output.stderr.trim()))
}

pub(crate) fn ssim_from_mse(mse: f64, scale: f64) -> f64 {
    (1.0 - mse / scale).max(0.0)
}

pub(crate) fn interpret_ssim(ssim: f64) -> &'static str {
    if ssim > 0.99 {
        "Excellent similarity (>99%)"
    } else if ssim > 0.95 {
        "Very good similarity (95-99%)"
    } else if ssim > 0.90 {
        "Good similarity (90-95%)"
    } else if ssim > 0.80 {
        "Moderate similarity (80-90%)"
    } else {
        "Poor similarity (<80%)"
    }
}
