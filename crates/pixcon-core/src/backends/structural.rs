//! `dssim`: prints `<dissimilarity>\t<path>` for the second image.

use std::collections::BTreeMap;

use super::{path_arg, parse_number, run_checked, AdapterContext, AdapterResult, ToolRunner};
use crate::domain::{keys, BackendFailure, BackendKind, MetricRecord};

pub(super) async fn compare(runner: &dyn ToolRunner, ctx: &AdapterContext<'_>) -> AdapterResult {
    let output = run_checked(
        runner,
        ctx,
        vec![path_arg(ctx.reference), path_arg(ctx.candidate)],
    )
    .await?;

    let dssim = parse_dssim(&output.stdout)?;
    let similarity = 1.0 - dssim;

    let raw = BTreeMap::from([
        (keys::DSSIM.to_string(), dssim),
        (keys::SSIM_EQUIVALENT.to_string(), similarity),
    ]);
    Ok(
        MetricRecord::succeeded(BackendKind::StructuralSimilarity, raw, similarity * 100.0)
            .with_interpretation(interpret_dssim(dssim)),
    )
}

fn parse_dssim(stdout: &str) -> Result<f64, BackendFailure> {
    stdout
        .split_whitespace()
        .next()
        .and_then(parse_number)
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| BackendFailure::unparsable(format!("expected dssim value, got {:?}", stdout.trim())))
}

pub(crate) fn interpret_dssim(dssim: f64) -> &'static str {
    if dssim < 0.01 {
        "Excellent structural similarity"
    } else if dssim < 0.05 {
        "Very good structural similarity"
    } else if dssim < 0.10 {
        "Good structural similarity"
    } else if dssim < 0.20 {
        "Moderate structural similarity"
    } else {
        "Poor structural similarity"
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use super::super::fakes::{Scripted, ScriptedRunner};
    use super::*;
    use crate::config::Approximations;
    use crate::domain::Invocation;

    async fn run(runner: &ScriptedRunner) -> MetricRecord {
        let inv = Invocation::new("dssim", &[]);
        let approximations = Approximations::default();
        let ctx = AdapterContext {
            invocation: &inv,
            reference: Path::new("ref.png"),
            candidate: Path::new("cand.png"),
            artifact_dir: Path::new("artifacts"),
            timeout: Duration::from_secs(5),
            approximations: &approximations,
        };
        super::super::compare(BackendKind::StructuralSimilarity, runner, &ctx).await
    }

    #[tokio::test]
    async fn test_parses_tab_separated_output() {
        let runner = ScriptedRunner::new();
        runner
            .install("dssim", "dssim 3.2.3")
            .on("dssim", &["ref.png"], Scripted::stdout(0, "0.034\tcand.png\n"));

        let record = run(&runner).await;
        assert!(record.success);
        assert_eq!(record.metric(keys::DSSIM), Some(0.034));
        assert!((record.normalized_score.unwrap() - 96.6).abs() < 1e-9);
        assert_eq!(record.interpretation.as_deref(), Some("Very good structural similarity"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_execution_failure() {
        let runner = ScriptedRunner::new();
        runner
            .install("dssim", "dssim 3.2.3")
            .on("dssim", &["ref.png"], Scripted::stderr(1, "error: can't load cand.png"));

        let record = run(&runner).await;
        assert!(matches!(record.failure, Some(BackendFailure::ExecutionFailed { .. })));
    }

    #[tokio::test]
    async fn test_non_numeric_output_is_unparsable() {
        let runner = ScriptedRunner::new();
        runner
            .install("dssim", "dssim 3.2.3")
            .on("dssim", &["ref.png"], Scripted::stdout(0, "usage: dssim file1 file2"));

        let record = run(&runner).await;
        assert!(matches!(record.failure, Some(BackendFailure::Unparsable { .. })));
    }

    #[test]
    fn test_dissimilarity_above_one_clamps_score() {
        assert_eq!(parse_dssim("1.7\tb.png").unwrap(), 1.7);
        let rec = MetricRecord::succeeded(BackendKind::StructuralSimilarity, BTreeMap::new(), (1.0 - 1.7) * 100.0);
        assert_eq!(rec.normalized_score, Some(0.0));
        assert_eq!(interpret_dssim(1.7), "Poor structural similarity");
    }
}
