//! `vips avg` / `vips deviate`: per-image intensity statistics.
//!
//! Both means are required. Standard deviations are informational only and
//! are abandoned once [`OPTIONAL_SHARE`] of the backend budget has passed, so
//! a stalled `deviate` never costs the backend its means.

use std::collections::BTreeMap;
use std::path::Path;

use tokio::time::Instant;
use tracing::debug;

use super::{path_arg, parse_number, run_checked, AdapterContext, AdapterResult, ToolRunner};
use crate::domain::{keys, BackendFailure, BackendKind, MetricRecord};

/// Share of the backend timeout after which optional runs are dropped.
const OPTIONAL_SHARE: f64 = 0.8;

pub(super) async fn compare(runner: &dyn ToolRunner, ctx: &AdapterContext<'_>) -> AdapterResult {
    let started = Instant::now();
    let (mean_a, mean_b) = futures::join!(
        statistic(runner, ctx, "avg", ctx.reference),
        statistic(runner, ctx, "avg", ctx.candidate),
    );
    let (mean_a, mean_b) = (mean_a?, mean_b?);

    let cutoff = started + ctx.timeout.mul_f64(OPTIONAL_SHARE);
    let deviations = tokio::time::timeout_at(cutoff, async {
        futures::join!(
            statistic(runner, ctx, "deviate", ctx.reference),
            statistic(runner, ctx, "deviate", ctx.candidate),
        )
    })
    .await;

    let range = ctx.approximations.intensity_range;
    let mean_difference = (mean_a - mean_b).abs();
    let similarity = similarity_estimate(mean_a, mean_b, range);

    let mut raw = BTreeMap::from([
        (keys::MEAN_A.to_string(), mean_a),
        (keys::MEAN_B.to_string(), mean_b),
        (keys::MEAN_DIFFERENCE.to_string(), mean_difference),
        (keys::SIMILARITY_ESTIMATE.to_string(), similarity),
    ]);
    match deviations {
        Ok((Ok(dev_a), Ok(dev_b))) => {
            raw.insert(keys::STDDEV_A.to_string(), dev_a);
            raw.insert(keys::STDDEV_B.to_string(), dev_b);
            raw.insert(keys::STDDEV_DIFFERENCE.to_string(), (dev_a - dev_b).abs());
        }
        Ok((a, b)) => debug!(?a, ?b, "standard deviation unavailable"),
        Err(_) => debug!(
            limit_ms = ctx.timeout.mul_f64(OPTIONAL_SHARE).as_millis() as u64,
            "standard deviation timed out"
        ),
    }

    Ok(
        MetricRecord::succeeded(BackendKind::StatisticalProfile, raw, similarity * 100.0)
            .with_interpretation(format!("{:.1}% mean intensity similarity", similarity * 100.0))
            .with_approximation(format!(
                "similarity = max(0, 1 - |mean_a - mean_b| / {range})"
            )),
    )
}

async fn statistic(
    runner: &dyn ToolRunner,
    ctx: &AdapterContext<'_>,
    operation: &str,
    image: &Path,
) -> Result<f64, BackendFailure> {
    let output = run_checked(runner, ctx, vec![operation.to_string(), path_arg(image)]).await?;
    parse_number(output.stdout.trim()).filter(|v| v.is_finite()).ok_or_else(|| {
        BackendFailure::unparsable(format!(
            "vips {operation} printed {:?} for {}",
            output.stdout.trim(),
            image.display()
        ))
    })
}

pub(crate) fn similarity_estimate(mean_a: f64, mean_b: f64, range: f64) -> f64 {
    (1.0 - (mean_a - mean_b).abs() / range).max(0.0)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::fakes::{Scripted, ScriptedRunner};
    use super::*;
    use crate::config::Approximations;
    use crate::domain::Invocation;

    async fn run(runner: &ScriptedRunner) -> MetricRecord {
        let inv = Invocation::new("vips", &[]);
        let approximations = Approximations::default();
        let ctx = AdapterContext {
            invocation: &inv,
            reference: Path::new("ref.png"),
            candidate: Path::new("cand.png"),
            artifact_dir: Path::new("artifacts"),
            timeout: Duration::from_secs(5),
            approximations: &approximations,
        };
        super::super::compare(BackendKind::StatisticalProfile, runner, &ctx).await
    }

    fn vips() -> ScriptedRunner {
        let runner = ScriptedRunner::new();
        runner.install("vips", "vips-8.15.1");
        runner
    }

    #[tokio::test]
    async fn test_means_and_deviations() {
        let runner = vips();
        runner
            .on("vips", &["avg", "ref.png"], Scripted::stdout(0, "127.5\n"))
            .on("vips", &["avg", "cand.png"], Scripted::stdout(0, "102.0\n"))
            .on("vips", &["deviate", "ref.png"], Scripted::stdout(0, "40.0\n"))
            .on("vips", &["deviate", "cand.png"], Scripted::stdout(0, "35.5\n"));

        let record = run(&runner).await;
        assert!(record.success);
        assert_eq!(record.metric(keys::MEAN_DIFFERENCE), Some(25.5));
        assert!((record.metric(keys::SIMILARITY_ESTIMATE).unwrap() - 0.9).abs() < 1e-12);
        assert!((record.normalized_score.unwrap() - 90.0).abs() < 1e-9);
        assert_eq!(record.metric(keys::STDDEV_DIFFERENCE), Some(4.5));
        assert_eq!(record.interpretation.as_deref(), Some("90.0% mean intensity similarity"));
    }

    #[tokio::test]
    async fn test_missing_deviation_is_tolerated() {
        let runner = vips();
        runner
            .on("vips", &["avg"], Scripted::stdout(0, "50\n"))
            .on("vips", &["deviate"], Scripted::stderr(1, "vips: unknown operation"));

        let record = run(&runner).await;
        assert!(record.success);
        assert_eq!(record.normalized_score, Some(100.0));
        assert_eq!(record.metric(keys::STDDEV_A), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_deviation_keeps_means() {
        let runner = vips();
        runner
            .on("vips", &["avg"], Scripted::stdout(0, "64\n"))
            .on("vips", &["deviate"], Scripted::Hang(Duration::from_secs(60)));

        let record = run(&runner).await;
        assert!(record.success, "{:?}", record.failure);
        assert_eq!(record.metric(keys::MEAN_A), Some(64.0));
        assert_eq!(record.normalized_score, Some(100.0));
        assert_eq!(record.metric(keys::STDDEV_A), None);
        assert!(record.duration_ms < 5_000);
    }

    #[tokio::test]
    async fn test_unusable_mean_fails_backend() {
        let runner = vips();
        runner
            .on("vips", &["avg", "ref.png"], Scripted::stdout(0, "127.5\n"))
            .on("vips", &["avg", "cand.png"], Scripted::stdout(0, "\n"));

        let record = run(&runner).await;
        assert!(!record.success);
        assert!(matches!(record.failure, Some(BackendFailure::Unparsable { .. })));
    }

    #[test]
    fn test_similarity_estimate_floors_at_zero() {
        assert_eq!(similarity_estimate(0.0, 255.0, 100.0), 0.0);
        assert_eq!(similarity_estimate(10.0, 10.0, 255.0), 1.0);
    }
}
