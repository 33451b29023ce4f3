//! `butteraugli`: unbounded perceptual distance, 0 means identical.

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
    let distance = parse_distance(&output.stdout)?;

    let slope = ctx.approximations.distance_points_per_unit;
    let raw = BTreeMap::from([(keys::DISTANCE.to_string(), distance)]);
    Ok(
        MetricRecord::succeeded(BackendKind::PerceptualDistance, raw, 100.0 - slope * distance)
            .with_interpretation(interpret_distance(distance))
            .with_approximation(format!("score = max(0, 100 - {slope} * distance)")),
    )
}

/// The first line that is a bare number is the distance; later lines carry
/// norms we do not use.
fn parse_distance(stdout: &str) -> Result<f64, BackendFailure> {
    stdout
        .lines()
        .filter_map(|line| parse_number(line.trim()))
        .find(|d| d.is_finite())
        .filter(|d| *d >= 0.0)
        .ok_or_else(|| BackendFailure::unparsable(format!("expected a distance, got {:?}", stdout.trim())))
}

pub(crate) fn interpret_distance(distance: f64) -> &'static str {
    if distance < 1.0 {
        "Imperceptible differences"
    } else if distance < 2.0 {
        "Barely perceptible differences"
    } else if distance < 3.0 {
        "Noticeable differences"
    } else if distance < 5.0 {
        "Clearly visible differences"
    } else {
        "Significant perceptual differences"
    }
}
