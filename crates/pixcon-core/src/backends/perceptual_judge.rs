//! `perceptualdiff`: PASS/FAIL against a model of human vision.
//!
//! A FAIL exits non-zero; that is a verdict, not a tool error. A PASS on
//! pixel-identical inputs scores 100; any other PASS gets the configured proxy.

use std::collections::BTreeMap;

use super::{
    existing, exit_reason, first_integer, path_arg, AdapterContext, AdapterResult, ToolOutput,
    ToolRunner,
};
use crate::domain::{keys, BackendFailure, BackendKind, MetricRecord};

const DIFF_IMAGE: &str = "perceptualdiff_diff.png";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Judgement {
    passed: bool,
    identical: bool,
    detail: Option<String>,
    pixels_different: Option<u64>,
}

pub(super) async fn compare(runner: &dyn ToolRunner, ctx: &AdapterContext<'_>) -> AdapterResult {
    let diff_path = ctx.artifact(DIFF_IMAGE);
    let args = vec![
        "-output".to_string(),
        path_arg(&diff_path),
        "-verbose".to_string(),
        path_arg(ctx.reference),
        path_arg(ctx.candidate),
    ];
    let output = runner.run(&ctx.command(args), ctx.timeout).await?;
    let judgement = parse_judgement(&output)?;

    let a = ctx.approximations;
    let (score, interpretation) = if judgement.identical {
        (100.0, "Images are identical")
    } else if judgement.passed {
        (a.judge_pass_score, "Images are perceptually indistinguishable")
    } else {
        (a.judge_fail_score, "Perceptual differences detected")
    };

    let mut raw = BTreeMap::from([(
        keys::PASSED.to_string(),
        if judgement.passed { 1.0 } else { 0.0 },
    )]);
    if let Some(pixels) = judgement.pixels_different {
        raw.insert(keys::PIXELS_DIFFERENT.to_string(), pixels as f64);
    }

    let mut record = MetricRecord::succeeded(BackendKind::PerceptualJudge, raw, score)
        .with_interpretation(interpretation)
        .with_approximation(format!(
            "pass/fail proxy score: identical = 100, pass = {}, fail = {}",
            a.judge_pass_score, a.judge_fail_score
        ));
    if let Some(detail) = judgement.detail {
        record = record.with_detail(detail);
    }
    if let Some(path) = existing(diff_path).await {
        record = record.with_artifact(path);
    }
    Ok(record)
}

fn parse_judgement(output: &ToolOutput) -> Result<Judgement, BackendFailure> {
    let text = output.combined();
    let verdict = text
        .split(|c: char| !c.is_ascii_alphabetic())
        .find(|word| *word == "PASS" || *word == "FAIL");

    let passed = match verdict {
        Some(word) => word == "PASS",
        None if !output.success() => return Err(BackendFailure::execution(exit_reason(output))),
        None => {
            return Err(BackendFailure::unparsable(format!(
                "no PASS/FAIL in output: {:?}",
                text.trim()
            )))
        }
    };

    let detail = text
        .lines()
        .map(str::trim)
        .find(|line| line.contains("pixels"))
        .map(str::to_string);
    let pixels_different = detail.as_deref().and_then(first_integer);
    let identical = passed
        && (pixels_different == Some(0) || text.to_ascii_lowercase().contains("binary identical"));

    Ok(Judgement {
        passed,
        identical,
        detail,
        pixels_different,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn out(exit_code: i32, stdout: &str) -> ToolOutput {
        ToolOutput {
            exit_code,
            stdout: stdout.to_string(),
            ..ToolOutput::default()
        }
    }

    #[test]
    fn test_pass() {
        let j = parse_judgement(&out(0, "Field of view is 45.000000 degrees\nPASS: Images are perceptually indistinguishable\n")).unwrap();
        assert!(j.passed);
        assert!(!j.identical);
        assert_eq!(j.detail, None);
    }

    #[test]
    fn test_identical_pass() {
        let j = parse_judgement(&out(0, "PASS: Images are binary identical\n")).unwrap();
        assert!(j.passed && j.identical);

        let j = parse_judgement(&out(0, "PASS: Images are perceptually indistinguishable\n0 pixels are different\n")).unwrap();
        assert!(j.identical);
        assert_eq!(j.pixels_different, Some(0));
    }

    #[test]
    fn test_fail_with_nonzero_exit_is_a_verdict() {
        let j = parse_judgement(&out(1, "FAIL: Images are visibly different\n2048 pixels are different\n")).unwrap();
        assert!(!j.passed && !j.identical);
        assert_eq!(j.detail.as_deref(), Some("2048 pixels are different"));
        assert_eq!(j.pixels_different, Some(2048));
    }

    #[test]
    fn test_tool_error_without_verdict() {
        let err = parse_judgement(&ToolOutput {
            exit_code: 1,
            stderr: "Failed to load image ref.png".into(),
            ..ToolOutput::default()
        })
        .unwrap_err();
        assert!(matches!(err, BackendFailure::ExecutionFailed { .. }));
    }

    #[test]
    fn test_clean_exit_without_verdict_is_unparsable() {
        let err = parse_judgement(&out(0, "something unexpected")).unwrap_err();
        assert!(matches!(err, BackendFailure::Unparsable { .. }));
    }

    #[test]
    fn test_verdict_word_must_stand_alone() {
        let err = parse_judgement(&out(0, "PASSWORD required")).unwrap_err();
        assert!(matches!(err, BackendFailure::Unparsable { .. }));
    }
}
