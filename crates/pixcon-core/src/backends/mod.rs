//! Comparison backends.
//!
//! Each [`BackendKind`] is a tagged variant with one handler module. Handlers
//! shell out through a [`ToolRunner`], parse the tool's free-form output and
//! return a [`MetricRecord`] whose score is already on the 0–100 scale.
//! Every failure is classified into a [`BackendFailure`]; nothing here is
//! fatal to the comparison.

pub mod exec;
pub mod fakes;

mod perceptual_distance;
mod perceptual_judge;
mod pixel_diff;
mod statistical;
mod structural;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{debug, instrument};

use crate::config::Approximations;
use crate::domain::{BackendFailure, BackendKind, Invocation, MetricRecord};

pub use exec::{ExecError, ProcessRunner, ToolCommand, ToolOutput, ToolRunner};

/// Everything one backend run needs. Shared read-only across backends.
#[derive(Debug, Clone, Copy)]
pub struct AdapterContext<'a> {
    pub invocation: &'a Invocation,
    pub reference: &'a Path,
    pub candidate: &'a Path,
    /// Per-run directory for diff images.
    pub artifact_dir: &'a Path,
    pub timeout: Duration,
    pub approximations: &'a Approximations,
}

impl AdapterContext<'_> {
    pub(crate) fn command(&self, args: Vec<String>) -> ToolCommand {
        ToolCommand::from_invocation(self.invocation, args)
    }

    pub(crate) fn artifact(&self, file_name: &str) -> PathBuf {
        self.artifact_dir.join(file_name)
    }
}

type AdapterResult = Result<MetricRecord, BackendFailure>;

/// Run `kind` against the normalized pair, bounded by `ctx.timeout`.
#[instrument(skip_all, fields(backend = %kind))]
pub async fn compare(kind: BackendKind, runner: &dyn ToolRunner, ctx: &AdapterContext<'_>) -> MetricRecord {
    let start = Instant::now();

    let outcome = tokio::time::timeout(ctx.timeout, dispatch(kind, runner, ctx)).await;
    let record = match outcome {
        Ok(Ok(record)) => record,
        Ok(Err(failure)) => MetricRecord::failed(kind, failure),
        Err(_) => MetricRecord::failed(
            kind,
            BackendFailure::Timeout {
                limit_ms: ctx.timeout.as_millis() as u64,
            },
        ),
    };

    debug!(success = record.success, score = ?record.normalized_score, "backend run complete");
    record.with_duration_ms(start.elapsed().as_millis() as u64)
}

async fn dispatch(kind: BackendKind, runner: &dyn ToolRunner, ctx: &AdapterContext<'_>) -> AdapterResult {
    match kind {
        BackendKind::PixelDiff => pixel_diff::compare(runner, ctx).await,
        BackendKind::StructuralSimilarity => structural::compare(runner, ctx).await,
        BackendKind::PerceptualJudge => perceptual_judge::compare(runner, ctx).await,
        BackendKind::PerceptualDistance => perceptual_distance::compare(runner, ctx).await,
        BackendKind::StatisticalProfile => statistical::compare(runner, ctx).await,
    }
}

impl From<ExecError> for BackendFailure {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::NotFound { program } => BackendFailure::Unavailable {
                reason: format!("{program} not found"),
            },
            ExecError::Spawn { .. } => BackendFailure::execution(err.to_string()),
            ExecError::Timeout { limit_ms, .. } => BackendFailure::Timeout { limit_ms },
        }
    }
}

/// Run a command that must exit zero.
pub(crate) async fn run_checked(
    runner: &dyn ToolRunner,
    ctx: &AdapterContext<'_>,
    args: Vec<String>,
) -> Result<ToolOutput, BackendFailure> {
    let output = runner.run(&ctx.command(args), ctx.timeout).await?;
    if !output.success() {
        return Err(BackendFailure::execution(exit_reason(&output)));
    }
    Ok(output)
}

/// One-line description of a failed exit.
pub(crate) fn exit_reason(output: &ToolOutput) -> String {
    let line = output
        .stderr
        .lines()
        .chain(output.stdout.lines())
        .map(str::trim)
        .find(|l| !l.is_empty());
    match line {
        Some(line) => format!("exit status {}: {line}", output.exit_code),
        None => format!("exit status {}", output.exit_code),
    }
}

/// Parse one numeric token, tolerating surrounding punctuation and `inf`.
pub(crate) fn parse_number(token: &str) -> Option<f64> {
    let token = token.trim_matches(|c: char| c == '(' || c == ')' || c == ',' || c == ';');
    match token.to_ascii_lowercase().as_str() {
        "inf" | "+inf" | "infinity" => Some(f64::INFINITY),
        _ => token.parse::<f64>().ok().filter(|v| v.is_finite()),
    }
}

/// First whitespace-separated token of `text` that parses as a number.
pub(crate) fn first_number(text: &str) -> Option<f64> {
    text.split_whitespace().find_map(parse_number)
}

/// First integer embedded anywhere in `text`.
pub(crate) fn first_integer(text: &str) -> Option<u64> {
    static INTEGER: OnceLock<Option<Regex>> = OnceLock::new();
    let re = INTEGER.get_or_init(|| Regex::new(r"\d+").ok()).as_ref()?;
    re.find(text).and_then(|m| m.as_str().parse().ok())
}

pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// `Some(path)` when the tool actually wrote the artifact.
pub(crate) async fn existing(path: PathBuf) -> Option<PathBuf> {
    tokio::fs::metadata(&path).await.ok().map(|_| path)
}

#[cfg(test)]
mod tests {
    use super::fakes::{Scripted, ScriptedRunner};
    use super::*;

    #[test]
    fn test_parse_number_variants() {
        assert_eq!(parse_number("0.98"), Some(0.98));
        assert_eq!(parse_number("(0.0123)"), Some(0.0123));
        assert_eq!(parse_number("inf"), Some(f64::INFINITY));
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("compare:"), None);
    }

    #[test]
    fn test_first_number_skips_words() {
        assert_eq!(first_number("distance: 1.75 units"), Some(1.75));
        assert_eq!(first_number("no digits here"), None);
        assert_eq!(first_integer("FAIL: 2048 pixels are different"), Some(2048));
    }

    #[test]
    fn test_exit_reason_prefers_stderr() {
        let out = ToolOutput {
            exit_code: 2,
            stdout: "ignored\n".into(),
            stderr: "\nunable to open image\n".into(),
            duration_ms: 0,
        };
        assert_eq!(exit_reason(&out), "exit status 2: unable to open image");
        assert_eq!(exit_reason(&ToolOutput { exit_code: 3, ..ToolOutput::default() }), "exit status 3");
    }

    #[test]
    fn test_exec_error_classification() {
        let f: BackendFailure = ExecError::NotFound { program: "dssim".into() }.into();
        assert!(!f.was_attempted());
        let f: BackendFailure = ExecError::Timeout { program: "dssim".into(), limit_ms: 5 }.into();
        assert_eq!(f, BackendFailure::Timeout { limit_ms: 5 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_compare_enforces_overall_timeout() {
        let runner = ScriptedRunner::new();
        runner
            .install("dssim", "dssim 3.2")
            .on("dssim", &[], Scripted::Hang(Duration::from_secs(120)));

        let inv = Invocation::new("dssim", &[]);
        let approximations = Approximations::default();
        let ctx = AdapterContext {
            invocation: &inv,
            reference: Path::new("a.png"),
            candidate: Path::new("b.png"),
            artifact_dir: Path::new("artifacts"),
            timeout: Duration::from_secs(1),
            approximations: &approximations,
        };

        let record = compare(BackendKind::StructuralSimilarity, &runner, &ctx).await;
        assert!(!record.success);
        assert_eq!(record.failure, Some(BackendFailure::Timeout { limit_ms: 1000 }));
        assert!(record.attempted());
    }
}
