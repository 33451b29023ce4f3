//! Per-backend metric records.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::backend::BackendKind;

/// Raw metric keys written by the adapters.
pub mod keys {
    pub const SSIM: &str = "ssim";
    pub const MSE: &str = "mse";
    pub const PSNR: &str = "psnr";
    pub const MAE: &str = "mae";
    pub const DSSIM: &str = "dssim";
    pub const SSIM_EQUIVALENT: &str = "ssim_equivalent";
    pub const PASSED: &str = "passed";
    pub const PIXELS_DIFFERENT: &str = "pixels_different";
    pub const DISTANCE: &str = "perceptual_distance";
    pub const MEAN_A: &str = "mean_a";
    pub const MEAN_B: &str = "mean_b";
    pub const MEAN_DIFFERENCE: &str = "mean_difference";
    pub const STDDEV_A: &str = "stddev_a";
    pub const STDDEV_B: &str = "stddev_b";
    pub const STDDEV_DIFFERENCE: &str = "stddev_difference";
    pub const SIMILARITY_ESTIMATE: &str = "similarity_estimate";
}

/// Why a backend did not produce a usable result.
///
/// All variants are recoverable: the engine records them and carries on with
/// the remaining backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendFailure {
    #[error("backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("backend execution failed: {reason}")]
    ExecutionFailed { reason: String },

    #[error("backend timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    #[error("backend output unparsable: {reason}")]
    Unparsable { reason: String },
}

impl BackendFailure {
    pub fn execution(reason: impl Into<String>) -> Self {
        BackendFailure::ExecutionFailed {
            reason: reason.into(),
        }
    }

    pub fn unparsable(reason: impl Into<String>) -> Self {
        BackendFailure::Unparsable {
            reason: reason.into(),
        }
    }

    /// Unavailable backends were never invoked and do not count as attempted.
    pub fn was_attempted(&self) -> bool {
        !matches!(self, BackendFailure::Unavailable { .. })
    }
}

/// Immutable result of one backend run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub backend: BackendKind,
    pub success: bool,
    /// Backend-specific numeric metrics, keyed by [`keys`].
    pub raw_metrics: BTreeMap<String, f64>,
    /// Similarity on the common 0–100 scale.
    pub normalized_score: Option<f64>,
    pub failure: Option<BackendFailure>,
    /// Generated artifact such as a diff image.
    pub artifact_path: Option<PathBuf>,
    /// Free-text detail reported by the tool.
    pub detail: Option<String>,
    /// Human-readable reading of the raw metrics.
    pub interpretation: Option<String>,
    /// Set when a metric was derived by a documented approximation rather
    /// than measured directly.
    pub approximation: Option<String>,
    pub duration_ms: u64,
}

impl MetricRecord {
    /// A successful record. The score is clamped to 0–100.
    pub fn succeeded(backend: BackendKind, raw_metrics: BTreeMap<String, f64>, score: f64) -> Self {
        Self {
            backend,
            success: true,
            raw_metrics,
            normalized_score: Some(score.clamp(0.0, 100.0)),
            failure: None,
            artifact_path: None,
            detail: None,
            interpretation: None,
            approximation: None,
            duration_ms: 0,
        }
    }

    pub fn failed(backend: BackendKind, failure: BackendFailure) -> Self {
        Self {
            backend,
            success: false,
            raw_metrics: BTreeMap::new(),
            normalized_score: None,
            failure: Some(failure),
            artifact_path: None,
            detail: None,
            interpretation: None,
            approximation: None,
            duration_ms: 0,
        }
    }

    pub fn with_artifact(mut self, path: PathBuf) -> Self {
        self.artifact_path = Some(path);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_interpretation(mut self, interpretation: impl Into<String>) -> Self {
        self.interpretation = Some(interpretation.into());
        self
    }

    pub fn with_approximation(mut self, note: impl Into<String>) -> Self {
        self.approximation = Some(note.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Whether the backend was actually invoked in this run.
    pub fn attempted(&self) -> bool {
        self.failure.as_ref().map_or(true, BackendFailure::was_attempted)
    }

    /// Look up a raw metric.
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.raw_metrics.get(key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_succeeded_clamps_score() {
        let rec = MetricRecord::succeeded(BackendKind::PerceptualDistance, BTreeMap::new(), -12.0);
        assert_eq!(rec.normalized_score, Some(0.0));
        let rec = MetricRecord::succeeded(BackendKind::PixelDiff, BTreeMap::new(), 100.4);
        assert_eq!(rec.normalized_score, Some(100.0));
    }

    #[test]
    fn test_unavailable_is_not_attempted() {
        let rec = MetricRecord::failed(
            BackendKind::StatisticalProfile,
            BackendFailure::Unavailable {
                reason: "vips not found".into(),
            },
        );
        assert!(!rec.attempted());
        assert!(!rec.success);

        let rec = MetricRecord::failed(BackendKind::PixelDiff, BackendFailure::Timeout { limit_ms: 10 });
        assert!(rec.attempted());
    }

    #[test]
    fn test_failure_serializes_with_kind_tag() {
        let failure = BackendFailure::unparsable("no number in output");
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "unparsable");
        assert_eq!(json["reason"], "no number in output");
    }

    #[test]
    fn test_metric_lookup() {
        let mut raw = BTreeMap::new();
        raw.insert(keys::SSIM.to_string(), 0.97);
        let rec = MetricRecord::succeeded(BackendKind::PixelDiff, raw, 97.0);
        assert_eq!(rec.metric(keys::SSIM), Some(0.97));
        assert_eq!(rec.metric(keys::PSNR), None);
    }
}
