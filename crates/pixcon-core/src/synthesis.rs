//! Consensus synthesis over per-backend metric records.
//!
//! The verdict is a pure function of the records: equal-weight mean score,
//! fixed readiness thresholds, per-backend issue and positivity rules.

use crate::domain::{
    keys, BackendKind, CompareError, ConsensusLabel, ConsensusVerdict, MetricRecord, ReadinessTier,
    Result,
};

/// Issue emitted when no rule triggers.
pub const NO_CRITICAL_ISSUES: &str = "No critical issues detected.";

const SSIM_ISSUE_BELOW: f64 = 0.9;
const DISTANCE_ISSUE_ABOVE: f64 = 3.0;

const SSIM_POSITIVE_ABOVE: f64 = 0.9;
const DSSIM_POSITIVE_BELOW: f64 = 0.1;
const DISTANCE_POSITIVE_BELOW: f64 = 2.0;

/// Fewer successful backends than this suggests installing more tools.
const WELL_COVERED: usize = 3;

const RECOMMENDATION_TIERS: [(f64, [&str; 4]); 3] = [
    (
        90.0,
        [
            "Review color accuracy and ensure consistent color profiles",
            "Check image compression settings and quality levels",
            "Verify font rendering and text positioning",
            "Analyze layout spacing and alignment precision",
        ],
    ),
    (
        80.0,
        [
            "Consider implementing automated screenshot comparison",
            "Review responsive breakpoints and media queries",
            "Check for missing or incorrectly sized assets",
            "Audit CSS inheritance and specificity issues",
        ],
    ),
    (
        70.0,
        [
            "Perform comprehensive design system audit",
            "Review fundamental layout structure",
            "Consider starting from scratch with tighter controls",
            "Implement stricter asset management processes",
        ],
    ),
];

const INSTALL_MORE_TOOLS: &str = "Install missing visual diff tools for more comprehensive analysis";
const FOLLOW_UPS: [&str; 4] = [
    "Generate detailed diff images for visual inspection",
    "Run analysis on additional page sections",
    "Test responsive breakpoints",
    "Validate cross-browser consistency",
];

/// Turns a set of [`MetricRecord`]s into a [`ConsensusVerdict`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreSynthesizer;

impl ScoreSynthesizer {
    pub fn new() -> Self {
        Self
    }

    /// Fails with [`CompareError::NoBackendsAvailable`] when no record succeeded.
    pub fn synthesize(&self, records: &[MetricRecord]) -> Result<ConsensusVerdict> {
        let mut ordered: Vec<&MetricRecord> = records.iter().collect();
        ordered.sort_by_key(|r| r.backend);

        let successes: Vec<&MetricRecord> = ordered
            .iter()
            .copied()
            .filter(|r| r.success && r.normalized_score.is_some())
            .collect();
        let attempted = ordered.iter().filter(|r| r.attempted()).count();

        if successes.is_empty() {
            return Err(CompareError::NoBackendsAvailable { attempted });
        }

        let aggregate_score = successes
            .iter()
            .filter_map(|r| r.normalized_score)
            .sum::<f64>()
            / successes.len() as f64;

        let positives = successes.iter().filter(|r| self.is_positive(r)).count();
        let consensus_ratio = positives as f64 / successes.len() as f64;

        // Every success was attempted, so `attempted` is never zero here.
        let confidence = successes.len() as f64 / attempted.max(successes.len()) as f64;

        Ok(ConsensusVerdict {
            aggregate_score,
            readiness_tier: ReadinessTier::from_score(aggregate_score),
            consensus: ConsensusLabel::from_ratio(consensus_ratio),
            consensus_ratio,
            confidence,
            critical_issues: critical_issues(&successes),
            recommendations: recommendations(aggregate_score),
            next_steps: next_steps(successes.len()),
            backends_used: successes.iter().map(|r| r.backend).collect(),
            backends_failed: ordered
                .iter()
                .filter(|r| !r.success)
                .map(|r| r.backend)
                .collect(),
        })
    }

    /// Whether a successful record votes "similar".
    ///
    /// The statistical profile has no similarity vote: it counts toward the
    /// number of voters but never as positive.
    pub fn is_positive(&self, record: &MetricRecord) -> bool {
        let metric = |key| record.metric(key);
        match record.backend {
            BackendKind::PixelDiff => metric(keys::SSIM).is_some_and(|v| v > SSIM_POSITIVE_ABOVE),
            BackendKind::StructuralSimilarity => {
                metric(keys::DSSIM).is_some_and(|v| v < DSSIM_POSITIVE_BELOW)
            }
            BackendKind::PerceptualJudge => metric(keys::PASSED).is_some_and(|v| v >= 1.0),
            BackendKind::PerceptualDistance => {
                metric(keys::DISTANCE).is_some_and(|v| v < DISTANCE_POSITIVE_BELOW)
            }
            BackendKind::StatisticalProfile => false,
        }
    }
}

/// Issue strings in registration order, or the single sentinel.
fn critical_issues(successes: &[&MetricRecord]) -> Vec<String> {
    let mut issues = Vec::new();
    for record in successes {
        match record.backend {
            BackendKind::PixelDiff => {
                if let Some(ssim) = record.metric(keys::SSIM).filter(|v| *v < SSIM_ISSUE_BELOW) {
                    issues.push(format!(
                        "Low SSIM score ({ssim:.3}) indicates structural differences"
                    ));
                }
            }
            BackendKind::PerceptualJudge => {
                if record.metric(keys::PASSED) == Some(0.0) {
                    issues.push("Perceptual differences detected by human vision model".to_string());
                }
            }
            BackendKind::PerceptualDistance => {
                if let Some(d) = record.metric(keys::DISTANCE).filter(|v| *v > DISTANCE_ISSUE_ABOVE) {
                    issues.push(format!("High perceptual distance ({d:.2}) detected"));
                }
            }
            BackendKind::StructuralSimilarity | BackendKind::StatisticalProfile => {}
        }
    }
    if issues.is_empty() {
        issues.push(NO_CRITICAL_ISSUES.to_string());
    }
    issues
}

/// Cumulative recommendation tiers gated on the aggregate score.
pub fn recommendations(aggregate_score: f64) -> Vec<String> {
    RECOMMENDATION_TIERS
        .iter()
        .filter(|(below, _)| aggregate_score < *below)
        .flat_map(|(_, items)| items.iter().map(|s| s.to_string()))
        .collect()
}

fn next_steps(successes: usize) -> Vec<String> {
    let mut steps = Vec::with_capacity(FOLLOW_UPS.len() + 1);
    if successes < WELL_COVERED {
        steps.push(INSTALL_MORE_TOOLS.to_string());
    }
    steps.extend(FOLLOW_UPS.iter().map(|s| s.to_string()));
    steps
}
