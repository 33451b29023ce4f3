//! Synthesized consensus verdict types.

use serde::{Deserialize, Serialize};

use super::backend::BackendKind;

/// Ordinal readiness bucket, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadinessTier {
    NotReady,
    SignificantIssues,
    NeedsWork,
    NearlyReady,
    ProductionReady,
}

impl ReadinessTier {
    /// Inclusive lower bounds, checked from the highest tier down.
    const THRESHOLDS: [(f64, ReadinessTier); 4] = [
        (95.0, ReadinessTier::ProductionReady),
        (90.0, ReadinessTier::NearlyReady),
        (80.0, ReadinessTier::NeedsWork),
        (70.0, ReadinessTier::SignificantIssues),
    ];

    pub fn from_score(score: f64) -> Self {
        Self::THRESHOLDS
            .iter()
            .find(|(floor, _)| score >= *floor)
            .map(|(_, tier)| *tier)
            .unwrap_or(ReadinessTier::NotReady)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadinessTier::ProductionReady => "production-ready",
            ReadinessTier::NearlyReady => "nearly-ready",
            ReadinessTier::NeedsWork => "needs-work",
            ReadinessTier::SignificantIssues => "significant-issues",
            ReadinessTier::NotReady => "not-ready",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ReadinessTier::ProductionReady => "Excellent match",
            ReadinessTier::NearlyReady => "Minor adjustments needed",
            ReadinessTier::NeedsWork => "Moderate differences detected",
            ReadinessTier::SignificantIssues => "Major differences present",
            ReadinessTier::NotReady => "Substantial reconstruction needed",
        }
    }
}

impl std::fmt::Display for ReadinessTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agreement among backends on whether the images are similar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsensusLabel {
    #[serde(rename = "strong: similar")]
    StrongSimilar,
    #[serde(rename = "moderate: similar")]
    ModerateSimilar,
    #[serde(rename = "weak/mixed")]
    WeakMixed,
    #[serde(rename = "strong: different")]
    StrongDifferent,
}

impl ConsensusLabel {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= 0.8 {
            ConsensusLabel::StrongSimilar
        } else if ratio >= 0.6 {
            ConsensusLabel::ModerateSimilar
        } else if ratio >= 0.4 {
            ConsensusLabel::WeakMixed
        } else {
            ConsensusLabel::StrongDifferent
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsensusLabel::StrongSimilar => "strong: similar",
            ConsensusLabel::ModerateSimilar => "moderate: similar",
            ConsensusLabel::WeakMixed => "weak/mixed",
            ConsensusLabel::StrongDifferent => "strong: different",
        }
    }
}

impl std::fmt::Display for ConsensusLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict derived from a set of metric records. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusVerdict {
    /// Mean normalized score of the successful backends (0–100).
    pub aggregate_score: f64,
    pub readiness_tier: ReadinessTier,
    pub consensus: ConsensusLabel,
    /// Positive backends / successful backends.
    pub consensus_ratio: f64,
    /// Successful backends / attempted backends (0.0–1.0).
    pub confidence: f64,
    pub critical_issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub next_steps: Vec<String>,
    pub backends_used: Vec<BackendKind>,
    pub backends_failed: Vec<BackendKind>,
}
