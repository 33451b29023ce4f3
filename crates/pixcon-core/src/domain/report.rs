//! The terminal, persisted comparison report.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::backend::{BackendCapability, BackendKind};
use super::metric::MetricRecord;
use super::verdict::ConsensusVerdict;

/// Schema version written into every report.
pub const REPORT_SCHEMA_VERSION: &str = "1.0";

/// Intrinsic properties of one input image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    /// Path, or caller-supplied label for byte buffers.
    pub source: String,
    pub width: u32,
    pub height: u32,
    /// Decoded color type, e.g. `Rgba8`.
    pub color_mode: String,
    pub format: Option<String>,
    /// SHA-256 of the encoded input bytes.
    pub sha256: String,
}

/// Metadata for the ordered input pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetMeta {
    pub reference: ImageInfo,
    pub candidate: ImageInfo,
}

impl TargetMeta {
    /// True when both inputs are byte-identical.
    pub fn identical_inputs(&self) -> bool {
        self.reference.sha256 == self.candidate.sha256
    }
}

/// Metadata of the normalized working pair (never the pixels).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedMeta {
    pub width: u32,
    pub height: u32,
    pub mode: String,
    /// Whether either image had to be resampled.
    pub resized: bool,
    pub filter: String,
}

/// Complete, write-once comparison report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub schema_version: String,
    pub report_id: Uuid,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub targets: TargetMeta,
    pub normalized: NormalizedMeta,
    /// Capability snapshot the run was scheduled from.
    pub capabilities: BTreeMap<BackendKind, BackendCapability>,
    pub backends: BTreeMap<BackendKind, MetricRecord>,
    pub verdict: ConsensusVerdict,
}

impl ComparisonReport {
    pub fn record(&self, kind: BackendKind) -> Option<&MetricRecord> {
        self.backends.get(&kind)
    }

    /// Successful records in registration order.
    pub fn successful(&self) -> impl Iterator<Item = &MetricRecord> {
        self.backends.values().filter(|r| r.success)
    }

    /// Number of backends invoked for this report.
    pub fn attempted_count(&self) -> usize {
        self.backends.values().filter(|r| r.attempted()).count()
    }
}
