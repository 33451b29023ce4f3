//! Structured lifecycle events for comparison runs.
//!
//! Every event carries an `event` field (`comparison.started`,
//! `backend.finished`, `verdict.synthesized`, `report.persisted`,
//! `comparison.failed`) so log pipelines can filter on it.

use std::path::Path;

use tracing::{info, warn, Span};

use crate::domain::{ConsensusVerdict, MetricRecord};

/// Run-scoped span. Instrument futures with [`span`](Self::span), or
/// [`enter`](Self::enter) it from synchronous code.
#[derive(Debug, Clone)]
pub struct ComparisonSpan {
    span: Span,
}

impl ComparisonSpan {
    pub fn new(run_id: &str) -> Self {
        Self {
            span: tracing::info_span!("pixcon.comparison", run_id = %run_id),
        }
    }

    pub fn span(&self) -> Span {
        self.span.clone()
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

pub fn emit_comparison_started(run_id: &str, reference: &str, candidate: &str, backends: usize) {
    info!(
        event = "comparison.started",
        run_id = %run_id,
        reference = %reference,
        candidate = %candidate,
        backends = backends,
    );
}

pub fn emit_backend_finished(run_id: &str, record: &MetricRecord) {
    match &record.failure {
        None => info!(
            event = "backend.finished",
            run_id = %run_id,
            backend = %record.backend,
            success = true,
            score = record.normalized_score.unwrap_or_default(),
            duration_ms = record.duration_ms,
        ),
        Some(failure) => warn!(
            event = "backend.finished",
            run_id = %run_id,
            backend = %record.backend,
            success = false,
            failure = %failure,
            duration_ms = record.duration_ms,
        ),
    }
}

pub fn emit_verdict_synthesized(run_id: &str, verdict: &ConsensusVerdict) {
    info!(
        event = "verdict.synthesized",
        run_id = %run_id,
        aggregate_score = verdict.aggregate_score,
        readiness = %verdict.readiness_tier,
        consensus = %verdict.consensus,
        confidence = verdict.confidence,
    );
}

pub fn emit_report_persisted(run_id: &str, path: &Path) {
    info!(event = "report.persisted", run_id = %run_id, path = %path.display());
}

/// Hard failure of a whole comparison (warning level).
pub fn emit_comparison_failed(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "comparison.failed", run_id = %run_id, error = %error);
}
