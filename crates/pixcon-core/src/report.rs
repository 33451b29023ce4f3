//! Report assembly, persistence and rendering.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::domain::{
    BackendCapability, BackendKind, CompareError, ComparisonReport, ConsensusVerdict, MetricRecord,
    NormalizedMeta, Result, TargetMeta, REPORT_SCHEMA_VERSION,
};

/// Packages comparison results into a [`ComparisonReport`] and writes it
/// under `output_dir`. Reports are append-only: persisting never replaces an
/// existing file.
#[derive(Debug, Clone)]
pub struct ReportAssembler {
    output_dir: PathBuf,
}

impl ReportAssembler {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Build the report. Fails with [`CompareError::DuplicateBackend`] if two
    /// records name the same backend.
    pub fn assemble(
        &self,
        run_id: &str,
        targets: TargetMeta,
        normalized: NormalizedMeta,
        capabilities: BTreeMap<BackendKind, BackendCapability>,
        records: Vec<MetricRecord>,
        verdict: ConsensusVerdict,
    ) -> Result<ComparisonReport> {
        let mut backends = BTreeMap::new();
        for record in records {
            let kind = record.backend;
            if backends.insert(kind, record).is_some() {
                return Err(CompareError::DuplicateBackend(kind));
            }
        }

        Ok(ComparisonReport {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            report_id: Uuid::new_v4(),
            run_id: run_id.to_string(),
            created_at: Utc::now(),
            targets,
            normalized,
            capabilities,
            backends,
            verdict,
        })
    }

    /// Write `report` as pretty JSON and return its path.
    ///
    /// The file is written to a temp file in the output directory first and
    /// then linked into place, so readers never observe a partial report.
    pub fn persist(&self, report: &ComparisonReport) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(report_file_name(report));

        let body = serde_json::to_vec_pretty(report)?;
        let mut tmp = NamedTempFile::new_in(&self.output_dir)?;
        tmp.write_all(&body)?;
        tmp.flush()?;
        tmp.persist_noclobber(&path).map_err(|e| e.error)?;
        Ok(path)
    }

    /// Read a persisted report back.
    pub fn load(path: &Path) -> Result<ComparisonReport> {
        let raw = std::fs::read(path)?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

/// `comparison-<UTC timestamp>-<report id prefix>.json`
pub fn report_file_name(report: &ComparisonReport) -> String {
    let id = report.report_id.simple().to_string();
    format!(
        "comparison-{}-{}.json",
        report.created_at.format("%Y%m%dT%H%M%SZ"),
        &id[..8]
    )
}

/// Render a Markdown summary of a report.
pub fn render_summary_md(report: &ComparisonReport) -> String {
    let v = &report.verdict;
    let mut out = String::new();
    out.push_str("# Visual Comparison\n\n");
    out.push_str(&format!(
        "- reference: `{}` ({}x{})\n- candidate: `{}` ({}x{})\n- normalized: {}x{} {}{}\n\n",
        report.targets.reference.source,
        report.targets.reference.width,
        report.targets.reference.height,
        report.targets.candidate.source,
        report.targets.candidate.width,
        report.targets.candidate.height,
        report.normalized.width,
        report.normalized.height,
        report.normalized.mode,
        if report.normalized.resized {
            format!(" (resampled, {})", report.normalized.filter)
        } else {
            String::new()
        },
    ));

    out.push_str("## Verdict\n");
    out.push_str(&format!(
        "- score: {:.1}%\n- readiness: {} ({})\n- consensus: {} ({:.0}% positive)\n- confidence: {:.0}%\n\n",
        v.aggregate_score,
        v.readiness_tier,
        v.readiness_tier.description(),
        v.consensus,
        v.consensus_ratio * 100.0,
        v.confidence * 100.0,
    ));

    out.push_str("## Backends\n");
    out.push_str("| backend | tool | result | score | note |\n|---|---|---|---|---|\n");
    for (kind, record) in &report.backends {
        let (result, note) = match &record.failure {
            None => ("ok", record.interpretation.clone().unwrap_or_default()),
            Some(failure) => ("failed", failure.to_string()),
        };
        let score = record
            .normalized_score
            .map(|s| format!("{s:.1}"))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            kind,
            kind.tool_name(),
            result,
            score,
            note.replace('|', "\\|")
        ));
    }
    out.push('\n');

    out.push_str("## Critical Issues\n");
    for issue in &v.critical_issues {
        out.push_str(&format!("- {issue}\n"));
    }

    if !v.recommendations.is_empty() {
        out.push_str("\n## Recommendations\n");
        for rec in &v.recommendations {
            out.push_str(&format!("- {rec}\n"));
        }
    }

    out.push_str("\n## Next Steps\n");
    for step in &v.next_steps {
        out.push_str(&format!("- {step}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BackendFailure, ConsensusLabel, ImageInfo, ReadinessTier};

    fn info(source: &str) -> ImageInfo {
        ImageInfo {
            source: source.to_string(),
            width: 10,
            height: 10,
            color_mode: "Rgb8".to_string(),
            format: Some("Png".to_string()),
            sha256: "00".repeat(32),
        }
    }

    fn verdict() -> ConsensusVerdict {
        ConsensusVerdict {
            aggregate_score: 97.0,
            readiness_tier: ReadinessTier::ProductionReady,
            consensus: ConsensusLabel::StrongSimilar,
            consensus_ratio: 1.0,
            confidence: 1.0,
            critical_issues: vec!["No critical issues detected.".to_string()],
            recommendations: vec![],
            next_steps: vec!["Test responsive breakpoints".to_string()],
            backends_used: vec![BackendKind::PixelDiff],
            backends_failed: vec![BackendKind::PerceptualJudge],
        }
    }

    fn assemble(assembler: &ReportAssembler, records: Vec<MetricRecord>) -> Result<ComparisonReport> {
        assembler.assemble(
            "run-1",
            TargetMeta {
                reference: info("a.png"),
                candidate: info("b.png"),
            },
            NormalizedMeta {
                width: 10,
                height: 10,
                mode: "rgb8".to_string(),
                resized: false,
                filter: "lanczos3".to_string(),
            },
            BTreeMap::new(),
            records,
            verdict(),
        )
    }

    fn records() -> Vec<MetricRecord> {
        vec![
            MetricRecord::succeeded(BackendKind::PixelDiff, BTreeMap::new(), 97.0)
                .with_interpretation("Very good similarity (95-99%)"),
            MetricRecord::failed(BackendKind::PerceptualJudge, BackendFailure::execution("boom")),
        ]
    }

    #[test]
    fn test_duplicate_backend_rejected() {
        let assembler = ReportAssembler::new("unused");
        let mut recs = records();
        recs.push(MetricRecord::succeeded(BackendKind::PixelDiff, BTreeMap::new(), 50.0));
        let err = assemble(&assembler, recs).unwrap_err();
        assert!(matches!(err, CompareError::DuplicateBackend(BackendKind::PixelDiff)));
    }

    #[test]
    fn test_persist_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = ReportAssembler::new(dir.path().join("reports"));
        let report = assemble(&assembler, records()).unwrap();

        let path = assembler.persist(&report).unwrap();
        assert!(path.starts_with(dir.path().join("reports")));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("comparison-"));
        assert!(name.ends_with(".json"));

        let loaded = ReportAssembler::load(&path).unwrap();
        assert_eq!(loaded, report);
    }

    #[test]
    fn test_persist_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = ReportAssembler::new(dir.path());
        let report = assemble(&assembler, records()).unwrap();
        assembler.persist(&report).unwrap();
        let err = assembler.persist(&report).unwrap_err();
        assert!(matches!(err, CompareError::Io(ref e) if e.kind() == std::io::ErrorKind::AlreadyExists));

        let second = assemble(&assembler, records()).unwrap();
        assembler.persist(&second).unwrap();
        let count = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_report_json_shape() {
        let assembler = ReportAssembler::new("unused");
        let report = assemble(&assembler, records()).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["schema_version"], "1.0");
        assert_eq!(json["backends"]["pixel_diff"]["success"], true);
        assert_eq!(json["backends"]["perceptual_judge"]["failure"]["kind"], "execution_failed");
        assert_eq!(json["verdict"]["readiness_tier"], "production-ready");
        assert_eq!(json["verdict"]["consensus"], "strong: similar");
    }

    #[test]
    fn test_markdown_summary() {
        let assembler = ReportAssembler::new("unused");
        let report = assemble(&assembler, records()).unwrap();
        let md = render_summary_md(&report);
        assert!(md.contains("# Visual Comparison"));
        assert!(md.contains("- score: 97.0%"));
        assert!(md.contains("| pixel_diff | imagemagick | ok | 97.0 |"));
        assert!(md.contains("| perceptual_judge | perceptualdiff | failed | - |"));
        assert!(md.contains("No critical issues detected."));
        assert!(!md.contains("## Recommendations"));
    }
}
