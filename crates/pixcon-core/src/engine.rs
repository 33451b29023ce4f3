//! The comparison pipeline.
//!
//! `prepare` → `run_backends` → synthesize → assemble → persist. Backends run
//! concurrently on the same task, so dropping the comparison future cancels
//! every in-flight tool (children are spawned with `kill_on_drop`) and the
//! per-run scratch directory is removed. Nothing reaches the output
//! directory until the verdict exists.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{info, instrument, Instrument};
use uuid::Uuid;

use crate::backends::{self, AdapterContext, ProcessRunner, ToolRunner};
use crate::config::{CompareOptions, EngineConfig, RunPlan};
use crate::domain::{BackendFailure, BackendKind, CompareError, ComparisonReport, MetricRecord, Result};
use crate::metrics::METRICS;
use crate::obs::{
    emit_backend_finished, emit_comparison_failed, emit_comparison_started, emit_report_persisted,
    emit_verdict_synthesized, ComparisonSpan,
};
use crate::preprocess::{ComparisonTarget, ImagePreprocessor, NormalizedImagePair};
use crate::registry::BackendRegistry;
use crate::report::ReportAssembler;
use crate::synthesis::ScoreSynthesizer;

/// Pipeline stage, reported to progress observers as it begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Preprocessing,
    RunningBackends,
    Synthesizing,
    Persisting,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Preprocessing => "preprocessing",
            Stage::RunningBackends => "running_backends",
            Stage::Synthesizing => "synthesizing",
            Stage::Persisting => "persisting",
        }
    }
}

/// A finished, persisted comparison.
#[derive(Debug, Clone)]
pub struct ComparisonOutcome {
    pub report: ComparisonReport,
    pub path: PathBuf,
}

/// Owns the registry and configuration shared by every comparison.
#[derive(Debug)]
pub struct ComparisonEngine {
    config: EngineConfig,
    registry: BackendRegistry,
    preprocessor: ImagePreprocessor,
    synthesizer: ScoreSynthesizer,
    assembler: ReportAssembler,
}

impl ComparisonEngine {
    /// Engine backed by real processes; probes the host once.
    pub async fn new(config: EngineConfig) -> Result<Self> {
        Self::with_runner(config, Arc::new(ProcessRunner)).await
    }

    pub async fn with_runner(config: EngineConfig, runner: Arc<dyn ToolRunner>) -> Result<Self> {
        config.validate()?;
        let registry = BackendRegistry::probe(runner, config.probe_timeout()).await;
        Ok(Self::from_parts(config, registry))
    }

    pub fn from_parts(config: EngineConfig, registry: BackendRegistry) -> Self {
        Self {
            preprocessor: ImagePreprocessor::new(),
            synthesizer: ScoreSynthesizer::new(),
            assembler: ReportAssembler::new(config.output_dir.clone()),
            config,
            registry,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Re-probe the host for tools.
    pub async fn reprobe(&mut self) {
        self.registry.reprobe().await;
    }

    pub async fn compare(&self, target: ComparisonTarget, options: &CompareOptions) -> Result<ComparisonOutcome> {
        self.compare_with_progress(target, options, &|_| {}).await
    }

    /// Run the full pipeline, calling `on_stage` as each stage begins.
    pub async fn compare_with_progress(
        &self,
        target: ComparisonTarget,
        options: &CompareOptions,
        on_stage: &(dyn Fn(Stage) + Send + Sync),
    ) -> Result<ComparisonOutcome> {
        let run_id = new_run_id();
        let span = ComparisonSpan::new(&run_id);
        METRICS.inc_comparisons_started();

        let result = self
            .run_pipeline(&run_id, target, options, on_stage)
            .instrument(span.span())
            .await;

        match &result {
            Ok(_) => METRICS.inc_comparisons_completed(),
            Err(err) => {
                METRICS.inc_comparisons_failed();
                emit_comparison_failed(&run_id, err);
            }
        }
        result
    }

    async fn run_pipeline(
        &self,
        run_id: &str,
        target: ComparisonTarget,
        options: &CompareOptions,
        on_stage: &(dyn Fn(Stage) + Send + Sync),
    ) -> Result<ComparisonOutcome> {
        let plan = RunPlan::resolve(&self.config, options)?;
        emit_comparison_started(
            run_id,
            &target.reference.label(),
            &target.candidate.label(),
            BackendKind::ALL.len() - plan.skip.len(),
        );

        on_stage(Stage::Preprocessing);
        let pair = self.prepare(target).await?;

        on_stage(Stage::RunningBackends);
        let staging = pair.dir().join("artifacts");
        std::fs::create_dir_all(&staging)?;
        let mut records = self.run_backends(&pair, &plan, &staging).await;
        for record in &records {
            METRICS.record_backend(record);
            emit_backend_finished(run_id, record);
        }

        on_stage(Stage::Synthesizing);
        let verdict = self.synthesizer.synthesize(&records)?;
        emit_verdict_synthesized(run_id, &verdict);

        on_stage(Stage::Persisting);
        let artifact_dir = self.config.output_dir.join("artifacts").join(run_id);
        promote_artifacts(&mut records, &artifact_dir)?;
        if self.config.keep_normalized {
            pair.keep_copies(&artifact_dir)?;
        }

        let report = self.assembler.assemble(
            run_id,
            pair.targets.clone(),
            pair.meta.clone(),
            self.registry.capabilities().clone(),
            records,
            verdict,
        )?;
        let path = self.assembler.persist(&report)?;
        emit_report_persisted(run_id, &path);

        Ok(ComparisonOutcome { report, path })
    }

    /// Decode and normalize the inputs off the async runtime.
    pub async fn prepare(&self, target: ComparisonTarget) -> Result<NormalizedImagePair> {
        let preprocessor = self.preprocessor.clone();
        tokio::task::spawn_blocking(move || preprocessor.normalize(&target))
            .await
            .map_err(|e| CompareError::Io(std::io::Error::other(e.to_string())))?
    }

    /// Run every non-skipped backend concurrently against `pair`.
    ///
    /// Unavailable backends get an `Unavailable` record without being run.
    /// Records come back in registration order.
    #[instrument(skip_all, fields(skipped = plan.skip.len()))]
    pub async fn run_backends(
        &self,
        pair: &NormalizedImagePair,
        plan: &RunPlan,
        artifact_dir: &Path,
    ) -> Vec<MetricRecord> {
        let runner = self.registry.runner();
        let approximations = &self.config.approximations;

        let runs = BackendKind::ALL
            .into_iter()
            .filter(|kind| !plan.is_skipped(*kind))
            .map(|kind| {
                let runner = Arc::clone(&runner);
                let capability = self.registry.capability(kind);
                async move {
                    let invocation = match capability.and_then(|c| c.invocation.as_ref()) {
                        Some(invocation) => invocation,
                        None => {
                            let reason = capability
                                .and_then(|c| c.reason.clone())
                                .unwrap_or_else(|| format!("{} not installed", kind.tool_name()));
                            return MetricRecord::failed(kind, BackendFailure::Unavailable { reason });
                        }
                    };
                    let ctx = AdapterContext {
                        invocation,
                        reference: pair.reference(),
                        candidate: pair.candidate(),
                        artifact_dir,
                        timeout: plan.timeout_for(kind),
                        approximations,
                    };
                    backends::compare(kind, runner.as_ref(), &ctx).await
                }
            });

        let records = join_all(runs).await;
        info!(
            succeeded = records.iter().filter(|r| r.success).count(),
            attempted = records.iter().filter(|r| r.attempted()).count(),
            "backends finished"
        );
        records
    }
}

/// Move staged artifacts into `dest` and repoint the records at them.
fn promote_artifacts(records: &mut [MetricRecord], dest: &Path) -> Result<()> {
    for record in records.iter_mut() {
        let Some(staged) = record.artifact_path.take() else {
            continue;
        };
        let Some(name) = staged.file_name() else {
            continue;
        };
        std::fs::create_dir_all(dest)?;
        let target = dest.join(name);
        std::fs::copy(&staged, &target)?;
        record.artifact_path = Some(target);
    }
    Ok(())
}

fn new_run_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%S"), &id[..8])
}
