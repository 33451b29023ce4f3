//! pixcon core library
//!
//! Multi-backend visual similarity engine: normalizes two images, runs every
//! available external comparison tool against them, and synthesizes the
//! results into one scored, tiered verdict.

pub mod backends;
pub mod config;
pub mod domain;
pub mod engine;
pub mod jobs;
pub mod metrics;
pub mod obs;
pub mod preprocess;
pub mod registry;
pub mod report;
pub mod synthesis;
pub mod telemetry;

pub use backends::{ExecError, ProcessRunner, ToolCommand, ToolOutput, ToolRunner};

pub use config::{Approximations, CompareOptions, EngineConfig, RunPlan};

pub use domain::{
    keys, BackendCapability, BackendFailure, BackendKind, CompareError, ComparisonReport,
    ConsensusLabel, ConsensusVerdict, ImageInfo, Invocation, MetricRecord, NormalizedMeta,
    ReadinessTier, Result, TargetMeta, TargetSide, REPORT_SCHEMA_VERSION,
};

pub use engine::{ComparisonEngine, ComparisonOutcome, Stage};

pub use jobs::{generate_task_id, ComparisonJobs, JobStatus, MemoryTaskStore, TaskRecord, TaskStore};

pub use obs::{
    emit_backend_finished, emit_comparison_failed, emit_comparison_started, emit_report_persisted,
    emit_verdict_synthesized, ComparisonSpan,
};

pub use preprocess::{ComparisonTarget, ImagePreprocessor, ImageSource, NormalizedImagePair};

pub use registry::BackendRegistry;

pub use report::{render_summary_md, report_file_name, ReportAssembler};

pub use synthesis::{ScoreSynthesizer, NO_CRITICAL_ISSUES};
