//! Domain model for visual comparisons.
//!
//! - [`backend`]: `BackendKind`, `Invocation`, `BackendCapability`
//! - [`metric`]: `MetricRecord`, `BackendFailure`, raw metric keys
//! - [`verdict`]: `ReadinessTier`, `ConsensusLabel`, `ConsensusVerdict`
//! - [`report`]: `ComparisonReport` and its metadata sections
//! - [`error`]: `CompareError` / `Result`

pub mod backend;
pub mod error;
pub mod metric;
pub mod report;
pub mod verdict;

pub use backend::{BackendCapability, BackendKind, Invocation};
pub use error::{CompareError, Result, TargetSide};
pub use metric::{keys, BackendFailure, MetricRecord};
pub use report::{ComparisonReport, ImageInfo, NormalizedMeta, TargetMeta, REPORT_SCHEMA_VERSION};
pub use verdict::{ConsensusLabel, ConsensusVerdict, ReadinessTier};
