//! Long-running comparison jobs for service front-ends.
//!
//! A [`TaskStore`] holds one [`TaskRecord`] per submitted comparison.
//! [`ComparisonJobs`] spawns comparisons on the tokio runtime, advances the
//! record through the engine's stages and lets callers poll, list, cancel and
//! remove tasks by id.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::CompareOptions;
use crate::domain::{CompareError, ComparisonReport, Result};
use crate::engine::{ComparisonEngine, Stage};
use crate::preprocess::ComparisonTarget;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Started,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Pollable state of one comparison task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub status: JobStatus,
    /// Percent complete, 0–100.
    pub progress: u8,
    pub message: String,
    pub result: Option<ComparisonReport>,
    pub report_path: Option<PathBuf>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn started(task_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.into(),
            status: JobStatus::Started,
            progress: 0,
            message: "Initializing image comparison...".to_string(),
            result: None,
            report_path: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn advance(&mut self, stage: Stage) {
        let (progress, message) = match stage {
            Stage::Preprocessing => (10, "Normalizing images..."),
            Stage::RunningBackends => (25, "Running visual diff analysis..."),
            Stage::Synthesizing => (75, "Synthesizing consensus verdict..."),
            Stage::Persisting => (90, "Writing comparison report..."),
        };
        self.status = JobStatus::Running;
        self.progress = progress;
        self.message = message.to_string();
        self.updated_at = Utc::now();
    }

    fn complete(&mut self, report: ComparisonReport, path: PathBuf) {
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.message = "Image comparison completed successfully".to_string();
        self.result = Some(report);
        self.report_path = Some(path);
        self.updated_at = Utc::now();
    }

    fn fail(&mut self, error: &CompareError) {
        self.status = JobStatus::Failed;
        self.message = format!("Image comparison failed: {error}");
        self.error = Some(error.to_string());
        self.updated_at = Utc::now();
    }
}

/// `task_<unix seconds>_<8 hex chars>`
pub fn generate_task_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("task_{}_{}", Utc::now().timestamp(), &suffix[..8])
}

/// Storage for task records.
#[async_trait]
pub trait TaskStore: Send + Sync + 'static {
    /// Insert or replace the record with the same `task_id`.
    async fn put(&self, record: TaskRecord) -> Result<()>;

    async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>>;

    /// All records, oldest first.
    async fn list(&self) -> Result<Vec<TaskRecord>>;

    async fn remove(&self, task_id: &str) -> Result<Option<TaskRecord>>;
}

/// In-memory task store backed by a `HashMap<task_id, TaskRecord>`.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<HashMap<String, TaskRecord>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<String, TaskRecord>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn put(&self, record: TaskRecord) -> Result<()> {
        self.tasks().insert(record.task_id.clone(), record);
        Ok(())
    }

    async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>> {
        Ok(self.tasks().get(task_id).cloned())
    }

    async fn list(&self) -> Result<Vec<TaskRecord>> {
        let mut records: Vec<TaskRecord> = self.tasks().values().cloned().collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        Ok(records)
    }

    async fn remove(&self, task_id: &str) -> Result<Option<TaskRecord>> {
        Ok(self.tasks().remove(task_id))
    }
}

#[derive(Default)]
struct InFlight {
    cancels: HashMap<String, watch::Sender<bool>>,
    handles: HashMap<String, JoinHandle<()>>,
}

/// Runs comparisons in the background and tracks them in a [`TaskStore`].
pub struct ComparisonJobs {
    engine: Arc<ComparisonEngine>,
    store: Arc<dyn TaskStore>,
    in_flight: Arc<Mutex<InFlight>>,
}

impl ComparisonJobs {
    pub fn new(engine: Arc<ComparisonEngine>, store: Arc<dyn TaskStore>) -> Self {
        Self {
            engine,
            store,
            in_flight: Arc::new(Mutex::new(InFlight::default())),
        }
    }

    pub fn store(&self) -> Arc<dyn TaskStore> {
        Arc::clone(&self.store)
    }

    /// Record a new task and start the comparison. Returns the task id.
    pub async fn submit(&self, target: ComparisonTarget, options: CompareOptions) -> Result<String> {
        let task_id = generate_task_id();
        let record = TaskRecord::started(&task_id);
        self.store.put(record.clone()).await?;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        // The task removes its own entry when it ends, so the entry must be
        // in place before the task can get that far.
        let mut in_flight = lock(&self.in_flight);
        in_flight.cancels.insert(task_id.clone(), cancel_tx);
        let handle = tokio::spawn(run_task(
            Arc::clone(&self.engine),
            Arc::clone(&self.store),
            Arc::clone(&self.in_flight),
            record,
            target,
            options,
            cancel_rx,
        ));
        in_flight.handles.insert(task_id.clone(), handle);
        drop(in_flight);
        info!(task_id = %task_id, "comparison task submitted");
        Ok(task_id)
    }

    /// Number of tasks that have not finished yet.
    pub fn running(&self) -> usize {
        lock(&self.in_flight).handles.len()
    }

    pub async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>> {
        self.store.get(task_id).await
    }

    pub async fn list(&self) -> Result<Vec<TaskRecord>> {
        self.store.list().await
    }

    /// Ask a running task to stop. Returns `false` if it is not running.
    pub fn cancel(&self, task_id: &str) -> bool {
        lock(&self.in_flight)
            .cancels
            .get(task_id)
            .map(|tx| tx.send(true).is_ok())
            .unwrap_or(false)
    }

    /// Cancel the task if it is still running, then forget it.
    pub async fn remove(&self, task_id: &str) -> Result<Option<TaskRecord>> {
        if self.cancel(task_id) {
            self.wait(task_id).await?;
        }
        self.store.remove(task_id).await
    }

    /// Wait for a task to reach a terminal state and return its record.
    ///
    /// A task that already finished has no handle left and its stored record
    /// is returned as is.
    pub async fn wait(&self, task_id: &str) -> Result<Option<TaskRecord>> {
        let handle = lock(&self.in_flight).handles.remove(task_id);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(task_id = %task_id, error = %e, "comparison task panicked");
            }
        }
        self.store.get(task_id).await
    }
}

fn lock(in_flight: &Mutex<InFlight>) -> MutexGuard<'_, InFlight> {
    in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn run_task(
    engine: Arc<ComparisonEngine>,
    store: Arc<dyn TaskStore>,
    in_flight: Arc<Mutex<InFlight>>,
    mut record: TaskRecord,
    target: ComparisonTarget,
    options: CompareOptions,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let task_id = record.task_id.clone();
    let (stage_tx, mut stage_rx) = watch::channel(None::<Stage>);
    let on_stage = move |stage: Stage| {
        let _ = stage_tx.send(Some(stage));
    };

    let mut comparison = Box::pin(engine.compare_with_progress(target, &options, &on_stage));
    let cancelled = async {
        let requested = cancel_rx.wait_for(|c| *c).await.is_ok();
        // A dropped sender means nobody can cancel any more.
        if !requested {
            std::future::pending::<()>().await;
        }
    };
    tokio::pin!(cancelled);

    let outcome = loop {
        tokio::select! {
            result = &mut comparison => break Some(result),
            _ = &mut cancelled => break None,
            Ok(()) = stage_rx.changed() => {
                let stage = *stage_rx.borrow_and_update();
                if let Some(stage) = stage {
                    record.advance(stage);
                    if let Err(e) = store.put(record.clone()).await {
                        warn!(task_id = %task_id, error = %e, "failed to record task progress");
                    }
                }
            }
        }
    };
    // Dropping the comparison kills any tool still running.
    drop(comparison);

    match outcome {
        Some(Ok(outcome)) => record.complete(outcome.report, outcome.path),
        Some(Err(err)) => record.fail(&err),
        None => {
            info!(task_id = %task_id, "comparison task cancelled");
            record.fail(&CompareError::Cancelled);
        }
    }
    if let Err(e) = store.put(record).await {
        warn!(task_id = %task_id, error = %e, "failed to record task outcome");
    }
    let mut in_flight = lock(&in_flight);
    in_flight.cancels.remove(&task_id);
    in_flight.handles.remove(&task_id);
}
