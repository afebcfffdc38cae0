//! Concurrent batch estimation
//!
//! A fixed pool of workers drains a queue that is filled once and then
//! closed. Every worker estimates against the same corpus snapshot and
//! reports exactly one result per task, success or failure. A failed task
//! never stops its siblings.

use super::models::{ConfidenceTier, EstimationResult, Task};
use super::orchestrator::{CorpusSnapshot, Estimator};
use super::statistics::median_sorted;
use crate::config::BatchConfig;
use crate::corpus::{FieldMap, FieldValue, Size};
use crate::error::{EstimatorError, FailureKind, Result, TaskFailure};
use crate::metrics::METRICS;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A task in a batch estimation request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchTask {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub context: FieldMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
}

impl BatchTask {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    /// Task handed to the estimator; priority and assignee become context
    /// entries unless the context already sets them
    pub fn to_task(&self) -> Task {
        let mut context = self.context.clone();
        for (key, value) in [("priority", &self.priority), ("assignee", &self.assignee)] {
            if let Some(value) = value.as_ref().filter(|v| !v.trim().is_empty()) {
                context
                    .entry(key.to_string())
                    .or_insert_with(|| FieldValue::Text(value.clone()));
            }
        }

        Task {
            title: self.title.clone(),
            description: self.description.clone(),
            labels: self.labels.clone(),
            context,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A batch estimation request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub metadata: BatchMetadata,
    pub tasks: Vec<BatchTask>,
}

impl BatchRequest {
    pub fn new(tasks: Vec<BatchTask>) -> Self {
        Self {
            metadata: BatchMetadata::default(),
            tasks,
        }
    }

    /// Give every task without an id a positional `TASK-NNN` id
    pub fn assign_ids(&mut self) {
        for (i, task) in self.tasks.iter_mut().enumerate() {
            if task.id.trim().is_empty() {
                task.id = format!("TASK-{:03}", i + 1);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.tasks.is_empty() {
            return Err(EstimatorError::InvalidRequest(
                "no tasks found in batch request".to_string(),
            ));
        }
        if let Some(pos) = self.tasks.iter().position(|t| t.title.trim().is_empty()) {
            return Err(EstimatorError::InvalidRequest(format!(
                "task {} has an empty title",
                pos + 1
            )));
        }
        Ok(())
    }
}

/// Load a batch request from a JSON file
pub async fn load_batch_request(path: impl AsRef<Path>) -> Result<BatchRequest> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path).await?;
    let mut request: BatchRequest = serde_json::from_str(&raw)?;
    request.validate()?;
    request.assign_ids();

    debug!("Loaded batch request with {} tasks from {}", request.tasks.len(), path.display());
    Ok(request)
}

/// Outcome of one task in a batch; exactly one of `result` and `error` is set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    /// Position of the task in the request
    pub index: usize,
    pub task: BatchTask,
    pub result: Option<EstimationResult>,
    pub error: Option<TaskFailure>,
    pub processed_at: DateTime<Utc>,
}

impl BatchResult {
    fn succeeded(index: usize, task: BatchTask, result: EstimationResult) -> Self {
        Self {
            index,
            task,
            result: Some(result),
            error: None,
            processed_at: Utc::now(),
        }
    }

    fn failed(index: usize, task: BatchTask, error: TaskFailure) -> Self {
        Self {
            index,
            task,
            result: None,
            error: Some(error),
            processed_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }
}

/// Aggregates over the successful results of a batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStatistics {
    pub total_estimated_hours: f64,
    pub average_hours: f64,
    pub median_hours: f64,
    pub min_hours: f64,
    pub max_hours: f64,
    pub average_confidence: f64,

    pub size_distribution: BTreeMap<Size, usize>,
    pub size_hours: BTreeMap<Size, f64>,

    /// Keyed by task label
    pub category_distribution: BTreeMap<String, usize>,
    pub category_hours: BTreeMap<String, f64>,

    pub high_confidence_tasks: usize,
    pub medium_confidence_tasks: usize,
    pub low_confidence_tasks: usize,
}

impl BatchStatistics {
    /// Failed results are skipped entirely
    pub fn from_results(results: &[BatchResult]) -> Self {
        let mut stats = Self::default();
        let mut hours: Vec<f64> = Vec::new();
        let mut confidence_sum = 0.0;

        for (batch_result, estimate) in results
            .iter()
            .filter_map(|r| r.result.as_ref().map(|e| (r, &e.estimation)))
        {
            let h = estimate.estimated_hours;
            hours.push(h);
            stats.total_estimated_hours += h;

            *stats.size_distribution.entry(estimate.estimated_size).or_insert(0) += 1;
            *stats.size_hours.entry(estimate.estimated_size).or_insert(0.0) += h;

            for label in &batch_result.task.labels {
                *stats.category_distribution.entry(label.clone()).or_insert(0) += 1;
                *stats.category_hours.entry(label.clone()).or_insert(0.0) += h;
            }

            confidence_sum += estimate.confidence_score;
            match ConfidenceTier::from_score(estimate.confidence_score) {
                ConfidenceTier::High => stats.high_confidence_tasks += 1,
                ConfidenceTier::Medium => stats.medium_confidence_tasks += 1,
                ConfidenceTier::Low => stats.low_confidence_tasks += 1,
            }
        }

        if !hours.is_empty() {
            let n = hours.len() as f64;
            stats.average_hours = stats.total_estimated_hours / n;
            stats.average_confidence = confidence_sum / n;
            hours.sort_by(f64::total_cmp);
            stats.median_hours = median_sorted(&hours);
            stats.min_hours = hours[0];
            stats.max_hours = hours[hours.len() - 1];
        }

        stats
    }
}

/// Complete batch estimation report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub id: Uuid,
    pub metadata: BatchMetadata,
    /// Ordered by task position in the request
    pub results: Vec<BatchResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
    pub total_tasks: usize,
    pub successful_tasks: usize,
    pub failed_tasks: usize,
    pub statistics: BatchStatistics,
    /// Corpus snapshot shared by every task in the batch
    pub snapshot_id: Uuid,
}

impl BatchReport {
    pub fn failures(&self) -> impl Iterator<Item = &BatchResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    pub fn successes(&self) -> impl Iterator<Item = &BatchResult> {
        self.results.iter().filter(|r| r.is_success())
    }
}

/// Runs batches of estimations over a bounded worker pool
pub struct BatchProcessor {
    estimator: Arc<Estimator>,
    max_workers: usize,
}

impl BatchProcessor {
    /// A pool size of zero is treated as one
    pub fn new(estimator: Arc<Estimator>, max_workers: usize) -> Self {
        Self {
            estimator,
            max_workers: max_workers.max(1),
        }
    }

    pub fn from_config(estimator: Arc<Estimator>, config: &BatchConfig) -> Self {
        Self::new(estimator, config.max_workers)
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Estimate every task in the request
    ///
    /// Always returns a report. Cancellation is observed between tasks:
    /// tasks not yet started when `cancel` fires are recorded as canceled,
    /// in-flight provider calls run to completion.
    pub async fn process(&self, cancel: &CancellationToken, mut request: BatchRequest) -> BatchReport {
        let started_at = Utc::now();
        let started = Instant::now();
        request.assign_ids();

        let total_tasks = request.tasks.len();
        info!(
            "Starting batch processing: {} tasks, {} workers",
            total_tasks, self.max_workers
        );

        let snapshot = self.estimator.load_snapshot().await;
        let tasks: Arc<[BatchTask]> = request.tasks.into();

        let (work_tx, work_rx) = mpsc::unbounded_channel::<usize>();
        for index in 0..tasks.len() {
            // The receiver is alive until the workers are spawned
            let _ = work_tx.send(index);
        }
        drop(work_tx);
        let queue = Arc::new(Mutex::new(work_rx));

        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<BatchResult>();
        let mut workers = JoinSet::new();
        for worker_id in 0..self.max_workers.min(total_tasks) {
            workers.spawn(run_worker(
                worker_id,
                Arc::clone(&self.estimator),
                Arc::clone(&snapshot),
                Arc::clone(&tasks),
                Arc::clone(&queue),
                result_tx.clone(),
                cancel.clone(),
            ));
        }
        drop(result_tx);

        let mut results: Vec<BatchResult> = Vec::with_capacity(total_tasks);
        while let Some(result) = result_rx.recv().await {
            if let Some(failure) = &result.error {
                warn!("Task {} failed: {}", result.task.id, failure);
            }
            METRICS.record_batch_task(result.is_success());
            results.push(result);
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("Batch worker terminated abnormally: {}", e);
            }
        }

        // A worker that died mid-task leaves a gap
        let reported: HashSet<usize> = results.iter().map(|r| r.index).collect();
        for index in (0..total_tasks).filter(|i| !reported.contains(i)) {
            METRICS.record_batch_task(false);
            results.push(BatchResult::failed(
                index,
                tasks[index].clone(),
                TaskFailure {
                    kind: FailureKind::Internal,
                    message: "worker terminated before reporting a result".to_string(),
                },
            ));
        }
        results.sort_by_key(|r| r.index);

        let successful_tasks = results.iter().filter(|r| r.is_success()).count();
        let failed_tasks = results.len() - successful_tasks;
        let statistics = BatchStatistics::from_results(&results);
        let duration = started.elapsed();

        info!(
            "Batch processing completed: {} successful, {} failed, duration: {:?}",
            successful_tasks, failed_tasks, duration
        );

        BatchReport {
            id: Uuid::new_v4(),
            metadata: request.metadata,
            results,
            started_at,
            finished_at: Utc::now(),
            duration,
            total_tasks,
            successful_tasks,
            failed_tasks,
            statistics,
            snapshot_id: snapshot.id(),
        }
    }
}

async fn run_worker(
    worker_id: usize,
    estimator: Arc<Estimator>,
    snapshot: Arc<CorpusSnapshot>,
    tasks: Arc<[BatchTask]>,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<usize>>>,
    results: mpsc::UnboundedSender<BatchResult>,
    cancel: CancellationToken,
) {
    // In-flight calls are never interrupted by the batch token
    let call_token = CancellationToken::new();

    loop {
        let next = queue.lock().await.recv().await;
        let Some(index) = next else {
            break;
        };
        let batch_task = tasks[index].clone();

        let result = if cancel.is_cancelled() {
            BatchResult::failed(
                index,
                batch_task,
                TaskFailure {
                    kind: FailureKind::ContextCanceled,
                    message: "batch canceled before the task started".to_string(),
                },
            )
        } else {
            debug!("Worker {} estimating task {}", worker_id, batch_task.id);
            let task = batch_task.to_task();
            match estimator
                .estimate_with_snapshot(&call_token, &task, &snapshot)
                .await
            {
                Ok(estimation) => BatchResult::succeeded(index, batch_task, estimation),
                Err(e) => BatchResult::failed(index, batch_task, TaskFailure::from(&e)),
            }
        };

        if results.send(result).is_err() {
            break;
        }
    }
}
