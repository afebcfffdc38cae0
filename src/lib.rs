//! Software task effort estimation
//!
//! Historical issues are loaded into an immutable [`CorpusSnapshot`], the
//! most similar completed tasks are retrieved with an adaptive threshold,
//! the reference set is widened with size-stratified and percentile samples,
//! and one provider call turns it all into a validated estimate. Batches run
//! the same pipeline over a bounded worker pool.
//!
//! ```no_run
//! use std::sync::Arc;
//! use task_estimator::{Estimator, JsonIssueStore, OpenAiProvider, Settings, Task};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> task_estimator::Result<()> {
//! let settings = Settings::load(None)?;
//! let estimator = Estimator::new(settings.estimation.clone())
//!     .with_store(Arc::new(JsonIssueStore::new("data/issues.json")))
//!     .with_provider(Arc::new(OpenAiProvider::new(settings.provider.clone())?));
//!
//! let task = Task::new("Add dark mode toggle").with_labels(["frontend", "ui"]);
//! let result = estimator.estimate(&CancellationToken::new(), &task).await?;
//! println!("{:.1} hours", result.estimation.estimated_hours);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod corpus;
pub mod error;
pub mod estimator;
pub mod metrics;
pub mod provider;
pub mod telemetry;

pub use config::Settings;
pub use corpus::{HistoricalTask, InMemoryIssueStore, IssueRecord, IssueStore, JsonIssueStore, Size};
pub use error::{EstimatorError, FailureKind, Result, TaskFailure};
pub use estimator::{
    BatchProcessor, BatchReport, BatchRequest, BatchTask, CorpusSnapshot, EstimationResult,
    Estimator, Task,
};
pub use provider::{EstimationProvider, EstimationRequest, EstimationResponse, OpenAiProvider};
