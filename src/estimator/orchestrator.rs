//! Single-task estimation pipeline
//!
//! Retrieval, dataset enhancement and statistics are computed against one
//! corpus snapshot, then exactly one provider call is made. Failed calls are
//! reported, never retried.

use super::enhancer::select_enhanced_dataset;
use super::models::{EstimationResult, SimilarityContext, SimilarityMatch, Task};
use super::retrieval::SimilarityRetriever;
use super::statistics::{calculate_dataset_statistics, DatasetStatistics};
use crate::config::{EstimationConfig, Settings};
use crate::corpus::{historical_from_issues, HistoricalTask, IssueStore, JsonIssueStore, SeedDataStore};
use crate::error::{EstimatorError, Result};
use crate::metrics::METRICS;
use crate::provider::{
    parse_estimation_response, EstimationProvider, EstimationRequest, OpenAiProvider, ReferenceTask,
    SimilarityMeta,
};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Raw provider output longer than this is truncated in logs
const LOGGED_RESPONSE_CHARS: usize = 500;

/// Immutable view of the historical corpus shared by every estimation in a run
#[derive(Debug)]
pub struct CorpusSnapshot {
    id: Uuid,
    tasks: Vec<Arc<HistoricalTask>>,
    statistics: Option<Arc<DatasetStatistics>>,
}

impl CorpusSnapshot {
    /// Wrap the tasks and compute their statistics once
    pub fn new(tasks: Vec<HistoricalTask>) -> Self {
        let tasks: Vec<Arc<HistoricalTask>> = tasks.into_iter().map(Arc::new).collect();
        let statistics = calculate_dataset_statistics(&tasks).map(Arc::new);
        Self {
            id: Uuid::new_v4(),
            tasks,
            statistics,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tasks(&self) -> &[Arc<HistoricalTask>] {
        &self.tasks
    }

    pub fn statistics(&self) -> Option<&Arc<DatasetStatistics>> {
        self.statistics.as_ref()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Task estimator
pub struct Estimator {
    provider: Option<Arc<dyn EstimationProvider>>,
    store: Option<Arc<dyn IssueStore>>,
    retriever: SimilarityRetriever,
    config: EstimationConfig,
    request_timeout: Option<Duration>,
}

impl Estimator {
    pub fn new(config: EstimationConfig) -> Self {
        Self {
            provider: None,
            store: None,
            retriever: SimilarityRetriever::new(config.clone()),
            config,
            request_timeout: None,
        }
    }

    /// Wire the store, provider and call deadline from loaded settings
    ///
    /// The issues file wins over the seed file when both are set.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let provider = OpenAiProvider::new(settings.provider.clone())?;
        let mut estimator = Self::new(settings.estimation.clone())
            .with_provider(Arc::new(provider))
            .with_request_timeout(settings.provider.timeout());

        if let Some(path) = &settings.storage.issues_path {
            estimator = estimator.with_store(Arc::new(JsonIssueStore::new(path.clone())));
        } else if let Some(path) = &settings.storage.seed_path {
            estimator = estimator.with_store(Arc::new(SeedDataStore::new(path.clone())));
        }
        Ok(estimator)
    }

    pub fn with_provider(mut self, provider: Arc<dyn EstimationProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn IssueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Deadline for each individual provider call
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn config(&self) -> &EstimationConfig {
        &self.config
    }

    pub fn provider_name(&self) -> Option<&str> {
        self.provider.as_ref().map(|p| p.name())
    }

    /// Load the corpus for one run
    ///
    /// An unreadable store degrades to an empty corpus; estimation can still
    /// proceed on provider knowledge alone.
    pub async fn load_snapshot(&self) -> Arc<CorpusSnapshot> {
        let started = Instant::now();

        let Some(store) = &self.store else {
            warn!("No issue store configured, estimating without historical data");
            return Arc::new(CorpusSnapshot::empty());
        };

        let snapshot = match store.all_issues().await {
            Ok(issues) => CorpusSnapshot::new(historical_from_issues(issues)),
            Err(e) => {
                warn!("Could not load historical tasks: {}", e);
                CorpusSnapshot::empty()
            }
        };

        info!(
            "Loaded {} historical tasks from {} store in {:?}",
            snapshot.len(),
            store.name(),
            started.elapsed()
        );
        Arc::new(snapshot)
    }

    /// Estimate one task against a freshly loaded corpus
    pub async fn estimate(&self, cancel: &CancellationToken, task: &Task) -> Result<EstimationResult> {
        let snapshot = self.load_snapshot().await;
        self.estimate_with_snapshot(cancel, task, &snapshot).await
    }

    /// Estimate one task against an already loaded corpus
    pub async fn estimate_with_snapshot(
        &self,
        cancel: &CancellationToken,
        task: &Task,
        snapshot: &Arc<CorpusSnapshot>,
    ) -> Result<EstimationResult> {
        let started = Instant::now();
        let result = self.run_estimation(cancel, task, snapshot).await;
        let elapsed = started.elapsed();

        METRICS.record_estimation(result.is_ok(), elapsed);
        match &result {
            Ok(r) => info!(
                "Estimated '{}': {:.1} hours, {}, {:.0}% confidence ({}) in {:?}",
                task.title,
                r.estimation.estimated_hours,
                r.estimation.estimated_size,
                r.confidence_score() * 100.0,
                r.confidence_tier().as_str(),
                elapsed
            ),
            Err(e) => warn!("Estimation of '{}' failed after {:?}: {}", task.title, elapsed, e),
        }
        result
    }

    async fn run_estimation(
        &self,
        cancel: &CancellationToken,
        task: &Task,
        snapshot: &Arc<CorpusSnapshot>,
    ) -> Result<EstimationResult> {
        debug!("Estimating task: {}", task.title);

        let (similar, similarity_context) = self.retriever.find_similar_adaptive(task, snapshot.tasks());
        METRICS.record_similarity_matches(similar.len());
        debug!(
            "Found {} similar tasks at threshold {:.2} (highest similarity {:.2})",
            similar.len(),
            similarity_context.threshold_used,
            similarity_context.highest_similarity
        );

        let similar_tasks = select_enhanced_dataset(similar, snapshot.tasks(), &self.config);

        let provider = self.available_provider()?;
        let request = build_request(task, &similar_tasks, snapshot.statistics(), &similarity_context);

        if cancel.is_cancelled() {
            return Err(EstimatorError::ContextCanceled(format!(
                "estimation of '{}' canceled before the provider call",
                task.title
            )));
        }

        let raw = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(EstimatorError::ContextCanceled(format!(
                    "estimation of '{}' canceled during the provider call",
                    task.title
                )));
            }
            result = self.bounded(provider.request_estimate(&request)) => result?,
        };

        let estimation = parse_estimation_response(&raw).map_err(|e| {
            warn!(
                "Failed to parse provider response. Raw content (first {} chars): {}",
                LOGGED_RESPONSE_CHARS,
                raw.chars().take(LOGGED_RESPONSE_CHARS).collect::<String>()
            );
            EstimatorError::Provider(e.to_string())
        })?;

        Ok(EstimationResult {
            task: task.clone(),
            estimation,
            similar_tasks,
            dataset_stats: snapshot.statistics().cloned(),
            similarity_context,
            provider: provider.name().to_string(),
            snapshot_id: snapshot.id(),
        })
    }

    fn available_provider(&self) -> Result<&Arc<dyn EstimationProvider>> {
        match &self.provider {
            Some(provider) if provider.is_available() => Ok(provider),
            Some(provider) => Err(EstimatorError::ProviderUnavailable(format!(
                "{} provider is not configured",
                provider.name()
            ))),
            None => Err(EstimatorError::ProviderUnavailable(
                "no estimation provider configured".to_string(),
            )),
        }
    }

    async fn bounded<F>(&self, call: F) -> Result<String>
    where
        F: Future<Output = Result<String>>,
    {
        match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                EstimatorError::ContextCanceled(format!("provider call exceeded {:?}", limit))
            })?,
            None => call.await,
        }
    }
}

/// Assemble the provider request
///
/// Reference tasks without a backing record carry no usable text and are
/// left out.
pub fn build_request(
    task: &Task,
    similar_tasks: &[SimilarityMatch],
    statistics: Option<&Arc<DatasetStatistics>>,
    similarity_context: &SimilarityContext,
) -> EstimationRequest {
    EstimationRequest {
        task_title: task.title.clone(),
        task_description: task.description.clone(),
        similar_tasks: similar_tasks
            .iter()
            .filter(|m| m.task.issue.is_some())
            .map(ReferenceTask::from)
            .collect(),
        context: task.context.clone(),
        dataset_stats: statistics.cloned(),
        similarity_context: Some(SimilarityMeta::from(similarity_context)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{FieldMap, InMemoryIssueStore, IssueRecord, IssueState, JsonIssueStore, Size};
    use crate::estimator::models::ConfidenceTier;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const VALID: &str = r#"{"estimated_hours": 6, "estimated_size": "M", "story_points": 5,
        "confidence_score": 0.8, "reasoning": "Similar to the theme switcher"}"#;

    struct ScriptedProvider {
        response: String,
        delay: Duration,
        calls: AtomicUsize,
        last_request: Mutex<Option<EstimationRequest>>,
    }

    impl ScriptedProvider {
        fn new(response: &str) -> Self {
            Self {
                response: response.to_string(),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            }
        }

        fn slow(response: &str, delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new(response)
            }
        }
    }

    #[async_trait]
    impl EstimationProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn is_available(&self) -> bool {
            true
        }

        async fn request_estimate(&self, request: &EstimationRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(self.response.clone())
        }
    }

    fn issue(title: &str, labels: &[&str], hours: f64, size: &str) -> IssueRecord {
        let mut custom_fields = FieldMap::new();
        custom_fields.insert("Hours".to_string(), hours.into());
        custom_fields.insert("Size".to_string(), size.into());
        IssueRecord {
            number: 1,
            title: title.to_string(),
            body: String::new(),
            state: IssueState::Closed,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            custom_fields,
        }
    }

    fn store() -> Arc<dyn IssueStore> {
        Arc::new(InMemoryIssueStore::new(vec![
            issue("Implement theme switcher", &["frontend", "ui"], 6.0, "M"),
            issue("Optimize image pipeline", &["backend"], 12.0, "L"),
        ]))
    }

    fn estimator(provider: Arc<ScriptedProvider>) -> Estimator {
        Estimator::new(EstimationConfig::default())
            .with_store(store())
            .with_provider(provider)
    }

    #[tokio::test]
    async fn test_successful_estimation() {
        let provider = Arc::new(ScriptedProvider::new(VALID));
        let estimator = estimator(provider.clone());
        let task = Task::new("Add dark mode toggle").with_labels(["frontend", "ui"]);

        let result = estimator.estimate(&CancellationToken::new(), &task).await.unwrap();

        assert_eq!(result.estimation.estimated_hours, 6.0);
        assert_eq!(result.estimation.estimated_size, Size::M);
        assert_eq!(result.provider, "scripted");
        assert_eq!(result.confidence_tier(), ConfidenceTier::High);
        assert_eq!(result.similarity_context.total_tasks_scanned, 2);
        assert_eq!(result.dataset_stats.as_ref().unwrap().total_tasks, 2);
        assert_eq!(result.genuine_matches().count(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let request = provider.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.task_title, "Add dark mode toggle");
        assert_eq!(request.similar_tasks.len(), 2);
        assert_eq!(request.similar_tasks[0].title, "Implement theme switcher");
        assert!(request.dataset_stats.is_some());
    }

    #[tokio::test]
    async fn test_missing_provider_is_unavailable() {
        let estimator = Estimator::new(EstimationConfig::default()).with_store(store());
        let result = estimator
            .estimate(&CancellationToken::new(), &Task::new("Anything"))
            .await;
        assert!(matches!(result, Err(EstimatorError::ProviderUnavailable(_))));
    }

    #[tokio::test]
    async fn test_negative_hours_is_provider_error() {
        let provider = Arc::new(ScriptedProvider::new(&VALID.replace("6,", "-1,")));
        let result = estimator(provider)
            .estimate(&CancellationToken::new(), &Task::new("Add dark mode toggle"))
            .await;
        assert!(matches!(result, Err(EstimatorError::Provider(_))));
    }

    #[tokio::test]
    async fn test_unreadable_corpus_degrades_to_empty() {
        let provider = Arc::new(ScriptedProvider::new(VALID));
        let estimator = Estimator::new(EstimationConfig::default())
            .with_store(Arc::new(JsonIssueStore::new("/nonexistent/issues.json")))
            .with_provider(provider);

        let result = estimator
            .estimate(&CancellationToken::new(), &Task::new("Add dark mode toggle"))
            .await
            .unwrap();

        assert!(result.similar_tasks.is_empty());
        assert!(result.dataset_stats.is_none());
        assert_eq!(result.similarity_context.highest_similarity, 0.0);
    }

    #[tokio::test]
    async fn test_request_timeout_is_context_canceled() {
        let provider = Arc::new(ScriptedProvider::slow(VALID, Duration::from_secs(5)));
        let estimator = estimator(provider).with_request_timeout(Duration::from_millis(50));

        let result = estimator
            .estimate(&CancellationToken::new(), &Task::new("Add dark mode toggle"))
            .await;
        assert!(matches!(result, Err(EstimatorError::ContextCanceled(_))));
    }

    #[tokio::test]
    async fn test_cancellation_during_provider_call() {
        let provider = Arc::new(ScriptedProvider::slow(VALID, Duration::from_secs(5)));
        let estimator = estimator(provider);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = estimator.estimate(&cancel, &Task::new("Add dark mode toggle")).await;
        assert!(matches!(result, Err(EstimatorError::ContextCanceled(_))));
    }

    #[tokio::test]
    async fn test_already_canceled_skips_provider() {
        let provider = Arc::new(ScriptedProvider::new(VALID));
        let estimator = estimator(provider.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = estimator.estimate(&cancel, &Task::new("Add dark mode toggle")).await;
        assert!(matches!(result, Err(EstimatorError::ContextCanceled(_))));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_from_settings_uses_issue_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issues.json");
        let issues = vec![issue("Implement theme switcher", &["ui"], 6.0, "M")];
        std::fs::write(&path, serde_json::to_string(&issues).unwrap()).unwrap();

        let mut settings = Settings::default();
        settings.storage.issues_path = Some(path);
        let estimator = Estimator::from_settings(&settings).unwrap();

        assert_eq!(estimator.provider_name(), Some("OpenAI"));
        assert_eq!(estimator.request_timeout, Some(settings.provider.timeout()));
        assert_eq!(estimator.load_snapshot().await.len(), 1);
    }

    #[test]
    fn test_snapshot_statistics_computed_once() {
        let snapshot = CorpusSnapshot::new(vec![]);
        assert!(snapshot.is_empty());
        assert!(snapshot.statistics().is_none());

        let tasks = historical_from_issues(vec![issue("One", &[], 3.0, "S")]);
        let snapshot = CorpusSnapshot::new(tasks);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.statistics().unwrap().median_hours, 3.0);
    }
}
