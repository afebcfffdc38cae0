//! Data models for task estimation

use super::statistics::DatasetStatistics;
use crate::corpus::{FieldMap, FieldValue, HistoricalTask};
use crate::provider::EstimationResponse;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// A task to be estimated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Free-form context such as priority or story points
    #[serde(default)]
    pub context: FieldMap,
}

impl Task {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Why a historical task was selected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSignal {
    Title,
    Description,
    Labels,
    CustomFields,
    /// Chosen by size bucket, not by similarity
    StratifiedSample,
    /// Chosen by proximity to an effort percentile, not by similarity
    PercentileSample,
}

impl MatchSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchSignal::Title => "title",
            MatchSignal::Description => "description",
            MatchSignal::Labels => "labels",
            MatchSignal::CustomFields => "custom_fields",
            MatchSignal::StratifiedSample => "stratified_sample",
            MatchSignal::PercentileSample => "percentile_sample",
        }
    }

    pub fn is_sample(&self) -> bool {
        matches!(self, MatchSignal::StratifiedSample | MatchSignal::PercentileSample)
    }
}

/// A historical task paired with its similarity to the task being estimated
///
/// Diversity samples always carry a similarity of exactly 0.0; their score
/// says nothing about relatedness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityMatch {
    pub task: Arc<HistoricalTask>,
    /// Position of the task in the corpus snapshot it was drawn from
    pub corpus_index: usize,
    pub similarity: f64,
    pub signals: Vec<MatchSignal>,
}

impl SimilarityMatch {
    pub fn is_diversity_sample(&self) -> bool {
        self.signals.iter().any(MatchSignal::is_sample)
    }
}

/// How the adaptive search behaved for one task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarityContext {
    pub threshold_used: f64,
    pub thresholds_tried: usize,
    pub total_tasks_scanned: usize,
    pub matches_found: usize,
    /// Highest score seen across the whole corpus, even below every threshold
    pub highest_similarity: f64,
    /// Some threshold yielded the minimum match count before truncation
    #[serde(default)]
    pub reached_minimum: bool,
}

/// Bucket derived from the provider's confidence score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    pub const HIGH_THRESHOLD: f64 = 0.70;
    pub const MEDIUM_THRESHOLD: f64 = 0.50;

    pub fn from_score(score: f64) -> Self {
        if score >= Self::HIGH_THRESHOLD {
            ConfidenceTier::High
        } else if score >= Self::MEDIUM_THRESHOLD {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "high",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::Low => "low",
        }
    }
}

/// Complete outcome of estimating one task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimationResult {
    pub task: Task,
    pub estimation: EstimationResponse,
    /// Reference tasks sent to the provider
    pub similar_tasks: Vec<SimilarityMatch>,
    pub dataset_stats: Option<Arc<DatasetStatistics>>,
    pub similarity_context: SimilarityContext,
    /// Name of the provider that produced the estimate
    pub provider: String,
    /// Corpus snapshot every reference task was drawn from
    pub snapshot_id: Uuid,
}

impl EstimationResult {
    pub fn confidence_score(&self) -> f64 {
        self.estimation.confidence_score
    }

    pub fn confidence_tier(&self) -> ConfidenceTier {
        ConfidenceTier::from_score(self.estimation.confidence_score)
    }

    /// Reference tasks that came from the similarity search
    pub fn genuine_matches(&self) -> impl Iterator<Item = &SimilarityMatch> {
        self.similar_tasks.iter().filter(|m| !m.is_diversity_sample())
    }
}
