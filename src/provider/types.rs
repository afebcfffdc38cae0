//! Request and response types exchanged with the estimation provider

use crate::corpus::{FieldMap, Size};
use crate::estimator::{DatasetStatistics, SimilarityContext, SimilarityMatch};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Structured request for a single task estimate
#[derive(Debug, Clone, Serialize)]
pub struct EstimationRequest {
    pub task_title: String,
    pub task_description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub similar_tasks: Vec<ReferenceTask>,
    #[serde(skip_serializing_if = "FieldMap::is_empty")]
    pub context: FieldMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_stats: Option<Arc<DatasetStatistics>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_context: Option<SimilarityMeta>,
}

/// Summary of the similarity search sent alongside the reference tasks
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMeta {
    pub threshold_used: f64,
    pub highest_similarity: f64,
    pub matches_found: usize,
}

impl From<&SimilarityContext> for SimilarityMeta {
    fn from(context: &SimilarityContext) -> Self {
        Self {
            threshold_used: context.threshold_used,
            highest_similarity: context.highest_similarity,
            matches_found: context.matches_found,
        }
    }
}

/// A historical task as presented to the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTask {
    pub title: String,
    pub description: String,
    pub actual_hours: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_size: Option<Size>,
    pub story_points: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "FieldMap::is_empty")]
    pub custom_fields: FieldMap,
    /// 0.0 for diversity samples
    pub similarity: f64,
}

impl From<&SimilarityMatch> for ReferenceTask {
    fn from(m: &SimilarityMatch) -> Self {
        let issue = m.task.issue.as_ref();
        Self {
            title: m.task.title().to_string(),
            description: issue.map(|i| i.body.clone()).unwrap_or_default(),
            actual_hours: m.task.actual_hours,
            estimated_size: m.task.size,
            story_points: m.task.story_points,
            labels: m.task.labels().to_vec(),
            custom_fields: issue.map(|i| i.custom_fields.clone()).unwrap_or_default(),
            similarity: m.similarity,
        }
    }
}

/// Validated estimate returned by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationResponse {
    pub estimated_hours: f64,
    pub estimated_size: Size,
    pub story_points: f64,
    pub confidence_score: f64,
    pub reasoning: String,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_action: Option<String>,
}
