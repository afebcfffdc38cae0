//! Read access to locally persisted issue records

use super::models::{FieldMap, FieldValue, IssueRecord, IssueState};
use crate::error::{EstimatorError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Read side of the issue persistence layer
#[async_trait]
pub trait IssueStore: Send + Sync {
    /// Store name used in logs
    fn name(&self) -> &str;

    /// Every locally persisted issue record, in storage order
    async fn all_issues(&self) -> Result<Vec<IssueRecord>>;
}

/// Store backed by an in-memory list
#[derive(Debug, Clone, Default)]
pub struct InMemoryIssueStore {
    issues: Vec<IssueRecord>,
}

impl InMemoryIssueStore {
    pub fn new(issues: Vec<IssueRecord>) -> Self {
        Self { issues }
    }
}

#[async_trait]
impl IssueStore for InMemoryIssueStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn all_issues(&self) -> Result<Vec<IssueRecord>> {
        Ok(self.issues.clone())
    }
}

/// Store backed by a JSON file holding an array of issue records
#[derive(Debug, Clone)]
pub struct JsonIssueStore {
    path: PathBuf,
}

impl JsonIssueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl IssueStore for JsonIssueStore {
    fn name(&self) -> &str {
        "json"
    }

    async fn all_issues(&self) -> Result<Vec<IssueRecord>> {
        let raw = read_corpus_file(&self.path).await?;
        let issues: Vec<IssueRecord> = serde_json::from_str(&raw).map_err(|e| {
            EstimatorError::CorpusUnavailable(format!(
                "invalid issue records in {}: {}",
                self.path.display(),
                e
            ))
        })?;

        info!("Read {} issue records from {}", issues.len(), self.path.display());
        Ok(issues)
    }
}

/// Developer seed data file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub metadata: SeedMetadata,
    pub tasks: Vec<SeedTask>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedMetadata {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub total_tasks: usize,
}

/// A single seeded task, flattened the way the seed files are authored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub actual_hours: f64,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
    #[serde(default)]
    pub story_points: f64,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub complexity: Option<String>,
    #[serde(default = "default_seed_state")]
    pub state: IssueState,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub custom_fields: FieldMap,
}

fn default_seed_state() -> IssueState {
    IssueState::Closed
}

impl SeedTask {
    /// Convert to the record shape produced by the tracker sync
    pub fn into_issue(self, number: u64) -> IssueRecord {
        let mut custom_fields = FieldMap::new();
        if self.actual_hours > 0.0 {
            custom_fields.insert("Actual Hours".to_string(), FieldValue::Number(self.actual_hours));
        }
        if self.story_points > 0.0 {
            custom_fields.insert("Story Points".to_string(), FieldValue::Number(self.story_points));
        }
        if !self.size.trim().is_empty() {
            custom_fields.insert("Size".to_string(), FieldValue::Text(self.size));
        }
        if let Some(complexity) = self.complexity.filter(|c| !c.trim().is_empty()) {
            custom_fields.insert("Complexity".to_string(), FieldValue::Text(complexity));
        }
        if let Some(priority) = self.priority.filter(|p| !p.trim().is_empty()) {
            custom_fields.insert("Priority".to_string(), FieldValue::Text(priority));
        }
        if !self.category.trim().is_empty() {
            custom_fields.insert("Category".to_string(), FieldValue::Text(self.category));
        }
        // Explicit custom fields win over the flattened columns
        custom_fields.extend(self.custom_fields);

        IssueRecord {
            number,
            title: self.title,
            body: self.description,
            state: self.state,
            labels: self.labels,
            custom_fields,
        }
    }
}

/// Store backed by a developer seed data file
#[derive(Debug, Clone)]
pub struct SeedDataStore {
    path: PathBuf,
}

impl SeedDataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse the seed file without converting it
    pub async fn load_seed_data(&self) -> Result<SeedData> {
        let raw = read_corpus_file(&self.path).await?;
        let seed: SeedData = serde_json::from_str(&raw).map_err(|e| {
            EstimatorError::CorpusUnavailable(format!(
                "invalid seed data in {}: {}",
                self.path.display(),
                e
            ))
        })?;
        debug!(
            "Seed data version '{}' declares {} tasks, contains {}",
            seed.metadata.version,
            seed.metadata.total_tasks,
            seed.tasks.len()
        );
        Ok(seed)
    }
}

#[async_trait]
impl IssueStore for SeedDataStore {
    fn name(&self) -> &str {
        "seed"
    }

    async fn all_issues(&self) -> Result<Vec<IssueRecord>> {
        let seed = self.load_seed_data().await?;
        let issues: Vec<IssueRecord> = seed
            .tasks
            .into_iter()
            .enumerate()
            .map(|(i, task)| task.into_issue(i as u64 + 1))
            .collect();

        info!("Read {} seeded issues from {}", issues.len(), self.path.display());
        Ok(issues)
    }
}

async fn read_corpus_file(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        EstimatorError::CorpusUnavailable(format!("failed to read {}: {}", path.display(), e))
    })
}
