//! Multi-signal similarity between a new task and a historical task
//!
//! Four weighted signals are combined and re-normalized by the weights that
//! actually applied:
//! - title word overlap (40%)
//! - description word overlap (30%), skipped when either side is empty
//! - label overlap (20%)
//! - context field agreement (10%), skipped when either side is empty

use super::models::{MatchSignal, Task};
use crate::corpus::{FieldMap, HistoricalTask};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Tokens this short are treated as noise
const MIN_TOKEN_CHARS: usize = 3;

/// Weights of the individual similarity signals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityWeights {
    pub title: f64,
    pub description: f64,
    pub labels: f64,
    pub context: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            title: 0.4,
            description: 0.3,
            labels: 0.2,
            context: 0.1,
        }
    }
}

/// Minimum per-signal score for a signal to be reported as matched
#[derive(Debug, Clone, Copy, PartialEq)]
struct SignalThresholds {
    title: f64,
    description: f64,
    labels: f64,
    context: f64,
}

const SIGNAL_THRESHOLDS: SignalThresholds = SignalThresholds {
    title: 0.5,
    description: 0.3,
    labels: 0.3,
    context: 0.3,
};

/// Task features computed once and reused across the whole corpus
#[derive(Debug, Clone)]
pub struct PreparedTask<'a> {
    task: &'a Task,
    title_words: HashSet<String>,
    description_words: HashSet<String>,
    labels: HashSet<String>,
}

impl<'a> PreparedTask<'a> {
    pub fn new(task: &'a Task) -> Self {
        Self {
            task,
            title_words: extract_words(&task.title),
            description_words: extract_words(&task.description),
            labels: normalize_labels(&task.labels),
        }
    }

    pub fn task(&self) -> &Task {
        self.task
    }
}

/// Per-signal scores; `None` marks a signal that did not apply
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalScores {
    pub title: f64,
    pub description: Option<f64>,
    pub labels: f64,
    pub context: Option<f64>,
}

/// Weighted similarity scorer
#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityScorer {
    weights: SimilarityWeights,
}

impl SimilarityScorer {
    pub fn new(weights: SimilarityWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &SimilarityWeights {
        &self.weights
    }

    /// Similarity in [0, 1] between a task and a historical task
    pub fn score(&self, task: &Task, historical: &HistoricalTask) -> f64 {
        self.score_prepared(&PreparedTask::new(task), historical)
    }

    pub fn score_prepared(&self, prepared: &PreparedTask<'_>, historical: &HistoricalTask) -> f64 {
        match signal_scores(prepared, historical) {
            Some(signals) => self.combine(&signals),
            None => 0.0,
        }
    }

    /// Signals that individually cleared their reporting threshold
    pub fn matched_signals(
        &self,
        prepared: &PreparedTask<'_>,
        historical: &HistoricalTask,
    ) -> Vec<MatchSignal> {
        let Some(signals) = signal_scores(prepared, historical) else {
            return Vec::new();
        };

        let mut matched = Vec::new();
        if signals.title > SIGNAL_THRESHOLDS.title {
            matched.push(MatchSignal::Title);
        }
        if signals.description.is_some_and(|s| s > SIGNAL_THRESHOLDS.description) {
            matched.push(MatchSignal::Description);
        }
        if signals.labels > SIGNAL_THRESHOLDS.labels {
            matched.push(MatchSignal::Labels);
        }
        if signals.context.is_some_and(|s| s > SIGNAL_THRESHOLDS.context) {
            matched.push(MatchSignal::CustomFields);
        }
        matched
    }

    fn combine(&self, signals: &SignalScores) -> f64 {
        let w = &self.weights;
        let mut total_score = signals.title * w.title + signals.labels * w.labels;
        let mut total_weight = w.title + w.labels;

        if let Some(description) = signals.description {
            total_score += description * w.description;
            total_weight += w.description;
        }
        if let Some(context) = signals.context {
            total_score += context * w.context;
            total_weight += w.context;
        }

        if total_weight > 0.0 {
            (total_score / total_weight).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Similarity with the default weights
pub fn calculate_similarity(task: &Task, historical: &HistoricalTask) -> f64 {
    SimilarityScorer::default().score(task, historical)
}

/// Raw signal scores; `None` when the historical task has no source record
pub fn signal_scores(prepared: &PreparedTask<'_>, historical: &HistoricalTask) -> Option<SignalScores> {
    let issue = historical.issue.as_ref()?;

    let title = text_similarity(&prepared.title_words, &extract_words(&issue.title));

    let description = if prepared.task.description.is_empty() || issue.body.is_empty() {
        None
    } else {
        Some(text_similarity(
            &prepared.description_words,
            &extract_words(&issue.body),
        ))
    };

    let labels = label_similarity(&prepared.labels, &normalize_labels(&issue.labels));

    let context = if prepared.task.context.is_empty() || issue.custom_fields.is_empty() {
        None
    } else {
        Some(context_similarity(&prepared.task.context, &issue.custom_fields))
    };

    Some(SignalScores {
        title,
        description,
        labels,
        context,
    })
}

/// Jaccard over word sets; empty text on either side scores 0
fn text_similarity(words1: &HashSet<String>, words2: &HashSet<String>) -> f64 {
    if words1.is_empty() || words2.is_empty() {
        return 0.0;
    }
    jaccard(words1, words2)
}

/// Label overlap: two empty sets match perfectly, one empty set never matches
pub fn label_similarity(labels1: &HashSet<String>, labels2: &HashSet<String>) -> f64 {
    match (labels1.is_empty(), labels2.is_empty()) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        (false, false) => jaccard(labels1, labels2),
    }
}

/// Share of keys, across both maps, whose values agree
pub fn context_similarity(context1: &FieldMap, context2: &FieldMap) -> f64 {
    if context1.is_empty() && context2.is_empty() {
        return 1.0;
    }
    if context1.is_empty() || context2.is_empty() {
        return 0.0;
    }

    let matched = context1
        .iter()
        .filter(|(key, value)| context2.get(*key).is_some_and(|other| value.matches(other)))
        .count();
    let total = context1.len() + context2.keys().filter(|k| !context1.contains_key(*k)).count();

    if total == 0 {
        return 0.0;
    }
    matched as f64 / total as f64
}

/// Jaccard similarity coefficient of two sets
pub fn jaccard(set1: &HashSet<String>, set2: &HashSet<String>) -> f64 {
    if set1.is_empty() && set2.is_empty() {
        return 1.0;
    }
    let intersection = set1.intersection(set2).count();
    let union = set1.len() + set2.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

/// Lower-cased alphanumeric words longer than two characters
pub fn extract_words(text: &str) -> HashSet<String> {
    let normalized: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    normalized
        .split_whitespace()
        .filter(|word| word.chars().count() >= MIN_TOKEN_CHARS)
        .map(str::to_string)
        .collect()
}

fn normalize_labels(labels: &[String]) -> HashSet<String> {
    labels.iter().map(|l| l.to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{FieldValue, IssueRecord, IssueState};

    fn historical(title: &str, body: &str, labels: &[&str]) -> HistoricalTask {
        HistoricalTask {
            issue: Some(IssueRecord {
                number: 1,
                title: title.to_string(),
                body: body.to_string(),
                state: IssueState::Closed,
                labels: labels.iter().map(|l| l.to_string()).collect(),
                custom_fields: FieldMap::new(),
            }),
            actual_hours: 4.0,
            size: None,
            story_points: 0.0,
        }
    }

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extract_words_drops_noise() {
        let words = extract_words("Fix a UI bug in the Login-Page!");
        assert_eq!(words, set(&["fix", "bug", "the", "loginpage"]));
    }

    #[test]
    fn test_label_similarity_edge_cases() {
        assert_eq!(label_similarity(&set(&[]), &set(&[])), 1.0);
        assert_eq!(label_similarity(&set(&[]), &set(&["ui"])), 0.0);
        assert_eq!(label_similarity(&set(&["ui"]), &set(&["backend"])), 0.0);
        assert_eq!(label_similarity(&set(&["ui", "frontend"]), &set(&["frontend", "ui"])), 1.0);
        assert!((label_similarity(&set(&["ui", "api"]), &set(&["ui"])) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_labels_are_case_insensitive() {
        let task = Task::new("Something").with_labels(["Frontend"]);
        let hist = historical("Other", "", &["frontend"]);
        let prepared = PreparedTask::new(&task);
        let signals = signal_scores(&prepared, &hist).unwrap();
        assert_eq!(signals.labels, 1.0);
    }

    #[test]
    fn test_identical_task_scores_high() {
        let task = Task::new("Implement OAuth login flow")
            .with_description("Add Google and GitHub providers to the login page")
            .with_labels(["auth", "backend"]);
        let hist = historical(
            "Implement OAuth login flow",
            "Add Google and GitHub providers to the login page",
            &["auth", "backend"],
        );
        assert!(calculate_similarity(&task, &hist) >= 0.95);
    }

    #[test]
    fn test_missing_description_is_skipped_not_penalized() {
        let task = Task::new("Implement OAuth login flow").with_labels(["auth"]);
        let hist = historical(
            "Implement OAuth login flow",
            "A long description nobody on the new task wrote",
            &["auth"],
        );
        assert!((calculate_similarity(&task, &hist) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_source_record_scores_zero() {
        let task = Task::new("Anything at all");
        let hist = HistoricalTask {
            issue: None,
            actual_hours: 3.0,
            size: None,
            story_points: 0.0,
        };
        assert_eq!(calculate_similarity(&task, &hist), 0.0);
        let prepared = PreparedTask::new(&task);
        assert!(SimilarityScorer::default().matched_signals(&prepared, &hist).is_empty());
    }

    #[test]
    fn test_context_similarity() {
        let mut a = FieldMap::new();
        a.insert("priority".to_string(), FieldValue::from("High"));
        a.insert("points".to_string(), FieldValue::from(3.0));
        let mut b = FieldMap::new();
        b.insert("priority".to_string(), FieldValue::from("high"));
        b.insert("team".to_string(), FieldValue::from("core"));

        // priority matches; keys across both maps: priority, points, team
        assert!((context_similarity(&a, &b) - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(context_similarity(&a, &FieldMap::new()), 0.0);
    }

    #[test]
    fn test_context_weight_applies_only_when_both_present() {
        let task = Task::new("Tune cache eviction").with_context("priority", "high");
        let mut hist = historical("Tune cache eviction", "", &[]);
        let plain = calculate_similarity(&task, &hist);
        assert!((plain - 1.0).abs() < 1e-9);

        if let Some(issue) = hist.issue.as_mut() {
            issue.custom_fields.insert("priority".to_string(), FieldValue::from("low"));
        }
        let with_context = calculate_similarity(&task, &hist);
        // (0.4 + 0.2) / 0.7
        assert!((with_context - 0.6 / 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_matched_signals() {
        let task = Task::new("Refactor payment service retries").with_labels(["payments"]);
        let hist = historical("Refactor payment service retries", "", &["payments", "infra"]);
        let prepared = PreparedTask::new(&task);
        let signals = SimilarityScorer::default().matched_signals(&prepared, &hist);
        assert_eq!(signals, vec![MatchSignal::Title, MatchSignal::Labels]);
    }

    #[test]
    fn test_default_weights() {
        let scorer = SimilarityScorer::default();
        let weights = scorer.weights();
        assert_eq!(*weights, SimilarityWeights::default());
        let sum = weights.title + weights.description + weights.labels + weights.context;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_is_bounded() {
        let tasks = [
            Task::new(""),
            Task::new("a b c"),
            Task::new("Add dark mode toggle").with_labels(["ui"]),
            Task::new("Migrate database").with_description("Move to Postgres 16"),
        ];
        let hists = [
            historical("", "", &[]),
            historical("Add dark mode toggle", "", &["ui"]),
            historical("Postgres upgrade", "Move the database to Postgres 16", &["db"]),
        ];
        for task in &tasks {
            for hist in &hists {
                let score = calculate_similarity(task, hist);
                assert!((0.0..=1.0).contains(&score), "score {} out of range", score);
            }
        }
    }
}
