//! Similar-task retrieval over the historical corpus
//!
//! The adaptive search scores every corpus entry once, then walks a fixed
//! ladder of thresholds from strict to loose until enough matches clear the
//! current rung.

use super::models::{SimilarityContext, SimilarityMatch, Task};
use super::similarity::{PreparedTask, SimilarityScorer};
use crate::config::EstimationConfig;
use crate::corpus::HistoricalTask;
use std::sync::Arc;
use tracing::debug;

/// Thresholds tried by the adaptive search, strictest first
pub const ADAPTIVE_THRESHOLDS: [f64; 5] = [0.50, 0.40, 0.30, 0.20, 0.15];

/// Retriever for similar historical tasks
#[derive(Debug, Clone, Default)]
pub struct SimilarityRetriever {
    scorer: SimilarityScorer,
    config: EstimationConfig,
}

struct ScoredEntry {
    corpus_index: usize,
    similarity: f64,
}

impl SimilarityRetriever {
    pub fn new(config: EstimationConfig) -> Self {
        Self {
            scorer: SimilarityScorer::default(),
            config,
        }
    }

    pub fn with_scorer(mut self, scorer: SimilarityScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn config(&self) -> &EstimationConfig {
        &self.config
    }

    /// Adaptive search over the corpus
    ///
    /// Stops at the first threshold yielding `min_retrieval_matches`; when
    /// none does, returns whatever cleared the loosest threshold, possibly
    /// nothing. An empty result reports `min_similarity_threshold` as the
    /// threshold used.
    pub fn find_similar_adaptive(
        &self,
        task: &Task,
        corpus: &[Arc<HistoricalTask>],
    ) -> (Vec<SimilarityMatch>, SimilarityContext) {
        let prepared = PreparedTask::new(task);
        let scores: Vec<f64> = corpus
            .iter()
            .map(|historical| self.scorer.score_prepared(&prepared, historical))
            .collect();
        let highest_similarity = scores.iter().copied().fold(0.0_f64, f64::max);

        let mut context = SimilarityContext {
            total_tasks_scanned: corpus.len(),
            highest_similarity,
            ..Default::default()
        };

        let mut selected = Vec::new();
        for (attempt, threshold) in ADAPTIVE_THRESHOLDS.iter().enumerate() {
            selected = filter_sorted(&scores, *threshold);
            context.thresholds_tried = attempt + 1;
            context.threshold_used = *threshold;

            if selected.len() >= self.config.min_retrieval_matches {
                context.reached_minimum = true;
                debug!(
                    "Threshold {:.2} yielded {} matches for '{}'",
                    threshold,
                    selected.len(),
                    task.title
                );
                break;
            }
        }

        if !context.reached_minimum {
            debug!(
                "Only {} matches at loosest threshold for '{}' (highest similarity {:.2})",
                selected.len(),
                task.title,
                highest_similarity
            );
        }
        if selected.is_empty() {
            context.threshold_used = self.config.min_similarity_threshold;
        }

        selected.truncate(self.config.max_similar_tasks);
        context.matches_found = selected.len();

        let matches = self.to_matches(&prepared, corpus, selected);
        (matches, context)
    }

    /// Single-threshold search at `min_similarity_threshold`
    pub fn find_similar(&self, task: &Task, corpus: &[Arc<HistoricalTask>]) -> Vec<SimilarityMatch> {
        let prepared = PreparedTask::new(task);
        let scores: Vec<f64> = corpus
            .iter()
            .map(|historical| self.scorer.score_prepared(&prepared, historical))
            .collect();

        let mut selected = filter_sorted(&scores, self.config.min_similarity_threshold);
        selected.truncate(self.config.max_similar_tasks);
        self.to_matches(&prepared, corpus, selected)
    }

    fn to_matches(
        &self,
        prepared: &PreparedTask<'_>,
        corpus: &[Arc<HistoricalTask>],
        selected: Vec<ScoredEntry>,
    ) -> Vec<SimilarityMatch> {
        selected
            .into_iter()
            .map(|entry| {
                let task = Arc::clone(&corpus[entry.corpus_index]);
                let signals = self.scorer.matched_signals(prepared, &task);
                SimilarityMatch {
                    task,
                    corpus_index: entry.corpus_index,
                    similarity: entry.similarity,
                    signals,
                }
            })
            .collect()
    }
}

/// Entries at or above the threshold, best first, ties in corpus order
fn filter_sorted(scores: &[f64], threshold: f64) -> Vec<ScoredEntry> {
    let mut entries: Vec<ScoredEntry> = scores
        .iter()
        .enumerate()
        .filter(|(_, score)| **score >= threshold)
        .map(|(corpus_index, score)| ScoredEntry {
            corpus_index,
            similarity: *score,
        })
        .collect();
    // sort_by is stable, so equal scores keep corpus order
    entries.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    entries
}
