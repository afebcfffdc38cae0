//! Reference dataset composition
//!
//! Retrieval results are topped up with diversity samples so the provider
//! always sees a spread of sizes and effort levels, even when nothing in the
//! corpus is closely related to the task.

use super::models::{MatchSignal, SimilarityMatch};
use crate::config::EstimationConfig;
use crate::corpus::{HistoricalTask, Size};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Effort percentiles used for percentile sampling
pub const SAMPLE_PERCENTILES: [f64; 5] = [0.10, 0.25, 0.50, 0.75, 0.90];

/// Counts of each kind of entry in an enhanced dataset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatasetComposition {
    pub similar: usize,
    pub stratified: usize,
    pub percentile: usize,
}

impl DatasetComposition {
    pub fn of(matches: &[SimilarityMatch]) -> Self {
        let mut composition = Self::default();
        for m in matches {
            if m.signals.contains(&MatchSignal::StratifiedSample) {
                composition.stratified += 1;
            } else if m.signals.contains(&MatchSignal::PercentileSample) {
                composition.percentile += 1;
            } else {
                composition.similar += 1;
            }
        }
        composition
    }

    pub fn total(&self) -> usize {
        self.similar + self.stratified + self.percentile
    }
}

/// Build the reference set sent to the provider
///
/// Keeps at most `max_similar_tasks` retrieval matches, then fills up to
/// `min_similar_tasks` with stratified samples (XS through XL, first
/// available entries per bucket) and then percentile samples. No corpus
/// entry appears twice. Deterministic for a fixed corpus order.
pub fn select_enhanced_dataset(
    similar: Vec<SimilarityMatch>,
    corpus: &[Arc<HistoricalTask>],
    config: &EstimationConfig,
) -> Vec<SimilarityMatch> {
    let mut selected: HashSet<usize> = HashSet::new();
    let mut enhanced: Vec<SimilarityMatch> = Vec::with_capacity(config.min_similar_tasks);

    for m in similar.into_iter().take(config.max_similar_tasks) {
        if selected.insert(m.corpus_index) {
            enhanced.push(m);
        }
    }

    if enhanced.len() < config.min_similar_tasks {
        add_stratified_samples(&mut enhanced, &mut selected, corpus, config);
    }

    if enhanced.len() < config.min_similar_tasks {
        add_percentile_samples(&mut enhanced, &mut selected, corpus, config);
    }

    let composition = DatasetComposition::of(&enhanced);
    info!(
        "Enhanced dataset: {} similar + {} stratified + {} percentile = {} total tasks",
        composition.similar,
        composition.stratified,
        composition.percentile,
        composition.total()
    );

    enhanced
}

fn add_stratified_samples(
    enhanced: &mut Vec<SimilarityMatch>,
    selected: &mut HashSet<usize>,
    corpus: &[Arc<HistoricalTask>],
    config: &EstimationConfig,
) {
    for size in Size::ALL {
        if enhanced.len() >= config.min_similar_tasks {
            break;
        }

        let bucket: Vec<usize> = corpus
            .iter()
            .enumerate()
            .filter(|(index, task)| task.size == Some(size) && !selected.contains(index))
            .map(|(index, _)| index)
            .take(config.stratified_samples_per_size)
            .collect();

        for index in bucket {
            if enhanced.len() >= config.min_similar_tasks {
                break;
            }
            selected.insert(index);
            enhanced.push(sample(corpus, index, MatchSignal::StratifiedSample));
        }
    }
}

fn add_percentile_samples(
    enhanced: &mut Vec<SimilarityMatch>,
    selected: &mut HashSet<usize>,
    corpus: &[Arc<HistoricalTask>],
    config: &EstimationConfig,
) {
    let mut candidates: Vec<usize> = corpus
        .iter()
        .enumerate()
        .filter(|(index, task)| task.has_hours() && !selected.contains(index))
        .map(|(index, _)| index)
        .collect();
    if candidates.is_empty() {
        return;
    }
    candidates.sort_by(|a, b| corpus[*a].actual_hours.total_cmp(&corpus[*b].actual_hours));

    let n = candidates.len();
    for p in SAMPLE_PERCENTILES {
        if enhanced.len() >= config.min_similar_tasks {
            break;
        }
        let target = ((n - 1) as f64 * p).floor() as usize;
        if let Some(rank) = nearest_unselected(&candidates, target, selected) {
            let index = candidates[rank];
            selected.insert(index);
            enhanced.push(sample(corpus, index, MatchSignal::PercentileSample));
        }
    }
}

/// Closest rank to `target` whose entry is still free, preferring the lower rank
fn nearest_unselected(candidates: &[usize], target: usize, selected: &HashSet<usize>) -> Option<usize> {
    let is_free = |rank: usize| !selected.contains(&candidates[rank]);

    for distance in 0..candidates.len() {
        if let Some(lower) = target.checked_sub(distance) {
            if is_free(lower) {
                return Some(lower);
            }
        }
        let upper = target + distance;
        if upper < candidates.len() && is_free(upper) {
            return Some(upper);
        }
    }
    None
}

fn sample(corpus: &[Arc<HistoricalTask>], index: usize, signal: MatchSignal) -> SimilarityMatch {
    SimilarityMatch {
        task: Arc::clone(&corpus[index]),
        corpus_index: index,
        similarity: 0.0,
        signals: vec![signal],
    }
}
