//! Corpus-wide effort statistics

use crate::corpus::{HistoricalTask, Size};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Percentiles reported in [`DatasetStatistics::percentile_hours`]
pub const PERCENTILES: [f64; 5] = [0.10, 0.25, 0.50, 0.75, 0.90];

/// Maximum example titles kept per category
const MAX_CATEGORY_TITLES: usize = 3;

/// Effort summary for one label-derived category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub count: usize,
    pub avg_hours: f64,
    pub min_hours: f64,
    pub max_hours: f64,
    pub task_titles: Vec<String>,
}

/// Aggregate view of the historical corpus
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetStatistics {
    pub total_tasks: usize,
    pub closed_tasks: usize,
    pub avg_hours: f64,
    pub median_hours: f64,
    /// Hours at the 10th, 25th, 50th, 75th and 90th percentiles; empty
    /// when no task has hours
    pub percentile_hours: Vec<f64>,
    pub tasks_by_size: BTreeMap<Size, usize>,
    /// Tasks per label, in first-seen order
    pub tasks_by_category: IndexMap<String, usize>,
    pub category_breakdown: IndexMap<String, CategoryStats>,
}

#[derive(Default)]
struct CategoryAccumulator {
    hours: Vec<f64>,
    titles: Vec<String>,
}

/// Summarize the corpus; `None` when it is empty
pub fn calculate_dataset_statistics(corpus: &[Arc<HistoricalTask>]) -> Option<DatasetStatistics> {
    if corpus.is_empty() {
        return None;
    }

    let mut stats = DatasetStatistics::default();
    let mut hours: Vec<f64> = Vec::new();
    let mut categories: IndexMap<String, CategoryAccumulator> = IndexMap::new();

    for task in corpus {
        stats.total_tasks += 1;

        if task.issue.as_ref().is_some_and(|i| i.is_closed()) {
            stats.closed_tasks += 1;
        }

        if task.has_hours() {
            hours.push(task.actual_hours);
        }

        if let Some(size) = task.size {
            *stats.tasks_by_size.entry(size).or_insert(0) += 1;
        }

        if let Some(issue) = &task.issue {
            for label in &issue.labels {
                *stats.tasks_by_category.entry(label.clone()).or_insert(0) += 1;

                let acc = categories.entry(label.clone()).or_default();
                if task.has_hours() {
                    acc.hours.push(task.actual_hours);
                }
                if acc.titles.len() < MAX_CATEGORY_TITLES {
                    acc.titles.push(issue.title.clone());
                }
            }
        }
    }

    if !hours.is_empty() {
        stats.avg_hours = hours.iter().sum::<f64>() / hours.len() as f64;
        hours.sort_by(f64::total_cmp);
        stats.median_hours = median_sorted(&hours);
        stats.percentile_hours = PERCENTILES
            .iter()
            .map(|p| percentile_sorted(&hours, *p))
            .collect();
    }

    for (category, acc) in categories {
        if acc.hours.is_empty() {
            continue;
        }
        let total: f64 = acc.hours.iter().sum();
        stats.category_breakdown.insert(
            category,
            CategoryStats {
                count: acc.hours.len(),
                avg_hours: total / acc.hours.len() as f64,
                min_hours: acc.hours.iter().copied().fold(f64::INFINITY, f64::min),
                max_hours: acc.hours.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                task_titles: acc.titles,
            },
        );
    }

    Some(stats)
}

/// Median of an ascending slice; the mean of the middle pair for even lengths
pub fn median_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    let mid = n / 2;
    if n % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Value at index `floor((n - 1) * p)` of an ascending slice
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = ((sorted.len() - 1) as f64 * p).floor() as usize;
    sorted[index.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{FieldMap, IssueRecord, IssueState};

    fn historical(title: &str, labels: &[&str], hours: f64, size: Option<Size>) -> Arc<HistoricalTask> {
        Arc::new(HistoricalTask {
            issue: Some(IssueRecord {
                number: 0,
                title: title.to_string(),
                body: String::new(),
                state: IssueState::Closed,
                labels: labels.iter().map(|l| l.to_string()).collect(),
                custom_fields: FieldMap::new(),
            }),
            actual_hours: hours,
            size,
            story_points: 0.0,
        })
    }

    #[test]
    fn test_empty_corpus_has_no_statistics() {
        assert!(calculate_dataset_statistics(&[]).is_none());
    }

    #[test]
    fn test_basic_statistics() {
        let corpus = vec![
            historical("a", &["frontend"], 2.0, Some(Size::S)),
            historical("b", &["frontend", "ui"], 6.0, Some(Size::M)),
            historical("c", &["backend"], 10.0, Some(Size::L)),
            historical("d", &["backend"], 0.0, Some(Size::M)),
        ];

        let stats = calculate_dataset_statistics(&corpus).unwrap();

        assert_eq!(stats.total_tasks, 4);
        assert_eq!(stats.closed_tasks, 4);
        assert!((stats.avg_hours - 6.0).abs() < 1e-9);
        assert_eq!(stats.median_hours, 6.0);
        assert_eq!(stats.tasks_by_size[&Size::M], 2);
        assert_eq!(stats.tasks_by_category["backend"], 2);

        let keys: Vec<&String> = stats.tasks_by_category.keys().collect();
        assert_eq!(keys, vec!["frontend", "ui", "backend"]);

        let frontend = &stats.category_breakdown["frontend"];
        assert_eq!(frontend.count, 2);
        assert_eq!(frontend.min_hours, 2.0);
        assert_eq!(frontend.max_hours, 6.0);
        assert_eq!(frontend.avg_hours, 4.0);
        assert_eq!(frontend.task_titles, vec!["a", "b"]);

        // Only the task with hours counts toward the breakdown
        assert_eq!(stats.category_breakdown["backend"].count, 1);
        assert_eq!(stats.category_breakdown["backend"].task_titles, vec!["c", "d"]);
    }

    #[test]
    fn test_median_matches_brute_force() {
        let values = [7.0, 1.0, 3.0, 12.0, 5.0, 8.0];
        let corpus: Vec<_> = values
            .iter()
            .map(|h| historical("t", &[], *h, None))
            .collect();
        let stats = calculate_dataset_statistics(&corpus).unwrap();

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let brute = (sorted[2] + sorted[3]) / 2.0;
        assert_eq!(stats.median_hours, brute);
    }

    #[test]
    fn test_percentiles_are_monotonic() {
        let corpus: Vec<_> = [13.0, 2.0, 8.0, 1.0, 40.0, 3.0, 5.0, 21.0, 0.5, 6.0, 9.0]
            .iter()
            .map(|h| historical("t", &[], *h, None))
            .collect();
        let stats = calculate_dataset_statistics(&corpus).unwrap();

        assert_eq!(stats.percentile_hours.len(), PERCENTILES.len());
        for pair in stats.percentile_hours.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        // n = 11: indexes 1, 2, 5, 7, 9
        assert_eq!(stats.percentile_hours, vec![1.0, 2.0, 6.0, 9.0, 21.0]);
    }

    #[test]
    fn test_corpus_without_hours() {
        let corpus = vec![historical("sized only", &["ops"], 0.0, Some(Size::Xs))];
        let stats = calculate_dataset_statistics(&corpus).unwrap();

        assert_eq!(stats.avg_hours, 0.0);
        assert!(stats.percentile_hours.is_empty());
        assert!(stats.category_breakdown.is_empty());
        assert_eq!(stats.tasks_by_category["ops"], 1);
    }

    #[test]
    fn test_missing_source_record_still_counted() {
        let corpus = vec![Arc::new(HistoricalTask {
            issue: None,
            actual_hours: 4.0,
            size: Some(Size::M),
            story_points: 3.0,
        })];
        let stats = calculate_dataset_statistics(&corpus).unwrap();
        assert_eq!(stats.total_tasks, 1);
        assert_eq!(stats.closed_tasks, 0);
        assert_eq!(stats.median_hours, 4.0);
    }
}
