use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use task_estimator::config::EstimationConfig;
use task_estimator::corpus::{historical_from_issues, FieldMap, IssueState};
use task_estimator::estimator::{
    calculate_dataset_statistics, select_enhanced_dataset, SimilarityRetriever, SimilarityScorer,
};
use task_estimator::{CorpusSnapshot, IssueRecord, Task};

const WORDS: &[&str] = &[
    "implement", "theme", "switcher", "refactor", "billing", "export", "invoice", "login",
    "redirect", "cache", "layer", "migrate", "database", "schema", "dashboard", "widget",
];
const LABELS: &[&str] = &["frontend", "backend", "ui", "api", "infra", "bug"];
const SIZES: &[&str] = &["XS", "S", "M", "L", "XL"];

fn synthetic_corpus(n: usize) -> CorpusSnapshot {
    let issues = (0..n)
        .map(|i| {
            let title = (0..4)
                .map(|k| WORDS[(i * 7 + k * 3) % WORDS.len()])
                .collect::<Vec<_>>()
                .join(" ");
            let mut custom_fields = FieldMap::new();
            custom_fields.insert("Hours".to_string(), ((1 + i % 24) as f64).into());
            custom_fields.insert("Size".to_string(), SIZES[i % SIZES.len()].into());
            custom_fields.insert("Priority".to_string(), if i % 3 == 0 { "high" } else { "low" }.into());
            IssueRecord {
                number: i as u64,
                body: format!("Work item {} touching the {} module", i, WORDS[i % WORDS.len()]),
                title,
                state: IssueState::Closed,
                labels: vec![
                    LABELS[i % LABELS.len()].to_string(),
                    LABELS[(i / 2) % LABELS.len()].to_string(),
                ],
                custom_fields,
            }
        })
        .collect();
    CorpusSnapshot::new(historical_from_issues(issues))
}

fn task() -> Task {
    Task::new("Refactor billing export cache")
        .with_description("Move the invoice export onto the shared cache layer")
        .with_labels(["backend", "api"])
        .with_context("Priority", "high")
}

fn benchmark_scoring(c: &mut Criterion) {
    let snapshot = synthetic_corpus(1);
    let scorer = SimilarityScorer::default();
    let task = task();

    c.bench_function("score_single_task", |b| {
        b.iter(|| black_box(scorer.score(black_box(&task), &snapshot.tasks()[0])))
    });
}

fn benchmark_retrieval(c: &mut Criterion) {
    let retriever = SimilarityRetriever::new(EstimationConfig::default());
    let config = EstimationConfig::default();
    let task = task();
    let mut group = c.benchmark_group("adaptive_retrieval");

    for size in [100, 1_000, 10_000] {
        let snapshot = synthetic_corpus(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &snapshot, |b, snapshot| {
            b.iter(|| {
                let (similar, context) = retriever.find_similar_adaptive(&task, snapshot.tasks());
                let dataset = select_enhanced_dataset(similar, snapshot.tasks(), &config);
                black_box((dataset, context))
            })
        });
    }
    group.finish();
}

fn benchmark_statistics(c: &mut Criterion) {
    let snapshot = synthetic_corpus(10_000);
    c.bench_function("dataset_statistics_10k", |b| {
        b.iter(|| black_box(calculate_dataset_statistics(snapshot.tasks())))
    });
}

criterion_group!(benches, benchmark_scoring, benchmark_retrieval, benchmark_statistics);
criterion_main!(benches);
