//! Task estimation: similarity retrieval, dataset enhancement, the single
//! estimation pipeline and the concurrent batch engine

pub mod batch;
pub mod enhancer;
pub mod models;
pub mod orchestrator;
pub mod retrieval;
pub mod similarity;
pub mod statistics;

pub use batch::{
    load_batch_request, BatchMetadata, BatchProcessor, BatchReport, BatchRequest, BatchResult,
    BatchStatistics, BatchTask,
};
pub use enhancer::{select_enhanced_dataset, DatasetComposition, SAMPLE_PERCENTILES};
pub use models::{
    ConfidenceTier, EstimationResult, MatchSignal, SimilarityContext, SimilarityMatch, Task,
};
pub use orchestrator::{build_request, CorpusSnapshot, Estimator};
pub use retrieval::{SimilarityRetriever, ADAPTIVE_THRESHOLDS};
pub use similarity::{calculate_similarity, SimilarityScorer, SimilarityWeights};
pub use statistics::{calculate_dataset_statistics, CategoryStats, DatasetStatistics};
