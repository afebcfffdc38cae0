//! Estimation provider boundary
//!
//! A provider turns a structured [`EstimationRequest`] into raw text that
//! should contain a JSON estimate. Extraction and validation live in
//! [`response`] so every provider is held to the same rules.

pub mod openai;
pub mod prompts;
pub mod response;
pub mod types;

pub use openai::{ModelCapabilities, OpenAiProvider, UsageMetrics};
pub use prompts::{build_estimation_prompt, system_prompt};
pub use response::{extract_json_object, parse_estimation_response, ResponseError};
pub use types::{EstimationRequest, EstimationResponse, ReferenceTask, SimilarityMeta};

use crate::error::Result;
use async_trait::async_trait;

/// External system producing effort estimates
///
/// Implementations must be safe to call from many tasks at once; the batch
/// engine shares one provider across all workers.
#[async_trait]
pub trait EstimationProvider: Send + Sync {
    /// Provider name used in logs and results
    fn name(&self) -> &str;

    /// Whether the provider is configured well enough to be called
    fn is_available(&self) -> bool;

    /// Perform exactly one request and return the raw response text
    async fn request_estimate(&self, request: &EstimationRequest) -> Result<String>;
}
