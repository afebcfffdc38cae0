//! Configuration for the estimation engine
//!
//! Settings come from an optional TOML file, then `ESTIMATOR_*` environment
//! variables (nested keys separated by `__`, e.g.
//! `ESTIMATOR_BATCH__MAX_WORKERS=8`). A handful of well-known variables are
//! applied on top by [`ProviderConfig::from_env`].

use crate::error::{EstimatorError, Result};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const KNOWN_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Top-level settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub estimation: EstimationConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Settings {
    /// Load settings from an optional file plus the environment, then validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // A missing .env is normal
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("ESTIMATOR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        settings.provider = settings.provider.from_env();
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        self.estimation.validate()?;
        self.batch.validate()?;
        self.provider.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Estimation provider (OpenAI-compatible chat completions) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// API key (read from env OPENAI_API_KEY if not set)
    #[serde(default)]
    pub api_key: Option<Secret<String>>,

    #[serde(default = "default_model")]
    pub model: String,

    /// Chat completions endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-call timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_model() -> String { "gpt-4".to_string() }
fn default_api_url() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_max_tokens() -> u32 { 4000 }
fn default_temperature() -> f32 { 0.3 }
fn default_timeout_ms() -> u64 { 30_000 }

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            api_url: default_api_url(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl ProviderConfig {
    /// Apply well-known environment variables
    pub fn from_env(mut self) -> Self {
        if let Ok(val) = std::env::var("OPENAI_API_KEY") {
            if !val.trim().is_empty() {
                self.api_key = Some(Secret::new(val));
            }
        }

        if let Ok(val) = std::env::var("ESTIMATOR_MODEL") {
            self.model = val;
        }

        if let Ok(val) = std::env::var("ESTIMATOR_API_URL") {
            self.api_url = val;
        }

        if let Ok(val) = std::env::var("ESTIMATOR_TIMEOUT_MS") {
            if let Ok(timeout) = val.parse() {
                self.timeout_ms = timeout;
            }
        }

        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Whether a usable API key is present
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_ref()
            .is_some_and(|key| !key.expose_secret().trim().is_empty())
    }

    fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(EstimatorError::Configuration("provider model must not be empty".into()));
        }
        if self.timeout_ms == 0 {
            return Err(EstimatorError::Configuration("provider timeout must be non-zero".into()));
        }
        Ok(())
    }
}

/// Retrieval and context-building parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationConfig {
    /// Upper bound on similar tasks kept from retrieval
    #[serde(default = "default_max_similar_tasks")]
    pub max_similar_tasks: usize,

    /// Minimum total reference tasks sent to the provider, reached with
    /// diversity samples when retrieval falls short
    #[serde(default = "default_min_similar_tasks")]
    pub min_similar_tasks: usize,

    /// Matches the adaptive retriever needs before it stops loosening
    #[serde(default = "default_min_retrieval_matches")]
    pub min_retrieval_matches: usize,

    /// Threshold for the fixed-threshold search
    #[serde(default = "default_min_similarity_threshold")]
    pub min_similarity_threshold: f64,

    #[serde(default = "default_stratified_samples_per_size")]
    pub stratified_samples_per_size: usize,
}

fn default_max_similar_tasks() -> usize { 15 }
fn default_min_similar_tasks() -> usize { 10 }
fn default_min_retrieval_matches() -> usize { 3 }
fn default_min_similarity_threshold() -> f64 { 0.3 }
fn default_stratified_samples_per_size() -> usize { 2 }

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            max_similar_tasks: default_max_similar_tasks(),
            min_similar_tasks: default_min_similar_tasks(),
            min_retrieval_matches: default_min_retrieval_matches(),
            min_similarity_threshold: default_min_similarity_threshold(),
            stratified_samples_per_size: default_stratified_samples_per_size(),
        }
    }
}

impl EstimationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=50).contains(&self.max_similar_tasks) {
            return Err(EstimatorError::Configuration(format!(
                "max_similar_tasks must be between 1 and 50, got {}",
                self.max_similar_tasks
            )));
        }
        if self.min_similar_tasks == 0 {
            return Err(EstimatorError::Configuration("min_similar_tasks must be at least 1".into()));
        }
        if self.min_retrieval_matches == 0 {
            return Err(EstimatorError::Configuration(
                "min_retrieval_matches must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_similarity_threshold) {
            return Err(EstimatorError::Configuration(format!(
                "min_similarity_threshold must be between 0 and 1, got {}",
                self.min_similarity_threshold
            )));
        }
        Ok(())
    }
}

/// Batch engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

fn default_max_workers() -> usize { 5 }

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_workers: default_max_workers() }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(EstimatorError::Configuration("max_workers must be at least 1".into()));
        }
        Ok(())
    }
}

/// Where the historical corpus is read from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON array of issue records
    #[serde(default)]
    pub issues_path: Option<PathBuf>,

    /// Developer seed data file
    #[serde(default)]
    pub seed_path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<()> {
        if !KNOWN_LOG_LEVELS.contains(&self.level.to_lowercase().as_str()) {
            return Err(EstimatorError::Configuration(format!(
                "unknown log level '{}', expected one of {}",
                self.level,
                KNOWN_LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let settings = Settings::default();
        assert_eq!(settings.estimation.max_similar_tasks, 15);
        assert_eq!(settings.estimation.min_similar_tasks, 10);
        assert_eq!(settings.estimation.min_retrieval_matches, 3);
        assert_eq!(settings.estimation.stratified_samples_per_size, 2);
        assert_eq!(settings.batch.max_workers, 5);
        assert_eq!(settings.provider.model, "gpt-4");
        assert_eq!(settings.provider.timeout(), Duration::from_millis(30_000));
        assert!(!settings.provider.has_api_key());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut estimation = EstimationConfig::default();
        estimation.max_similar_tasks = 51;
        assert!(estimation.validate().is_err());

        let mut estimation = EstimationConfig::default();
        estimation.min_similarity_threshold = 1.5;
        assert!(estimation.validate().is_err());

        assert!(BatchConfig { max_workers: 0 }.validate().is_err());

        let logging = LoggingConfig {
            level: "verbose".to_string(),
            json: false,
        };
        assert!(logging.validate().is_err());

        let provider = ProviderConfig {
            timeout_ms: 0,
            ..Default::default()
        };
        assert!(provider.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[estimation]
max_similar_tasks = 20
min_similar_tasks = 12

[batch]
max_workers = 3

[logging]
level = "debug"
"#
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.estimation.max_similar_tasks, 20);
        assert_eq!(settings.estimation.min_similar_tasks, 12);
        assert_eq!(settings.estimation.min_retrieval_matches, 3);
        assert_eq!(settings.batch.max_workers, 3);
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn test_invalid_file_fails_validation() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "[batch]\nmax_workers = 0\n").unwrap();

        let result = Settings::load(Some(file.path()));
        assert!(matches!(result, Err(EstimatorError::Configuration(_))));
    }

    #[test]
    fn test_provider_from_env() {
        std::env::set_var("ESTIMATOR_API_URL", "http://localhost:9999/v1/chat/completions");

        let config = ProviderConfig::default().from_env();
        assert_eq!(config.api_url, "http://localhost:9999/v1/chat/completions");

        std::env::remove_var("ESTIMATOR_API_URL");
    }
}
