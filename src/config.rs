use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TrainerError};

/// Largest batch the generator backend accepts per request
pub const MAX_EMAILS_PER_REQUEST: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_urgent_category")]
    pub urgent_category: String,
    #[serde(default = "default_urgency_markers")]
    pub urgency_markers: Vec<String>,
    #[serde(default = "default_urgency_confidence")]
    pub urgency_confidence: f32,
    #[serde(default = "default_fallback_confidence")]
    pub fallback_confidence: f32,
    /// Seed for the fallback random source; entropy when absent
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub external_model: ExternalModelConfig,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            urgent_category: default_urgent_category(),
            urgency_markers: default_urgency_markers(),
            urgency_confidence: default_urgency_confidence(),
            fallback_confidence: default_fallback_confidence(),
            seed: None,
            external_model: ExternalModelConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalModelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_model_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model_name")]
    pub model: String,
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_model_confidence")]
    pub default_confidence: f32,
}

impl Default for ExternalModelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_model_endpoint(),
            model: default_model_name(),
            timeout_secs: default_model_timeout_secs(),
            default_confidence: default_model_confidence(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_circuit_breaker_enabled")]
    pub enabled: bool,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: default_circuit_breaker_enabled(),
            failure_threshold: default_failure_threshold(),
            reset_timeout_secs: default_reset_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub url: String,
    #[serde(default = "default_generate_timeout_secs")]
    pub generate_timeout_secs: u64,
    #[serde(default = "default_classify_timeout_secs")]
    pub classify_timeout_secs: u64,
    #[serde(default = "default_feedback_timeout_secs")]
    pub feedback_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            generate_timeout_secs: default_generate_timeout_secs(),
            classify_timeout_secs: default_classify_timeout_secs(),
            feedback_timeout_secs: default_feedback_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_cycles")]
    pub cycles: u32,
    #[serde(default = "default_emails_per_cycle")]
    pub emails_per_cycle: usize,
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
    #[serde(default = "default_classify_concurrency")]
    pub classify_concurrency: usize,
    /// Classify and record feedback through the backend instead of in-process
    #[serde(default)]
    pub remote_classifier: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            cycles: default_cycles(),
            emails_per_cycle: default_emails_per_cycle(),
            delay_secs: default_delay_secs(),
            classify_concurrency: default_classify_concurrency(),
            remote_classifier: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_categories_path")]
    pub categories_path: PathBuf,
    #[serde(default = "default_feedback_path")]
    pub feedback_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            categories_path: default_categories_path(),
            feedback_path: default_feedback_path(),
        }
    }
}

fn default_urgent_category() -> String {
    "Action Required - Urgent Response".to_string()
}

fn default_urgency_markers() -> Vec<String> {
    ["urgent", "important", "asap", "emergency", "critical", "time sensitive"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_urgency_confidence() -> f32 {
    0.9
}

fn default_fallback_confidence() -> f32 {
    0.3
}

fn default_model_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_model_name() -> String {
    "llama3.2:3b".to_string()
}

fn default_model_timeout_secs() -> u64 {
    10
}

fn default_model_confidence() -> f32 {
    0.7
}

fn default_circuit_breaker_enabled() -> bool {
    true
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout_secs() -> u64 {
    60
}

fn default_backend_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_generate_timeout_secs() -> u64 {
    120
}

fn default_classify_timeout_secs() -> u64 {
    30
}

fn default_feedback_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    2
}

fn default_cycles() -> u32 {
    3
}

fn default_emails_per_cycle() -> usize {
    10
}

fn default_delay_secs() -> u64 {
    30
}

fn default_classify_concurrency() -> usize {
    1
}

fn default_categories_path() -> PathBuf {
    PathBuf::from("data/categories.json")
}

fn default_feedback_path() -> PathBuf {
    PathBuf::from("data/feedback.json")
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| TrainerError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| TrainerError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                TrainerError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| TrainerError::Config(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| TrainerError::Config(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let classifier = &self.classifier;

        if classifier.urgent_category.trim().is_empty() {
            return Err(TrainerError::Config(
                "classifier.urgent_category cannot be empty".to_string(),
            ));
        }
        if classifier.urgency_markers.is_empty() {
            return Err(TrainerError::Config(
                "classifier.urgency_markers must contain at least one marker".to_string(),
            ));
        }
        if classifier.urgency_markers.iter().any(|m| m.trim().is_empty()) {
            return Err(TrainerError::Config(
                "classifier.urgency_markers cannot contain empty strings".to_string(),
            ));
        }
        if !(0.8..=1.0).contains(&classifier.urgency_confidence) {
            return Err(TrainerError::Config(format!(
                "classifier.urgency_confidence must be between 0.8 and 1.0, got {}",
                classifier.urgency_confidence
            )));
        }
        if !(0.0..=0.5).contains(&classifier.fallback_confidence) {
            return Err(TrainerError::Config(format!(
                "classifier.fallback_confidence must be between 0.0 and 0.5, got {}",
                classifier.fallback_confidence
            )));
        }

        let model = &classifier.external_model;
        if !(0.6..=0.95).contains(&model.default_confidence) {
            return Err(TrainerError::Config(format!(
                "classifier.external_model.default_confidence must be between 0.6 and 0.95, got {}",
                model.default_confidence
            )));
        }
        if model.timeout_secs == 0 {
            return Err(TrainerError::Config(
                "classifier.external_model.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if model.enabled && model.endpoint.trim().is_empty() {
            return Err(TrainerError::Config(
                "classifier.external_model.endpoint cannot be empty when enabled".to_string(),
            ));
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(TrainerError::Config(
                "circuit_breaker.failure_threshold must be greater than 0".to_string(),
            ));
        }
        if self.circuit_breaker.reset_timeout_secs == 0 {
            return Err(TrainerError::Config(
                "circuit_breaker.reset_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.backend.url.trim().is_empty() {
            return Err(TrainerError::Config("backend.url cannot be empty".to_string()));
        }
        if self.backend.generate_timeout_secs == 0
            || self.backend.classify_timeout_secs == 0
            || self.backend.feedback_timeout_secs == 0
        {
            return Err(TrainerError::Config(
                "backend timeouts must be greater than 0".to_string(),
            ));
        }

        if self.training.cycles == 0 {
            return Err(TrainerError::Config(
                "training.cycles must be at least 1".to_string(),
            ));
        }
        if self.training.emails_per_cycle > MAX_EMAILS_PER_REQUEST {
            return Err(TrainerError::Config(format!(
                "training.emails_per_cycle cannot exceed {} (generator limit per request)",
                MAX_EMAILS_PER_REQUEST
            )));
        }
        if self.training.classify_concurrency == 0 {
            return Err(TrainerError::Config(
                "training.classify_concurrency must be at least 1".to_string(),
            ));
        }
        if self.training.classify_concurrency > 16 {
            return Err(TrainerError::Config(
                "training.classify_concurrency cannot exceed 16".to_string(),
            ));
        }

        if self.storage.categories_path.as_os_str().is_empty()
            || self.storage.feedback_path.as_os_str().is_empty()
        {
            return Err(TrainerError::Config(
                "storage paths cannot be empty".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}
