//! Email classification engine
//!
//! Rules are applied in order and the first one that answers wins:
//!
//! 1. **Urgency**: any configured marker in the lowercased subject and body
//!    routes to the urgent-handling category at high confidence.
//! 2. **External model** (optional): a language model picks from the exact
//!    registry contents. Timeouts, errors, an open breaker or an unknown name
//!    all fall through.
//! 3. **Fallback**: a uniformly random registry entry at low confidence.
//!
//! `Classifier::classify_email` never fails. With an empty registry it
//! answers `"Unknown"` at confidence 0.

pub mod external;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::config::{CircuitBreakerConfig, ClassifierConfig};
use crate::error::{Result, TrainerError};
use crate::models::{ClassificationResult, ClassificationSource, Email};
use crate::registry::CategoryRepository;

pub use external::{ExternalModel, ModelAnswer, OllamaModel};

/// Category reported when the registry is empty
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Anything that can put an email in a category.
///
/// The local engine never returns `Err`; remote classifiers can fail per item.
#[async_trait]
pub trait EmailClassifier: Send + Sync {
    async fn classify(&self, subject: &str, body: &str) -> Result<ClassificationResult>;
}

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Lowercase and collapse whitespace runs so multi-word markers match across line breaks
fn normalize_text(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").to_lowercase()
}

pub struct Classifier {
    categories: Arc<dyn CategoryRepository>,
    config: ClassifierConfig,
    markers: Vec<String>,
    external: Option<Arc<dyn ExternalModel>>,
    breaker: CircuitBreaker,
    rng: Mutex<StdRng>,
}

impl Classifier {
    pub fn new(categories: Arc<dyn CategoryRepository>, config: ClassifierConfig) -> Self {
        let markers = config
            .urgency_markers
            .iter()
            .map(|m| normalize_text(m))
            .filter(|m| !m.is_empty())
            .collect();

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            categories,
            config,
            markers,
            external: None,
            breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
            rng: Mutex::new(rng),
        }
    }

    /// Enable the external-model rule
    pub fn with_external_model(
        mut self,
        model: Arc<dyn ExternalModel>,
        breaker: CircuitBreakerConfig,
    ) -> Self {
        self.external = Some(model);
        self.breaker = CircuitBreaker::new(breaker);
        self
    }

    /// Build the engine from configuration, wiring Ollama in when enabled
    pub fn from_config(
        categories: Arc<dyn CategoryRepository>,
        config: &ClassifierConfig,
        breaker: &CircuitBreakerConfig,
    ) -> Result<Self> {
        let classifier = Self::new(categories, config.clone());
        if !config.external_model.enabled {
            return Ok(classifier);
        }

        let model = OllamaModel::new(&config.external_model)?;
        debug!(
            "External model enabled: {} at {}",
            config.external_model.model, config.external_model.endpoint
        );
        Ok(classifier.with_external_model(Arc::new(model), breaker.clone()))
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub async fn classify_email(&self, email: &Email) -> ClassificationResult {
        let categories = match self.categories.list().await {
            Ok(categories) => categories,
            Err(e) => {
                warn!("Could not read categories, classifying as unknown: {}", e);
                Vec::new()
            }
        };

        if categories.is_empty() {
            return ClassificationResult::new(
                UNKNOWN_CATEGORY,
                0.0,
                ClassificationSource::Unavailable,
            );
        }

        if let Some(category) = self.apply_urgency_rule(email, &categories) {
            return ClassificationResult::new(
                category,
                self.config.urgency_confidence,
                ClassificationSource::Urgency,
            );
        }

        match self.ask_external_model(email, &categories).await {
            Ok(Some(result)) => return result,
            Ok(None) => {}
            Err(e) => warn!("{}", TrainerError::ClassificationDegraded(e.to_string())),
        }

        self.fallback(&categories).await
    }

    fn apply_urgency_rule<'a>(&self, email: &Email, categories: &'a [String]) -> Option<&'a str> {
        let text = normalize_text(&format!("{} {}", email.subject, email.body));
        let marker = self.markers.iter().find(|m| text.contains(m.as_str()))?;

        let target = self.urgent_category(categories);
        match target {
            Some(category) => debug!(marker = %marker, "Urgency rule matched '{}'", category),
            None => debug!(marker = %marker, "Urgency marker found but no urgent category registered"),
        }
        target
    }

    /// The configured urgent category, else the first registry entry mentioning "urgent"
    fn urgent_category<'a>(&self, categories: &'a [String]) -> Option<&'a str> {
        categories
            .iter()
            .find(|c| **c == self.config.urgent_category)
            .or_else(|| {
                categories
                    .iter()
                    .find(|c| c.to_lowercase().contains("urgent"))
            })
            .map(String::as_str)
    }

    async fn ask_external_model(
        &self,
        email: &Email,
        categories: &[String],
    ) -> Result<Option<ClassificationResult>> {
        let Some(model) = &self.external else {
            return Ok(None);
        };

        let prompt = external::build_prompt(&email.subject, &email.body, categories);
        let timeout = Duration::from_secs(self.config.external_model.timeout_secs);

        let model: &dyn ExternalModel = model.as_ref();
        let prompt = prompt.as_str();

        let answer = self
            .breaker
            .call(|| async move {
                match tokio::time::timeout(timeout, model.complete(prompt)).await {
                    Ok(answer) => answer,
                    Err(_) => Err(TrainerError::Timeout(format!(
                        "{} did not answer within {:?}",
                        model.name(),
                        timeout
                    ))),
                }
            })
            .await?;

        match external::match_category(&answer.text, categories) {
            Some(category) => {
                let confidence = external::confidence_for(
                    answer.certainty,
                    self.config.external_model.default_confidence,
                );
                Ok(Some(ClassificationResult::new(
                    category,
                    confidence,
                    ClassificationSource::ExternalModel,
                )))
            }
            None => {
                warn!(
                    "{} answered '{}', which is not a registered category",
                    model.name(),
                    answer.text.trim()
                );
                Ok(None)
            }
        }
    }

    async fn fallback(&self, categories: &[String]) -> ClassificationResult {
        let mut rng = self.rng.lock().await;
        match categories.choose(&mut *rng) {
            Some(category) => ClassificationResult::new(
                category.clone(),
                self.config.fallback_confidence,
                ClassificationSource::Fallback,
            ),
            None => ClassificationResult::new(
                UNKNOWN_CATEGORY,
                0.0,
                ClassificationSource::Unavailable,
            ),
        }
    }
}

#[async_trait]
impl EmailClassifier for Classifier {
    async fn classify(&self, subject: &str, body: &str) -> Result<ClassificationResult> {
        Ok(self.classify_email(&Email::new(subject, body)).await)
    }
}
