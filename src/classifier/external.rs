//! External language-model rule
//!
//! The model sees the exact registry contents and must answer with one of
//! the listed names. Anything else is treated as "no answer".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ExternalModelConfig;
use crate::error::{Result, TrainerError};

/// Raw answer from a model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelAnswer {
    pub text: String,
    /// Model-reported certainty in [0,1], when the model exposes one
    pub certainty: Option<f32>,
}

impl ModelAnswer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            certainty: None,
        }
    }

    pub fn with_certainty(mut self, certainty: f32) -> Self {
        self.certainty = Some(certainty);
        self
    }
}

/// A text-completion model the classifier can consult
#[async_trait]
pub trait ExternalModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<ModelAnswer>;

    fn name(&self) -> &str {
        "external-model"
    }
}

pub fn build_prompt(subject: &str, body: &str, categories: &[String]) -> String {
    let category_list = categories
        .iter()
        .map(|c| format!("- {}", c))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are an expert email classifier for business communications.\n\n\
         Analyze this email and classify it into ONE of the following categories:\n\n\
         {category_list}\n\n\
         Email Subject: {subject}\n\
         Email Body: {body}\n\n\
         Instructions:\n\
         1. Choose the MOST APPROPRIATE category from the list above\n\
         2. Consider business context, urgency, and potential impact\n\
         3. Respond with ONLY the category name, exactly as listed above\n\n\
         Category:"
    )
}

/// Map a raw answer onto a registry name.
///
/// The trimmed answer is tried as-is first, so names ending in a period
/// still match. Failing that, surrounding quotes and then one trailing
/// period are removed; the comparison itself is always exact.
pub fn match_category<'a>(answer: &str, categories: &'a [String]) -> Option<&'a str> {
    let trimmed = answer.trim();
    if let Some(found) = find_exact(trimmed, categories) {
        return Some(found);
    }

    let unquoted = strip_quotes(trimmed);
    if let Some(found) = find_exact(unquoted, categories) {
        return Some(found);
    }

    let without_period = unquoted.strip_suffix('.')?;
    find_exact(strip_quotes(without_period.trim()), categories)
}

fn strip_quotes(text: &str) -> &str {
    text.trim_matches(|c| c == '"' || c == '\'' || c == '`').trim()
}

fn find_exact<'a>(candidate: &str, categories: &'a [String]) -> Option<&'a str> {
    categories
        .iter()
        .find(|c| c.as_str() == candidate)
        .map(String::as_str)
}

/// Confidence band for an accepted answer: 0.6..=0.95
pub fn confidence_for(certainty: Option<f32>, default_confidence: f32) -> f32 {
    match certainty {
        Some(c) if c.is_finite() => 0.6 + 0.35 * c.clamp(0.0, 1.0),
        _ => default_confidence,
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    num_predict: i32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

/// Local Ollama server (`POST /api/generate`)
pub struct OllamaModel {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaModel {
    pub fn new(config: &ExternalModelConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TrainerError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ExternalModel for OllamaModel {
    async fn complete(&self, prompt: &str) -> Result<ModelAnswer> {
        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: OllamaOptions {
                temperature: 0.1,
                top_p: 0.9,
                num_predict: 50,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TrainerError::Backend {
                status: status.as_u16(),
                message,
            });
        }

        let body: OllamaResponse = response
            .json()
            .await
            .map_err(|e| TrainerError::InvalidResponse(format!("Ollama response: {}", e)))?;

        Ok(ModelAnswer::new(body.response))
    }

    fn name(&self) -> &str {
        &self.model
    }
}
