//! HTTP client for the training backend
//!
//! The backend exposes the category registry, the classifier, the feedback
//! log and the email generator over JSON. [`BackendClient`] implements the
//! same repository and capability traits as the local components so the
//! trainer can run against either.

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::classifier::EmailClassifier;
use crate::config::BackendConfig;
use crate::error::{Result, TrainerError};
use crate::feedback::{BatchFeedbackOutcome, FeedbackRepository};
use crate::generator::{GeneratedBatch, Generator};
use crate::models::{ClassificationResult, Email, FeedbackItem, FeedbackRecord};
use crate::registry::CategoryRepository;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct NewCategory<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    subject: &'a str,
    body: &'a str,
}

#[derive(Serialize)]
struct FeedbackRequest<'a> {
    email: &'a Email,
    correct_category: &'a str,
}

#[derive(Serialize)]
struct BatchFeedbackRequest<'a> {
    feedback_items: &'a [FeedbackItem],
}

#[derive(Deserialize)]
struct BatchFeedbackResponse {
    successful_feedback: usize,
    failed_feedback: usize,
    total_processed: usize,
}

#[derive(Serialize)]
struct GenerateRequest {
    count: usize,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    config: BackendConfig,
    retry_interval: Duration,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TrainerError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            config: config.clone(),
            retry_interval: Duration::from_secs(1),
        })
    }

    /// First delay between generation retries; doubles on each attempt
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Succeeds when the backend answers `GET /categories`
    pub async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(self.url("/categories"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await?;
        check_status(response).await?;
        debug!("Backend at {} is reachable", self.base_url);
        Ok(())
    }

    async fn post_json<B, T>(&self, path: &str, body: &B, timeout: Duration) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.url(path))
            .timeout(timeout)
            .json(body)
            .send()
            .await?;
        let response = check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| TrainerError::InvalidResponse(format!("{}: {}", path, e)))
    }

    async fn request_batch(&self, count: usize) -> Result<GeneratedBatch> {
        self.post_json(
            "/generate-emails",
            &GenerateRequest { count },
            Duration::from_secs(self.config.generate_timeout_secs),
        )
        .await
    }
}

/// Map non-2xx responses to `Backend { status, message }` using the `{error}` body
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or_else(|_| {
            if text.trim().is_empty() {
                status.canonical_reason().unwrap_or("Unknown").to_string()
            } else {
                text
            }
        });

    Err(TrainerError::Backend {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl Generator for BackendClient {
    async fn generate(&self, count: usize) -> Result<GeneratedBatch> {
        let max_retries = self.config.max_retries;
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.retry_interval)
            .with_max_interval(Duration::from_secs(30))
            .with_max_elapsed_time(None)
            .build();

        let mut attempt = 0u32;
        let result = backoff::future::retry(policy, || {
            attempt += 1;
            let current = attempt;
            async move {
                match self.request_batch(count).await {
                    Ok(batch) => Ok(batch),
                    Err(e) if e.is_transient() && current <= max_retries => {
                        warn!(
                            "generate-emails failed (attempt {}/{}): {}",
                            current,
                            max_retries + 1,
                            e
                        );
                        Err(backoff::Error::transient(e))
                    }
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            }
        })
        .await;

        match result {
            Ok(batch) => {
                info!("Generated {} emails", batch.emails.len());
                Ok(batch)
            }
            Err(e) => Err(TrainerError::Generation(e.to_string())),
        }
    }
}

#[async_trait]
impl EmailClassifier for BackendClient {
    async fn classify(&self, subject: &str, body: &str) -> Result<ClassificationResult> {
        let result: ClassificationResult = self
            .post_json(
                "/classify",
                &ClassifyRequest { subject, body },
                Duration::from_secs(self.config.classify_timeout_secs),
            )
            .await?;
        Ok(ClassificationResult::new(
            result.category,
            result.confidence,
            result.source,
        ))
    }
}

#[async_trait]
impl FeedbackRepository for BackendClient {
    async fn record(&self, email: &Email, correct_category: &str) -> Result<FeedbackRecord> {
        let _: serde_json::Value = self
            .post_json(
                "/feedback",
                &FeedbackRequest {
                    email,
                    correct_category,
                },
                Duration::from_secs(self.config.feedback_timeout_secs),
            )
            .await
            .map_err(|e| TrainerError::FeedbackWrite(e.to_string()))?;

        // The backend keeps its own digest of the email; this record uses the local hash
        Ok(FeedbackRecord {
            email_hash: crate::feedback::email_hash(&email.subject, &email.body),
            correct_category: correct_category.trim().to_string(),
        })
    }

    async fn record_batch(&self, items: &[FeedbackItem]) -> Result<BatchFeedbackOutcome> {
        let response: BatchFeedbackResponse = self
            .post_json(
                "/batch-feedback",
                &BatchFeedbackRequest {
                    feedback_items: items,
                },
                Duration::from_secs(self.config.feedback_timeout_secs),
            )
            .await
            .map_err(|e| TrainerError::FeedbackWrite(e.to_string()))?;

        Ok(BatchFeedbackOutcome {
            successful: response.successful_feedback,
            failed: response.failed_feedback,
            total_processed: response.total_processed,
        })
    }
}

#[async_trait]
impl CategoryRepository for BackendClient {
    async fn list(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(self.url("/categories"))
            .timeout(Duration::from_secs(self.config.classify_timeout_secs))
            .send()
            .await?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| TrainerError::InvalidResponse(format!("/categories: {}", e)))
    }

    async fn add(&self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TrainerError::InvalidCategory(
                "category name cannot be empty".to_string(),
            ));
        }

        let result: Result<serde_json::Value> = self
            .post_json(
                "/category",
                &NewCategory { name },
                Duration::from_secs(self.config.feedback_timeout_secs),
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(TrainerError::Backend { status, message })
                if status == 400 || status == 409 =>
            {
                if message.to_lowercase().contains("exist") {
                    Err(TrainerError::DuplicateCategory(name.to_string()))
                } else {
                    Err(TrainerError::Backend { status, message })
                }
            }
            Err(e) => Err(e),
        }
    }
}
