//! Feedback store: append-only log of corrections keyed by content hash
//!
//! Only the SHA-256 of the normalized email is persisted, never the text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, TrainerError};
use crate::models::{Email, FeedbackItem, FeedbackRecord};
use crate::storage;

/// Field order here fixes the canonical form that gets hashed
#[derive(Serialize)]
struct CanonicalEmail<'a> {
    body: &'a str,
    subject: &'a str,
}

/// Hex SHA-256 of the trimmed subject and body.
///
/// The pair is encoded as JSON before hashing so that the boundary between
/// subject and body cannot shift without changing the digest.
pub fn email_hash(subject: &str, body: &str) -> String {
    let canonical = CanonicalEmail {
        body: body.trim(),
        subject: subject.trim(),
    };
    // Serializing two string fields cannot fail
    let encoded = serde_json::to_vec(&canonical).unwrap_or_default();
    hex::encode(Sha256::digest(&encoded))
}

/// Aggregate outcome of a batch feedback submission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFeedbackOutcome {
    pub successful: usize,
    pub failed: usize,
    pub total_processed: usize,
}

/// Summary of what the feedback log holds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackStats {
    pub total_feedback_items: usize,
    pub category_distribution: BTreeMap<String, usize>,
}

impl FeedbackStats {
    pub fn from_records(records: &[FeedbackRecord]) -> Self {
        let mut category_distribution = BTreeMap::new();
        for record in records {
            *category_distribution
                .entry(record.correct_category.clone())
                .or_insert(0) += 1;
        }
        Self {
            total_feedback_items: records.len(),
            category_distribution,
        }
    }
}

#[async_trait]
pub trait FeedbackRepository: Send + Sync {
    /// Append one correction. Duplicates are allowed.
    async fn record(&self, email: &Email, correct_category: &str) -> Result<FeedbackRecord>;

    /// Record each item independently; one bad item never aborts the rest
    async fn record_batch(&self, items: &[FeedbackItem]) -> Result<BatchFeedbackOutcome> {
        let mut outcome = BatchFeedbackOutcome::default();

        for item in items {
            outcome.total_processed += 1;

            if !is_recordable(&item.email, &item.correct_category) {
                outcome.failed += 1;
                continue;
            }

            match self.record(&item.email, &item.correct_category).await {
                Ok(_) => outcome.successful += 1,
                Err(e) => {
                    warn!("Batch feedback item failed: {}", e);
                    outcome.failed += 1;
                }
            }
        }

        debug!(
            successful = outcome.successful,
            failed = outcome.failed,
            "Processed feedback batch"
        );
        Ok(outcome)
    }
}

fn is_recordable(email: &Email, correct_category: &str) -> bool {
    let has_text = !email.subject.trim().is_empty() || !email.body.trim().is_empty();
    has_text && !correct_category.trim().is_empty()
}

fn build_record(email: &Email, correct_category: &str) -> Result<FeedbackRecord> {
    let correct_category = correct_category.trim();
    if correct_category.is_empty() {
        return Err(TrainerError::InvalidCategory(
            "feedback requires a correct category".to_string(),
        ));
    }
    Ok(FeedbackRecord {
        email_hash: email_hash(&email.subject, &email.body),
        correct_category: correct_category.to_string(),
    })
}

/// Feedback log held in memory
#[derive(Debug, Default)]
pub struct InMemoryFeedbackLog {
    records: Mutex<Vec<FeedbackRecord>>,
}

impl InMemoryFeedbackLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<FeedbackRecord> {
        self.records.lock().await.clone()
    }

    pub async fn stats(&self) -> FeedbackStats {
        FeedbackStats::from_records(&self.records.lock().await)
    }
}

#[async_trait]
impl FeedbackRepository for InMemoryFeedbackLog {
    async fn record(&self, email: &Email, correct_category: &str) -> Result<FeedbackRecord> {
        let record = build_record(email, correct_category)?;
        self.records.lock().await.push(record.clone());
        Ok(record)
    }
}

/// Feedback log persisted as a JSON array of records
#[derive(Debug)]
pub struct JsonFeedbackLog {
    path: PathBuf,
    records: Mutex<Vec<FeedbackRecord>>,
}

impl JsonFeedbackLog {
    pub async fn open(path: &Path) -> Result<Self> {
        let records: Vec<FeedbackRecord> = storage::load_json(path).await?.unwrap_or_default();
        info!("Loaded {} feedback records from {:?}", records.len(), path);

        Ok(Self {
            path: path.to_path_buf(),
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn records(&self) -> Vec<FeedbackRecord> {
        self.records.lock().await.clone()
    }

    pub async fn stats(&self) -> FeedbackStats {
        FeedbackStats::from_records(&self.records.lock().await)
    }
}

#[async_trait]
impl FeedbackRepository for JsonFeedbackLog {
    async fn record(&self, email: &Email, correct_category: &str) -> Result<FeedbackRecord> {
        let record = build_record(email, correct_category)?;

        let mut records = self.records.lock().await;
        records.push(record.clone());

        if let Err(e) = storage::write_json_durable(&self.path, &*records).await {
            records.pop();
            return Err(TrainerError::FeedbackWrite(format!(
                "{}: {}",
                self.path.display(),
                e
            )));
        }

        debug!(
            hash = %record.email_hash,
            category = %record.correct_category,
            "Recorded feedback"
        );
        Ok(record)
    }
}
