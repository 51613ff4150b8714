//! Email generator seam
//!
//! Generation itself happens elsewhere (an LLM-backed service). The trainer
//! only needs a batch of emails plus the answer key that says where each
//! one belongs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::{Result, TrainerError};
use crate::models::{AnswerKeyEntry, GeneratedEmail};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedBatch {
    pub emails: Vec<GeneratedEmail>,
    pub answer_key: Vec<AnswerKeyEntry>,
    /// Categories the generator drew from; informational only
    #[serde(default)]
    pub categories: Vec<String>,
}

impl GeneratedBatch {
    /// Reject batches the trainer cannot score.
    ///
    /// Fewer emails than requested is fine, none at all is not. Every email
    /// needs a unique id and an answer-key entry.
    pub fn validate(&self, requested: usize) -> Result<()> {
        if requested > 0 && self.emails.is_empty() {
            return Err(TrainerError::Generation(format!(
                "requested {} emails but the generator returned none",
                requested
            )));
        }

        let mut seen = HashSet::with_capacity(self.emails.len());
        for email in &self.emails {
            if !seen.insert(email.id) {
                return Err(TrainerError::Generation(format!(
                    "duplicate email id {}",
                    email.id
                )));
            }
        }

        let keyed: HashSet<u64> = self.answer_key.iter().map(|entry| entry.id).collect();
        if let Some(missing) = self.emails.iter().find(|e| !keyed.contains(&e.id)) {
            return Err(TrainerError::Generation(format!(
                "email {} has no answer-key entry",
                missing.id
            )));
        }

        Ok(())
    }

    /// Answer key indexed by email id. The first entry wins on duplicates.
    pub fn answer_index(&self) -> HashMap<u64, &AnswerKeyEntry> {
        let mut index = HashMap::with_capacity(self.answer_key.len());
        for entry in &self.answer_key {
            index.entry(entry.id).or_insert(entry);
        }
        index
    }
}

/// Source of labelled training emails
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, count: usize) -> Result<GeneratedBatch>;
}
