use serde::{Deserialize, Serialize};

/// An email as seen by the classifier. Identity is its content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Email {
    pub subject: String,
    pub body: String,
}

impl Email {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Email produced by the generator; `id` only joins it to its answer-key entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedEmail {
    pub id: u64,
    pub subject: String,
    pub body: String,
}

impl GeneratedEmail {
    pub fn to_email(&self) -> Email {
        Email::new(self.subject.clone(), self.body.clone())
    }
}

/// Ground-truth assignment for one generated email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerKeyEntry {
    pub id: u64,
    pub correct_category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
}

/// Which rule produced a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Urgency,
    ExternalModel,
    Fallback,
    /// No categories were registered
    Unavailable,
    /// Produced by a remote classifier that does not report its rule
    Remote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: String,
    pub confidence: f32,
    #[serde(default = "default_source")]
    pub source: ClassificationSource,
}

fn default_source() -> ClassificationSource {
    ClassificationSource::Remote
}

impl ClassificationResult {
    pub fn new(category: impl Into<String>, confidence: f32, source: ClassificationSource) -> Self {
        Self {
            category: category.into(),
            confidence: confidence.clamp(0.0, 1.0),
            source,
        }
    }
}

/// One stored correction. Never carries the raw email text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub email_hash: String,
    pub correct_category: String,
}

/// Input item for batch feedback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackItem {
    pub email: Email,
    pub correct_category: String,
}
