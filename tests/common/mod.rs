//! Common test utilities and fixtures

#![allow(dead_code)]

use email_trainer::classifier::EmailClassifier;
use email_trainer::error::Result;
use email_trainer::feedback::{BatchFeedbackOutcome, FeedbackRepository};
use email_trainer::generator::{GeneratedBatch, Generator};
use email_trainer::models::{
    AnswerKeyEntry, ClassificationResult, ClassificationSource, Email, FeedbackItem,
    FeedbackRecord, GeneratedEmail,
};
use mockall::mock;
use serde_json::json;

/// Build a batch whose answer key assigns `categories[i]` to email `i + 1`
pub fn create_batch(categories: &[&str]) -> GeneratedBatch {
    let emails = categories
        .iter()
        .enumerate()
        .map(|(i, _)| create_email(i as u64 + 1))
        .collect();
    let answer_key = categories
        .iter()
        .enumerate()
        .map(|(i, category)| AnswerKeyEntry {
            id: i as u64 + 1,
            correct_category: category.to_string(),
            difficulty: Some("medium".to_string()),
        })
        .collect();

    GeneratedBatch {
        emails,
        answer_key,
        categories: categories.iter().map(|c| c.to_string()).collect(),
    }
}

pub fn create_email(id: u64) -> GeneratedEmail {
    GeneratedEmail {
        id,
        subject: format!("Order #{} question", 1000 + id),
        body: format!("Hello, I have a question about order {}. Thanks, Pat", 1000 + id),
    }
}

pub fn prediction(category: &str) -> ClassificationResult {
    ClassificationResult::new(category, 0.7, ClassificationSource::Remote)
}

/// Generator payload in the backend's wire format
pub fn mock_generate_response(categories: &[&str]) -> serde_json::Value {
    let batch = create_batch(categories);
    json!({
        "emails": batch.emails,
        "answer_key": batch.answer_key,
        "categories": batch.categories,
    })
}

mock! {
    pub Generator {}

    #[async_trait::async_trait]
    impl Generator for Generator {
        async fn generate(&self, count: usize) -> Result<GeneratedBatch>;
    }
}

mock! {
    pub Classifier {}

    #[async_trait::async_trait]
    impl EmailClassifier for Classifier {
        async fn classify(&self, subject: &str, body: &str) -> Result<ClassificationResult>;
    }
}

mock! {
    pub Feedback {}

    #[async_trait::async_trait]
    impl FeedbackRepository for Feedback {
        async fn record(&self, email: &Email, correct_category: &str) -> Result<FeedbackRecord>;
        async fn record_batch(&self, items: &[FeedbackItem]) -> Result<BatchFeedbackOutcome>;
    }
}
