//! Email Category Trainer
//!
//! Classifies short business emails into a growable set of named categories
//! and measures that classifier against generated, pre-labelled emails.
//!
//! # Overview
//!
//! - **Registry**: append-only, ordered list of category names
//! - **Classification**: urgency rule, optional external model, seeded random fallback
//! - **Feedback**: corrections stored by content hash, never as raw text
//! - **Training**: generate → classify → reconcile cycles, collected into sessions
//! - **Backend**: HTTP client for the generator and the remote classifier/feedback endpoints
//!
//! # Example Usage
//!
//! ```no_run
//! use email_trainer::{
//!     backend::BackendClient, classifier::Classifier, config::Config,
//!     feedback::JsonFeedbackLog, registry::JsonCategoryStore,
//!     training::{ContinuousTrainer, TrainingCycleRunner},
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let categories = Arc::new(JsonCategoryStore::open(&config.storage.categories_path).await?);
//!     let classifier = Classifier::from_config(categories, &config.classifier, &config.circuit_breaker)?;
//!     let feedback = JsonFeedbackLog::open(&config.storage.feedback_path).await?;
//!     let generator = BackendClient::new(&config.backend)?;
//!
//!     let runner = TrainingCycleRunner::new(Arc::new(generator), Arc::new(classifier), Arc::new(feedback));
//!     let session = ContinuousTrainer::new(runner)
//!         .run(3, 10, Duration::from_secs(30))
//!         .await?;
//!
//!     println!("average accuracy: {:.2}", session.summary().average_accuracy);
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`backend`] - HTTP client for the training backend
//! - [`circuit_breaker`] - Breaker guarding the external model
//! - [`classifier`] - Classification engine and external-model adapter
//! - [`cli`] - Command-line interface and progress reporting
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`feedback`] - Feedback log and content hashing
//! - [`generator`] - Email generator seam and batch validation
//! - [`models`] - Core data structures
//! - [`registry`] - Category registry
//! - [`training`] - Cycle runner, continuous trainer and session reporting

pub mod backend;
pub mod circuit_breaker;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod error;
pub mod feedback;
pub mod generator;
pub mod models;
pub mod registry;
mod storage;
pub mod training;

pub use error::{Result, TrainerError};

pub use models::{
    AnswerKeyEntry, ClassificationResult, ClassificationSource, Email, FeedbackItem,
    FeedbackRecord, GeneratedEmail,
};

pub use classifier::{Classifier, EmailClassifier, ExternalModel, ModelAnswer};
pub use config::Config;
pub use feedback::{email_hash, FeedbackRepository, FeedbackStats};
pub use generator::{GeneratedBatch, Generator};
pub use registry::CategoryRepository;
pub use training::{
    ContinuousTrainer, CycleResult, SessionSummary, TrainingCycleRunner, TrainingSession,
};
