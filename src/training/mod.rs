//! Feedback-driven training loop
//!
//! A cycle asks the generator for labelled emails, classifies them, and
//! records a correction for every miss. "Training" here means collecting
//! corrections and measuring accuracy; no model weights change.

pub mod cycle;
pub mod session;
pub mod trainer;

pub use cycle::{CycleEvent, CyclePhase, CycleResult, ProgressCallback, TrainingCycleRunner};
pub use session::{SessionSummary, TrainingSession, TrendDirection};
pub use trainer::ContinuousTrainer;
