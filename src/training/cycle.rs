//! One generate → classify → reconcile pass

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::classifier::EmailClassifier;
use crate::error::Result;
use crate::feedback::FeedbackRepository;
use crate::generator::{GeneratedBatch, Generator};
use crate::models::{ClassificationResult, GeneratedEmail};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Pending,
    Generating,
    Classifying,
    Reconciling,
    Done,
    Failed,
}

impl CyclePhase {
    pub fn can_transition_to(self, next: CyclePhase) -> bool {
        use CyclePhase::*;
        matches!(
            (self, next),
            (Pending, Generating)
                | (Pending, Done)
                | (Generating, Classifying)
                | (Generating, Failed)
                | (Classifying, Reconciling)
                | (Reconciling, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CyclePhase::Done | CyclePhase::Failed)
    }
}

/// Outcome of a single cycle. Failed cycles are results too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleResult {
    pub cycle_number: u32,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub phase: CyclePhase,
    pub emails_generated: usize,
    pub classifications: usize,
    pub correct: usize,
    /// Classifications that errored; counted as wrong
    pub classification_failures: usize,
    pub feedback_applied: usize,
    pub feedback_failed: usize,
    /// Fraction in [0,1]; 0.0 when nothing was classified
    pub accuracy: f64,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl CycleResult {
    fn pending(cycle_number: u32) -> Self {
        Self {
            cycle_number,
            started_at: Utc::now(),
            duration_ms: 0,
            phase: CyclePhase::Pending,
            emails_generated: 0,
            classifications: 0,
            correct: 0,
            classification_failures: 0,
            feedback_applied: 0,
            feedback_failed: 0,
            accuracy: 0.0,
            succeeded: false,
            failure_reason: None,
        }
    }

    fn advance(&mut self, next: CyclePhase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "illegal cycle transition {:?} -> {:?}",
            self.phase,
            next
        );
        debug!(cycle = self.cycle_number, "{:?} -> {:?}", self.phase, next);
        self.phase = next;
    }
}

/// Progress notifications emitted while a cycle runs
#[derive(Debug, Clone, PartialEq)]
pub enum CycleEvent {
    Generating { cycle: u32, requested: usize },
    Generated { cycle: u32, emails: usize },
    Classified { cycle: u32, done: usize, total: usize },
    Finished { cycle: u32, succeeded: bool },
}

pub type ProgressCallback = Arc<dyn Fn(CycleEvent) + Send + Sync>;

pub struct TrainingCycleRunner {
    generator: Arc<dyn Generator>,
    classifier: Arc<dyn EmailClassifier>,
    feedback: Arc<dyn FeedbackRepository>,
    concurrency: usize,
    progress: Option<ProgressCallback>,
}

impl TrainingCycleRunner {
    pub fn new(
        generator: Arc<dyn Generator>,
        classifier: Arc<dyn EmailClassifier>,
        feedback: Arc<dyn FeedbackRepository>,
    ) -> Self {
        Self {
            generator,
            classifier,
            feedback,
            concurrency: 1,
            progress: None,
        }
    }

    /// Classify up to `n` emails at once. Result order is unaffected.
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    fn emit(&self, event: CycleEvent) {
        if let Some(callback) = &self.progress {
            callback(event);
        }
    }

    /// Run one cycle. Never fails; problems end up in the returned result.
    pub async fn run(&self, cycle_number: u32, count: usize) -> CycleResult {
        let timer = Instant::now();
        let mut result = CycleResult::pending(cycle_number);

        if count == 0 {
            debug!(cycle = cycle_number, "No emails requested, nothing to do");
            result.advance(CyclePhase::Done);
            result.succeeded = true;
        } else {
            self.run_phases(&mut result, count).await;
        }

        result.duration_ms = timer.elapsed().as_millis() as u64;
        self.emit(CycleEvent::Finished {
            cycle: cycle_number,
            succeeded: result.succeeded,
        });
        result
    }

    async fn run_phases(&self, result: &mut CycleResult, count: usize) {
        let cycle = result.cycle_number;

        result.advance(CyclePhase::Generating);
        self.emit(CycleEvent::Generating {
            cycle,
            requested: count,
        });

        let batch = match self.generate(count).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(cycle, "Cycle failed during generation: {}", e);
                result.advance(CyclePhase::Failed);
                result.failure_reason = Some(e.to_string());
                return;
            }
        };
        result.emails_generated = batch.emails.len();
        self.emit(CycleEvent::Generated {
            cycle,
            emails: batch.emails.len(),
        });

        result.advance(CyclePhase::Classifying);
        let predictions = self.classify_all(cycle, &batch.emails).await;
        result.classifications = predictions.len();

        result.advance(CyclePhase::Reconciling);
        self.reconcile(result, &batch, &predictions).await;

        result.accuracy = if result.classifications == 0 {
            0.0
        } else {
            result.correct as f64 / result.classifications as f64
        };
        result.advance(CyclePhase::Done);
        result.succeeded = true;

        info!(
            cycle,
            correct = result.correct,
            total = result.classifications,
            feedback = result.feedback_applied,
            "Accuracy {:.1}%",
            result.accuracy * 100.0
        );
    }

    async fn generate(&self, count: usize) -> Result<GeneratedBatch> {
        let batch = self.generator.generate(count).await?;
        batch.validate(count)?;
        if batch.emails.len() < count {
            debug!(
                "Generator returned {} of {} requested emails",
                batch.emails.len(),
                count
            );
        }
        Ok(batch)
    }

    async fn classify_all(
        &self,
        cycle: u32,
        emails: &[GeneratedEmail],
    ) -> Vec<Result<ClassificationResult>> {
        let total = emails.len();
        let classifier = &self.classifier;

        stream::iter(emails.iter().enumerate())
            .map(|(index, email)| async move {
                let prediction = classifier.classify(&email.subject, &email.body).await;
                self.emit(CycleEvent::Classified {
                    cycle,
                    done: index + 1,
                    total,
                });
                prediction
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }

    /// Feedback writes are issued one at a time, in generator order
    async fn reconcile(
        &self,
        result: &mut CycleResult,
        batch: &GeneratedBatch,
        predictions: &[Result<ClassificationResult>],
    ) {
        let answers = batch.answer_index();

        for (email, prediction) in batch.emails.iter().zip(predictions) {
            let Some(answer) = answers.get(&email.id) else {
                continue;
            };

            let predicted = match prediction {
                Ok(p) => p,
                Err(e) => {
                    warn!(email_id = email.id, "Classification failed: {}", e);
                    result.classification_failures += 1;
                    continue;
                }
            };

            if predicted.category == answer.correct_category {
                result.correct += 1;
                continue;
            }

            debug!(
                email_id = email.id,
                "Predicted '{}', expected '{}'", predicted.category, answer.correct_category
            );
            match self
                .feedback
                .record(&email.to_email(), &answer.correct_category)
                .await
            {
                Ok(_) => result.feedback_applied += 1,
                Err(e) => {
                    warn!(email_id = email.id, "Feedback not applied: {}", e);
                    result.feedback_failed += 1;
                }
            }
        }
    }
}
