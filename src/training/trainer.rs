//! Runs cycles back to back and collects them into a session

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::{Result, TrainerError};
use crate::training::cycle::TrainingCycleRunner;
use crate::training::session::TrainingSession;

pub struct ContinuousTrainer {
    runner: TrainingCycleRunner,
    cancel: CancellationToken,
}

impl ContinuousTrainer {
    pub fn new(runner: TrainingCycleRunner) -> Self {
        Self {
            runner,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops the run at the next cycle boundary
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `cycles` cycles, sleeping `delay` between them.
    ///
    /// A failed cycle is recorded and the run goes on. Cancellation is only
    /// observed before a cycle starts and during the delay.
    pub async fn run(
        &self,
        cycles: u32,
        emails_per_cycle: usize,
        delay: Duration,
    ) -> Result<TrainingSession> {
        if cycles == 0 {
            return Err(TrainerError::InvalidArgument(
                "cycles must be at least 1".to_string(),
            ));
        }

        info!(
            "Starting training: {} cycles, {} emails each, {:?} between cycles",
            cycles, emails_per_cycle, delay
        );
        let mut session = TrainingSession::new(cycles, emails_per_cycle);
        let mut cancelled = false;

        for cycle_number in 1..=cycles {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            info!("Training cycle {}/{}", cycle_number, cycles);
            let result = self.runner.run(cycle_number, emails_per_cycle).await;
            if result.succeeded {
                info!("Cycle {} completed", cycle_number);
            } else {
                error!(
                    "Cycle {} failed: {}",
                    cycle_number,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
            session.push(result);

            if cycle_number < cycles && !delay.is_zero() {
                info!("Waiting {:?} before next cycle", delay);
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        if cancelled {
            info!(
                "Training cancelled after {} of {} cycles",
                session.cycles.len(),
                cycles
            );
        }
        session.finish(cancelled);

        let summary = session.summary();
        info!(
            successful = summary.successful_cycles,
            failed = summary.failed_cycles,
            "Training finished, average accuracy {:.1}%",
            summary.average_accuracy * 100.0
        );
        Ok(session)
    }

    pub async fn run_single(&self, emails: usize) -> Result<TrainingSession> {
        self.run(1, emails, Duration::ZERO).await
    }
}
