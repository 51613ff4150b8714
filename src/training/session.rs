//! Training session record and its derived summary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::error::{Result, TrainerError};
use crate::training::cycle::CycleResult;

/// Tolerance below which first and last accuracy count as unchanged
const TREND_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingSession {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    pub cycles_requested: u32,
    pub emails_per_cycle: usize,
    #[serde(default)]
    pub cancelled: bool,
    /// Every cycle that ran, in order, whether or not it succeeded
    pub cycles: Vec<CycleResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Flat,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TrendDirection::Improving => "improving",
            TrendDirection::Declining => "declining",
            TrendDirection::Flat => "flat",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub cycles_run: usize,
    pub successful_cycles: usize,
    pub failed_cycles: usize,
    /// successful / cycles run, 0.0 when nothing ran
    pub success_ratio: f64,
    /// Mean accuracy over cycles that classified at least one email
    pub average_accuracy: f64,
    pub best_accuracy: Option<f64>,
    pub worst_accuracy: Option<f64>,
    /// Accuracy of the first and last successful cycles
    pub accuracy_trend: Option<(f64, f64)>,
    pub trend_direction: Option<TrendDirection>,
    pub total_emails_generated: usize,
    pub total_classifications: usize,
    pub total_correct: usize,
    pub total_feedback_applied: usize,
    pub total_feedback_failed: usize,
    pub duration_secs: f64,
}

#[derive(Default)]
struct Fold {
    successful: usize,
    failed: usize,
    scored: usize,
    accuracy_sum: f64,
    best: Option<f64>,
    worst: Option<f64>,
    first_success: Option<f64>,
    last_success: Option<f64>,
    successes_seen: usize,
    emails: usize,
    classifications: usize,
    correct: usize,
    feedback_applied: usize,
    feedback_failed: usize,
}

impl Fold {
    fn step(mut self, cycle: &CycleResult) -> Self {
        if cycle.succeeded {
            self.successful += 1;
            self.successes_seen += 1;
            self.first_success.get_or_insert(cycle.accuracy);
            self.last_success = Some(cycle.accuracy);
        } else {
            self.failed += 1;
        }

        if cycle.classifications > 0 {
            self.scored += 1;
            self.accuracy_sum += cycle.accuracy;
            self.best = Some(self.best.map_or(cycle.accuracy, |b| b.max(cycle.accuracy)));
            self.worst = Some(self.worst.map_or(cycle.accuracy, |w| w.min(cycle.accuracy)));
        }

        self.emails += cycle.emails_generated;
        self.classifications += cycle.classifications;
        self.correct += cycle.correct;
        self.feedback_applied += cycle.feedback_applied;
        self.feedback_failed += cycle.feedback_failed;
        self
    }
}

impl TrainingSession {
    pub fn new(cycles_requested: u32, emails_per_cycle: usize) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
            cycles_requested,
            emails_per_cycle,
            cancelled: false,
            cycles: Vec::new(),
        }
    }

    pub fn push(&mut self, result: CycleResult) {
        self.cycles.push(result);
    }

    pub fn finish(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
        self.ended_at = Some(Utc::now());
    }

    pub fn summary(&self) -> SessionSummary {
        let fold = self.cycles.iter().fold(Fold::default(), Fold::step);
        let cycles_run = self.cycles.len();

        let accuracy_trend = match (fold.first_success, fold.last_success) {
            (Some(first), Some(last)) => Some((first, last)),
            _ => None,
        };
        let trend_direction = accuracy_trend
            .filter(|_| fold.successes_seen >= 2)
            .map(|(first, last)| {
                if last - first > TREND_EPSILON {
                    TrendDirection::Improving
                } else if first - last > TREND_EPSILON {
                    TrendDirection::Declining
                } else {
                    TrendDirection::Flat
                }
            });

        let ended_at = self.ended_at.unwrap_or_else(Utc::now);
        let duration_secs = (ended_at - self.started_at).num_milliseconds().max(0) as f64 / 1000.0;

        SessionSummary {
            cycles_run,
            successful_cycles: fold.successful,
            failed_cycles: fold.failed,
            success_ratio: ratio(fold.successful, cycles_run),
            average_accuracy: if fold.scored == 0 {
                0.0
            } else {
                fold.accuracy_sum / fold.scored as f64
            },
            best_accuracy: fold.best,
            worst_accuracy: fold.worst,
            accuracy_trend,
            trend_direction,
            total_emails_generated: fold.emails,
            total_classifications: fold.classifications,
            total_correct: fold.correct,
            total_feedback_applied: fold.feedback_applied,
            total_feedback_failed: fold.feedback_failed,
            duration_secs,
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        tracing::info!("Training statistics saved to {:?}", path);
        Ok(())
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            TrainerError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read session {:?}: {}", path, e),
            ))
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Human-readable report of the session
    pub fn to_markdown(&self) -> String {
        let summary = self.summary();
        let mut md = String::new();

        md.push_str("# Training Session Report\n\n");
        md.push_str(&format!("**Session:** `{}`\n\n", self.session_id));
        md.push_str(&format!(
            "**Started:** {}\n\n",
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        if self.cancelled {
            md.push_str("**Status:** cancelled before all cycles ran\n\n");
        }

        md.push_str("## Summary\n\n");
        md.push_str("| Metric | Value |\n|--------|-------|\n");
        md.push_str(&format!(
            "| Cycles | {} of {} run, {} succeeded |\n",
            summary.cycles_run, self.cycles_requested, summary.successful_cycles
        ));
        md.push_str(&format!(
            "| Emails generated | {} |\n",
            summary.total_emails_generated
        ));
        md.push_str(&format!(
            "| Classifications | {} |\n",
            summary.total_classifications
        ));
        md.push_str(&format!(
            "| Feedback applied | {} |\n",
            summary.total_feedback_applied
        ));
        md.push_str(&format!(
            "| Average accuracy | {} |\n",
            percent(summary.average_accuracy)
        ));
        if let (Some(best), Some(worst)) = (summary.best_accuracy, summary.worst_accuracy) {
            md.push_str(&format!("| Best accuracy | {} |\n", percent(best)));
            md.push_str(&format!("| Worst accuracy | {} |\n", percent(worst)));
        }
        if let Some(direction) = summary.trend_direction {
            md.push_str(&format!("| Trend | {} |\n", direction));
        }
        md.push_str(&format!("| Duration | {:.1}s |\n", summary.duration_secs));

        md.push_str("\n## Cycles\n\n");
        md.push_str("| # | Result | Emails | Correct | Accuracy | Feedback | Duration |\n");
        md.push_str("|---|--------|--------|---------|----------|----------|----------|\n");
        for cycle in &self.cycles {
            let outcome = if cycle.succeeded {
                "ok".to_string()
            } else {
                format!(
                    "failed: {}",
                    cycle.failure_reason.as_deref().unwrap_or("unknown")
                )
            };
            md.push_str(&format!(
                "| {} | {} | {} | {}/{} | {} | {} | {:.1}s |\n",
                cycle.cycle_number,
                outcome,
                cycle.emails_generated,
                cycle.correct,
                cycle.classifications,
                percent(cycle.accuracy),
                cycle.feedback_applied,
                cycle.duration_ms as f64 / 1000.0
            ));
        }

        md
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn percent(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::cycle::CyclePhase;
    use tempfile::TempDir;

    fn cycle(n: u32, classifications: usize, correct: usize) -> CycleResult {
        CycleResult {
            cycle_number: n,
            started_at: Utc::now(),
            duration_ms: 1200,
            phase: CyclePhase::Done,
            emails_generated: classifications,
            classifications,
            correct,
            classification_failures: 0,
            feedback_applied: classifications - correct,
            feedback_failed: 0,
            accuracy: if classifications == 0 {
                0.0
            } else {
                correct as f64 / classifications as f64
            },
            succeeded: true,
            failure_reason: None,
        }
    }

    fn failed(n: u32) -> CycleResult {
        CycleResult {
            phase: CyclePhase::Failed,
            succeeded: false,
            failure_reason: Some("Email generation failed: timeout".to_string()),
            ..cycle(n, 0, 0)
        }
    }

    #[test]
    fn test_average_ignores_cycles_without_classifications() {
        let mut session = TrainingSession::new(4, 10);
        session.push(cycle(1, 10, 5));
        session.push(cycle(2, 0, 0));
        session.push(failed(3));
        session.push(cycle(4, 10, 9));

        let summary = session.summary();

        assert!((summary.average_accuracy - 0.7).abs() < 1e-9);
        assert_eq!(summary.successful_cycles, 3);
        assert_eq!(summary.failed_cycles, 1);
        assert!((summary.success_ratio - 0.75).abs() < 1e-9);
        assert_eq!(summary.best_accuracy, Some(0.9));
        assert_eq!(summary.worst_accuracy, Some(0.5));
        assert_eq!(summary.total_classifications, 20);
        assert_eq!(summary.total_feedback_applied, 6);
    }

    #[test]
    fn test_trend_uses_first_and_last_successful_cycles() {
        let mut session = TrainingSession::new(3, 10);
        session.push(failed(1));
        session.push(cycle(2, 10, 4));
        session.push(cycle(3, 10, 8));

        let summary = session.summary();
        assert_eq!(summary.accuracy_trend, Some((0.4, 0.8)));
        assert_eq!(summary.trend_direction, Some(TrendDirection::Improving));
    }

    #[test]
    fn test_single_success_has_no_direction() {
        let mut session = TrainingSession::new(1, 10);
        session.push(cycle(1, 10, 4));

        let summary = session.summary();
        assert_eq!(summary.accuracy_trend, Some((0.4, 0.4)));
        assert_eq!(summary.trend_direction, None);
    }

    #[test]
    fn test_all_failed_session() {
        let mut session = TrainingSession::new(2, 10);
        session.push(failed(1));
        session.push(failed(2));

        let summary = session.summary();
        assert_eq!(summary.average_accuracy, 0.0);
        assert_eq!(summary.successful_cycles, 0);
        assert_eq!(summary.success_ratio, 0.0);
        assert!(summary.accuracy_trend.is_none());
        assert!(summary.best_accuracy.is_none());
    }

    #[test]
    fn test_markdown_lists_failures() {
        let mut session = TrainingSession::new(2, 10);
        session.push(cycle(1, 10, 7));
        session.push(failed(2));
        session.finish(false);

        let md = session.to_markdown();
        assert!(md.contains("# Training Session Report"));
        assert!(md.contains("| Average accuracy | 70.0% |"));
        assert!(md.contains("failed: Email generation failed: timeout"));
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stats").join("session.json");

        let mut session = TrainingSession::new(2, 5);
        session.push(cycle(1, 5, 2));
        session.push(failed(2));
        session.finish(true);

        session.save(&path).await.unwrap();
        let loaded = TrainingSession::load(&path).await.unwrap();

        assert_eq!(loaded.session_id, session.session_id);
        assert!(loaded.cancelled);
        assert_eq!(loaded.cycles.len(), 2);
        assert_eq!(loaded.cycles[0].correct, 2);
        assert!(!loaded.cycles[1].succeeded);
        assert_eq!(loaded.summary().successful_cycles, 1);
    }
}
