//! Command-line interface

use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::training::{CycleEvent, ProgressCallback, TrainingSession};

#[derive(Parser, Debug)]
#[command(name = "email-trainer")]
#[command(version)]
#[command(about = "Email category classifier and feedback-driven training loop", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate, classify and reconcile emails for a number of cycles
    Train {
        /// Number of training cycles to run
        #[arg(long)]
        cycles: Option<u32>,

        /// Number of emails to generate per cycle
        #[arg(long)]
        emails_per_cycle: Option<usize>,

        /// Delay in seconds between cycles
        #[arg(long)]
        delay: Option<u64>,

        /// Run only a single training cycle
        #[arg(long)]
        single_cycle: bool,

        /// Classify through the backend instead of the local engine
        #[arg(long)]
        remote_classifier: bool,

        /// Save training statistics to this JSON file
        #[arg(long)]
        save_stats: Option<PathBuf>,

        /// Write a Markdown report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Classify one email with the local engine
    Classify {
        #[arg(long)]
        subject: String,

        #[arg(long)]
        body: String,
    },

    /// Inspect or extend the category registry
    Categories {
        #[command(subcommand)]
        action: CategoryAction,
    },

    /// Record the correct category for an email
    Feedback {
        #[arg(long)]
        subject: String,

        #[arg(long)]
        body: String,

        #[arg(long)]
        category: String,
    },

    /// Show what the feedback log holds
    Stats,

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum CategoryAction {
    /// List categories in registry order
    List,
    /// Add a new category
    Add { name: String },
}

/// Progress bars for training runs, sharing the log writer's MultiProgress
pub struct ProgressReporter {
    multi: Arc<MultiProgress>,
    spinner_style: ProgressStyle,
    bar_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn with_multi_progress(multi: Arc<MultiProgress>) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        let bar_style = ProgressStyle::default_bar()
            .template("[{elapsed:>6}] {bar:40.cyan/blue} {pos:>4}/{len:4} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");

        Self {
            multi,
            spinner_style,
            bar_style,
        }
    }

    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Callback that drives one bar per cycle from cycle events
    pub fn cycle_progress(&self) -> ProgressCallback {
        let multi = Arc::clone(&self.multi);
        let spinner_style = self.spinner_style.clone();
        let bar_style = self.bar_style.clone();
        let current: Arc<std::sync::Mutex<Option<ProgressBar>>> =
            Arc::new(std::sync::Mutex::new(None));

        Arc::new(move |event: CycleEvent| {
            let Ok(mut slot) = current.lock() else {
                return;
            };

            match event {
                CycleEvent::Generating { cycle, requested } => {
                    let pb = multi.add(ProgressBar::new_spinner());
                    pb.set_style(spinner_style.clone());
                    pb.set_message(format!("Cycle {}: generating {} emails", cycle, requested));
                    pb.enable_steady_tick(Duration::from_millis(100));
                    *slot = Some(pb);
                }
                CycleEvent::Generated { cycle, emails } => {
                    if let Some(pb) = slot.as_ref() {
                        pb.set_style(bar_style.clone());
                        pb.set_length(emails as u64);
                        pb.set_position(0);
                        pb.set_message(format!("Cycle {}: classifying", cycle));
                    }
                }
                CycleEvent::Classified { .. } => {
                    if let Some(pb) = slot.as_ref() {
                        pb.inc(1);
                    }
                }
                CycleEvent::Finished { .. } => {
                    if let Some(pb) = slot.take() {
                        pb.finish_and_clear();
                    }
                }
            }
        })
    }
}

/// Console summary printed after a training run
pub fn render_summary(session: &TrainingSession) -> String {
    let summary = session.summary();
    let rule = "=".repeat(60);
    let mut out = String::new();

    out.push_str(&format!("\n{}\nTRAINING SESSION SUMMARY\n{}\n", rule, rule));
    out.push_str(&format!("Session: {}\n", session.session_id));
    out.push_str(&format!(
        "Cycles: {}/{} succeeded ({} requested)\n",
        summary.successful_cycles, summary.cycles_run, session.cycles_requested
    ));
    out.push_str(&format!(
        "Total emails generated: {}\n",
        summary.total_emails_generated
    ));
    out.push_str(&format!(
        "Total classifications: {}\n",
        summary.total_classifications
    ));
    out.push_str(&format!(
        "Total feedback applied: {}\n",
        summary.total_feedback_applied
    ));
    if summary.total_feedback_failed > 0 {
        out.push_str(&format!(
            "Feedback not applied: {}\n",
            summary.total_feedback_failed
        ));
    }
    out.push_str(&format!(
        "Average accuracy: {:.1}%\n",
        summary.average_accuracy * 100.0
    ));
    if let (Some(best), Some(worst)) = (summary.best_accuracy, summary.worst_accuracy) {
        out.push_str(&format!("Best accuracy: {:.1}%\n", best * 100.0));
        out.push_str(&format!("Worst accuracy: {:.1}%\n", worst * 100.0));
    }
    if let Some(direction) = summary.trend_direction {
        out.push_str(&format!("Accuracy trend: {}\n", direction));
    }
    for cycle in session.cycles.iter().filter(|c| !c.succeeded) {
        out.push_str(&format!(
            "Cycle {} failed: {}\n",
            cycle.cycle_number,
            cycle.failure_reason.as_deref().unwrap_or("unknown")
        ));
    }
    if session.cancelled {
        out.push_str("Training interrupted by user\n");
    }
    out.push_str(&format!("Duration: {:.1}s\n{}", summary.duration_secs, rule));
    out
}
