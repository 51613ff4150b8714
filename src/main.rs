use anyhow::{bail, Context, Result};
use clap::Parser;
use email_trainer::backend::BackendClient;
use email_trainer::classifier::{Classifier, EmailClassifier};
use email_trainer::cli::{self, CategoryAction, Cli, Commands};
use email_trainer::config::Config;
use email_trainer::feedback::{FeedbackRepository, JsonFeedbackLog};
use email_trainer::models::Email;
use email_trainer::registry::{CategoryRepository, JsonCategoryStore};
use email_trainer::training::{ContinuousTrainer, TrainingCycleRunner};
use indicatif::MultiProgress;
use std::io::Write;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// A writer that prints through MultiProgress so log lines stay above progress bars
#[derive(Clone)]
struct MultiProgressWriter {
    multi: Arc<MultiProgress>,
    buffer: Vec<u8>,
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.buffer.is_empty() {
            let msg = String::from_utf8_lossy(&self.buffer);
            let msg = msg.trim_end_matches('\n');
            if !msg.is_empty() {
                let _ = self.multi.println(msg);
            }
            self.buffer.clear();
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: Arc<MultiProgress>,
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter {
            multi: Arc::clone(&self.multi),
            buffer: Vec::new(),
        }
    }
}

fn init_tracing(cli: &Cli, multi: Arc<MultiProgress>) {
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("email_trainer=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("email_trainer=info,warn"))
    };

    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(MultiProgressMakeWriter { multi })
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        eprintln!("\nFor help, run: email-trainer --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let multi_progress = Arc::new(MultiProgress::new());
    init_tracing(&cli, Arc::clone(&multi_progress));

    if let Commands::InitConfig { output, force } = &cli.command {
        if output.exists() && !force {
            bail!(
                "Config file already exists at {:?}. Use --force to overwrite.",
                output
            );
        }
        Config::create_example(output).await?;
        println!("Created example configuration file at: {:?}", output);
        println!("\nKey settings to review:");
        println!("  - backend.url: where the training backend listens");
        println!("  - classifier.external_model.enabled: consult a local Ollama model");
        println!("  - training.emails_per_cycle: emails generated per cycle (max 50)");
        return Ok(());
    }

    let config = Config::load(&cli.config)
        .await
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

    match cli.command {
        Commands::Train {
            cycles,
            emails_per_cycle,
            delay,
            single_cycle,
            remote_classifier,
            save_stats,
            report,
        } => {
            let mut config = config;
            if let Some(cycles) = cycles {
                config.training.cycles = cycles;
            }
            if let Some(emails) = emails_per_cycle {
                config.training.emails_per_cycle = emails;
            }
            if let Some(delay) = delay {
                config.training.delay_secs = delay;
            }
            config.training.remote_classifier |= remote_classifier;
            config.validate()?;

            let reporter = cli::ProgressReporter::with_multi_progress(Arc::clone(&multi_progress));
            let backend = Arc::new(BackendClient::new(&config.backend)?);

            let spinner = reporter.add_spinner("Checking backend connection...");
            let health = backend.health_check().await;
            spinner.finish_and_clear();
            if let Err(e) = health {
                bail!(
                    "Cannot connect to backend at {}: {}\n\
                     Make sure the backend server is running and its generator is configured.",
                    backend.base_url(),
                    e
                );
            }

            let classifier: Arc<dyn EmailClassifier>;
            let feedback: Arc<dyn FeedbackRepository>;
            if config.training.remote_classifier {
                tracing::info!("Classifying and recording feedback through the backend");
                classifier = backend.clone();
                feedback = backend.clone();
            } else {
                let categories =
                    Arc::new(JsonCategoryStore::open(&config.storage.categories_path).await?);
                classifier = Arc::new(Classifier::from_config(
                    categories,
                    &config.classifier,
                    &config.circuit_breaker,
                )?);
                feedback = Arc::new(JsonFeedbackLog::open(&config.storage.feedback_path).await?);
            }

            let runner = TrainingCycleRunner::new(backend, classifier, feedback)
                .with_concurrency(config.training.classify_concurrency)
                .with_progress(reporter.cycle_progress());

            let cancel = CancellationToken::new();
            let trainer = ContinuousTrainer::new(runner).with_cancellation(cancel.clone());

            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received, stopping after the current cycle");
                    cancel.cancel();
                }
            });

            let session = if single_cycle {
                trainer.run_single(config.training.emails_per_cycle).await?
            } else {
                trainer
                    .run(
                        config.training.cycles,
                        config.training.emails_per_cycle,
                        Duration::from_secs(config.training.delay_secs),
                    )
                    .await?
            };

            println!("{}", cli::render_summary(&session));

            if let Some(path) = save_stats {
                session.save(&path).await?;
                println!("Training statistics saved to {:?}", path);
            }
            if let Some(path) = report {
                tokio::fs::write(&path, session.to_markdown())
                    .await
                    .with_context(|| format!("Failed to write report to {:?}", path))?;
                println!("Report written to {:?}", path);
            }
        }

        Commands::Classify { subject, body } => {
            let categories = Arc::new(JsonCategoryStore::open(&config.storage.categories_path).await?);
            let classifier =
                Classifier::from_config(categories, &config.classifier, &config.circuit_breaker)?;

            let result = classifier.classify_email(&Email::new(subject, body)).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Categories { action } => {
            let store = JsonCategoryStore::open(&config.storage.categories_path).await?;
            match action {
                CategoryAction::List => {
                    for name in store.list().await? {
                        println!("{}", name);
                    }
                }
                CategoryAction::Add { name } => {
                    store.add(&name).await?;
                    println!("Added category '{}'", name.trim());
                }
            }
        }

        Commands::Feedback {
            subject,
            body,
            category,
        } => {
            let log = JsonFeedbackLog::open(&config.storage.feedback_path).await?;
            let record = log.record(&Email::new(subject, body), &category).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }

        Commands::Stats => {
            let log = JsonFeedbackLog::open(&config.storage.feedback_path).await?;
            println!("{}", serde_json::to_string_pretty(&log.stats().await)?);
        }

        // Handled before the config is loaded
        Commands::InitConfig { .. } => {}
    }

    Ok(())
}
