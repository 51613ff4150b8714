//! Integration tests for the training cycle and the continuous trainer

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{create_batch, prediction, MockClassifier, MockFeedback, MockGenerator};
use email_trainer::error::TrainerError;
use email_trainer::feedback::{email_hash, InMemoryFeedbackLog};
use email_trainer::models::FeedbackRecord;
use email_trainer::training::{ContinuousTrainer, CyclePhase, TrainingCycleRunner};

#[tokio::test]
async fn test_constant_classifier_accuracy_and_feedback() {
    let batch = create_batch(&["X", "Y", "X", "Y", "Y"]);
    let expected_batch = batch.clone();

    let mut generator = MockGenerator::new();
    generator
        .expect_generate()
        .withf(|count| *count == 5)
        .times(1)
        .returning(move |_| Ok(batch.clone()));

    let mut classifier = MockClassifier::new();
    classifier
        .expect_classify()
        .times(5)
        .returning(|_, _| Ok(prediction("X")));

    let feedback = Arc::new(InMemoryFeedbackLog::new());
    let runner = TrainingCycleRunner::new(Arc::new(generator), Arc::new(classifier), feedback.clone());

    let result = runner.run(1, 5).await;

    assert!(result.succeeded);
    assert_eq!(result.classifications, 5);
    assert_eq!(result.correct, 2);
    assert!((result.accuracy - 0.4).abs() < 1e-9);
    assert_eq!(result.feedback_applied, 3);

    // Feedback exists exactly for the misclassified emails
    let expected: Vec<FeedbackRecord> = expected_batch
        .emails
        .iter()
        .zip(&expected_batch.answer_key)
        .filter(|(_, answer)| answer.correct_category != "X")
        .map(|(email, answer)| FeedbackRecord {
            email_hash: email_hash(&email.subject, &email.body),
            correct_category: answer.correct_category.clone(),
        })
        .collect();
    assert_eq!(feedback.records().await, expected);
}

#[tokio::test]
async fn test_zero_email_cycles_never_touch_the_generator() {
    let mut generator = MockGenerator::new();
    generator.expect_generate().times(0);

    let mut classifier = MockClassifier::new();
    classifier.expect_classify().times(0);

    let runner = TrainingCycleRunner::new(
        Arc::new(generator),
        Arc::new(classifier),
        Arc::new(InMemoryFeedbackLog::new()),
    );
    let trainer = ContinuousTrainer::new(runner);

    let session = trainer.run(3, 0, Duration::ZERO).await.unwrap();

    assert_eq!(session.cycles.len(), 3);
    for (i, cycle) in session.cycles.iter().enumerate() {
        assert_eq!(cycle.cycle_number, i as u32 + 1);
        assert_eq!(cycle.classifications, 0);
        assert_eq!(cycle.accuracy, 0.0);
        assert!(cycle.succeeded);
    }
    assert!(!session.cancelled);
    assert_eq!(session.summary().average_accuracy, 0.0);
}

#[tokio::test]
async fn test_feedback_write_failure_does_not_abort_cycle() {
    let batch = create_batch(&["A", "B", "B"]);

    let mut generator = MockGenerator::new();
    generator
        .expect_generate()
        .returning(move |_| Ok(batch.clone()));

    let mut classifier = MockClassifier::new();
    classifier
        .expect_classify()
        .returning(|_, _| Ok(prediction("A")));

    let mut feedback = MockFeedback::new();
    feedback
        .expect_record()
        .times(2)
        .returning(|_, _| Err(TrainerError::FeedbackWrite("disk full".to_string())));

    let runner = TrainingCycleRunner::new(Arc::new(generator), Arc::new(classifier), Arc::new(feedback));
    let result = runner.run(1, 3).await;

    assert!(result.succeeded);
    assert_eq!(result.phase, CyclePhase::Done);
    assert_eq!(result.correct, 1);
    assert_eq!(result.feedback_applied, 0);
    assert_eq!(result.feedback_failed, 2);
}

#[tokio::test]
async fn test_generator_short_batch_is_accepted() {
    let batch = create_batch(&["A", "A"]);

    let mut generator = MockGenerator::new();
    generator
        .expect_generate()
        .returning(move |_| Ok(batch.clone()));

    let mut classifier = MockClassifier::new();
    classifier
        .expect_classify()
        .returning(|_, _| Ok(prediction("A")));

    let runner = TrainingCycleRunner::new(
        Arc::new(generator),
        Arc::new(classifier),
        Arc::new(InMemoryFeedbackLog::new()),
    );
    let result = runner.run(1, 10).await;

    assert!(result.succeeded);
    assert_eq!(result.emails_generated, 2);
    assert_eq!(result.accuracy, 1.0);
}

#[tokio::test]
async fn test_empty_batch_for_nonzero_count_fails_cycle() {
    let mut generator = MockGenerator::new();
    generator
        .expect_generate()
        .returning(|_| Ok(create_batch(&[])));

    let runner = TrainingCycleRunner::new(
        Arc::new(generator),
        Arc::new(MockClassifier::new()),
        Arc::new(InMemoryFeedbackLog::new()),
    );
    let result = runner.run(2, 5).await;

    assert!(!result.succeeded);
    assert_eq!(result.phase, CyclePhase::Failed);
    assert!(result.failure_reason.unwrap().contains("returned none"));
}

#[tokio::test]
async fn test_failing_cycles_are_recorded_and_session_continues() {
    let batch = create_batch(&["A", "B"]);
    let mut calls = 0;

    let mut generator = MockGenerator::new();
    generator.expect_generate().times(3).returning(move |_| {
        calls += 1;
        if calls == 2 {
            Err(TrainerError::Generation("HTTP 500: No API key configured".to_string()))
        } else {
            Ok(batch.clone())
        }
    });

    let mut classifier = MockClassifier::new();
    classifier
        .expect_classify()
        .returning(|_, _| Ok(prediction("A")));

    let runner = TrainingCycleRunner::new(
        Arc::new(generator),
        Arc::new(classifier),
        Arc::new(InMemoryFeedbackLog::new()),
    );
    let session = ContinuousTrainer::new(runner)
        .run(3, 2, Duration::ZERO)
        .await
        .unwrap();

    assert_eq!(session.cycles.len(), 3);
    assert!(!session.cycles[1].succeeded);
    assert!(session.cycles[1]
        .failure_reason
        .as_deref()
        .unwrap()
        .contains("No API key configured"));

    let summary = session.summary();
    assert_eq!(summary.successful_cycles, 2);
    assert_eq!(summary.failed_cycles, 1);
    assert!((summary.average_accuracy - 0.5).abs() < 1e-9);
    assert_eq!(summary.accuracy_trend, Some((0.5, 0.5)));
    assert!((summary.success_ratio - 2.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_parallel_classification_keeps_generator_order() {
    let categories = ["A", "B", "C", "D", "E", "F"];
    let batch = create_batch(&categories);
    let subjects: Vec<(String, String)> = batch
        .emails
        .iter()
        .zip(&batch.answer_key)
        .map(|(e, a)| (e.subject.clone(), a.correct_category.clone()))
        .collect();

    let mut generator = MockGenerator::new();
    generator
        .expect_generate()
        .returning(move |_| Ok(batch.clone()));

    // Answers correctly; earlier emails finish last
    struct SlowEarly(Vec<(String, String)>);

    #[async_trait::async_trait]
    impl email_trainer::classifier::EmailClassifier for SlowEarly {
        async fn classify(
            &self,
            subject: &str,
            _body: &str,
        ) -> email_trainer::Result<email_trainer::ClassificationResult> {
            let index = self.0.iter().position(|(s, _)| s == subject).unwrap();
            let wait = (self.0.len() - index) as u64 * 10;
            tokio::time::sleep(Duration::from_millis(wait)).await;
            Ok(prediction(&self.0[index].1))
        }
    }

    let feedback = Arc::new(InMemoryFeedbackLog::new());
    let runner = TrainingCycleRunner::new(
        Arc::new(generator),
        Arc::new(SlowEarly(subjects)),
        feedback.clone(),
    )
    .with_concurrency(4);

    let result = runner.run(1, 6).await;

    assert_eq!(result.correct, 6);
    assert_eq!(result.accuracy, 1.0);
    assert!(feedback.records().await.is_empty());
}
