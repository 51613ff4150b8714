//! Circuit breaker guarding the external model
//!
//! A dead or overloaded model would otherwise cost a full timeout on every
//! email. After `failure_threshold` consecutive transient failures the breaker
//! opens and the classifier goes straight to its fallback until
//! `reset_timeout_secs` has passed, at which point one probe call is let
//! through (half-open).
//!
//! ```no_run
//! use email_trainer::circuit_breaker::CircuitBreaker;
//! use email_trainer::config::CircuitBreakerConfig;
//!
//! # async fn example() -> email_trainer::Result<()> {
//! let breaker = CircuitBreaker::new(CircuitBreakerConfig::default());
//! let answer = breaker.call(|| async { Ok::<_, email_trainer::TrainerError>("General Inquiry") }).await?;
//! # let _ = answer;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::CircuitBreakerConfig;
use crate::error::{Result, TrainerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    /// Reset timeout elapsed; a single probe call is allowed through
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    config: CircuitBreakerConfig,
}

impl BreakerState {
    fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            opened_at: None,
            probe_in_flight: false,
            config,
        }
    }

    fn admit(&mut self) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        match (self.state, self.opened_at) {
            (CircuitState::Closed, _) => Ok(()),
            (CircuitState::HalfOpen, _) if self.probe_in_flight => {
                Err(TrainerError::CircuitBreakerOpen {
                    message: "waiting for the probe call to the external model".to_string(),
                    retry_after_secs: 0,
                })
            }
            (CircuitState::HalfOpen, _) => {
                self.probe_in_flight = true;
                Ok(())
            }
            (CircuitState::Open, Some(opened_at)) => {
                let timeout = Duration::from_secs(self.config.reset_timeout_secs);
                let elapsed = opened_at.elapsed();

                if elapsed >= timeout {
                    debug!("External model breaker half-open after {:?}", elapsed);
                    self.state = CircuitState::HalfOpen;
                    self.probe_in_flight = true;
                    Ok(())
                } else {
                    Err(TrainerError::CircuitBreakerOpen {
                        message: format!(
                            "external model failed {} times in a row",
                            self.failure_count
                        ),
                        retry_after_secs: (timeout - elapsed).as_secs(),
                    })
                }
            }
            (CircuitState::Open, None) => {
                warn!("Breaker open without a timestamp, closing it");
                self.close();
                Ok(())
            }
        }
    }

    fn on_success(&mut self) {
        if !self.config.enabled {
            return;
        }
        if self.state != CircuitState::Closed {
            debug!("External model recovered, closing breaker");
        }
        self.close();
    }

    fn on_failure(&mut self, error: &TrainerError) {
        if !self.config.enabled {
            return;
        }
        if !counts_as_failure(error) {
            // The model answered, just not usefully; let the next call probe
            self.probe_in_flight = false;
            return;
        }

        match self.state {
            CircuitState::Closed => {
                self.failure_count += 1;
                if self.failure_count >= self.config.failure_threshold {
                    warn!(
                        failures = self.failure_count,
                        "Opening external model breaker for {}s", self.config.reset_timeout_secs
                    );
                    self.state = CircuitState::Open;
                    self.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                warn!("Probe call to external model failed, reopening breaker");
                self.state = CircuitState::Open;
                self.opened_at = Some(Instant::now());
                self.probe_in_flight = false;
            }
            CircuitState::Open => {}
        }
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.opened_at = None;
        self.probe_in_flight = false;
    }
}

/// Only availability problems trip the breaker; a bad answer does not
fn counts_as_failure(error: &TrainerError) -> bool {
    !matches!(error, TrainerError::CircuitBreakerOpen { .. }) && error.is_transient()
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: Arc<Mutex<BreakerState>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(BreakerState::new(config))),
        }
    }

    /// Err(CircuitBreakerOpen) while the breaker is rejecting calls
    pub async fn check_request(&self) -> Result<()> {
        self.state.lock().await.admit()
    }

    pub async fn record_success(&self) {
        self.state.lock().await.on_success();
    }

    pub async fn record_failure(&self, error: &TrainerError) {
        self.state.lock().await.on_failure(error);
    }

    pub async fn state(&self) -> CircuitState {
        self.state.lock().await.state
    }

    /// Run `operation` if the breaker admits it and record the outcome
    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.check_request().await?;

        match operation().await {
            Ok(value) => {
                self.record_success().await;
                Ok(value)
            }
            Err(e) => {
                self.record_failure(&e).await;
                Err(e)
            }
        }
    }

    pub async fn reset(&self) {
        self.state.lock().await.close();
        debug!("External model breaker reset");
    }

    pub async fn stats(&self) -> CircuitBreakerStats {
        let state = self.state.lock().await;
        CircuitBreakerStats {
            state: state.state,
            failure_count: state.failure_count,
            opened_at: state.opened_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub failure_count: u32,
    pub opened_at: Option<Instant>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: u32, reset_secs: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            enabled: true,
            failure_threshold: threshold,
            reset_timeout_secs: reset_secs,
        }
    }

    fn timeout() -> TrainerError {
        TrainerError::Timeout("ollama".to_string())
    }

    #[tokio::test]
    async fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::new(config(3, 60));

        for _ in 0..3 {
            breaker.record_failure(&timeout()).await;
        }

        assert_eq!(breaker.state().await, CircuitState::Open);
        let result = breaker.check_request().await;
        assert!(matches!(
            result,
            Err(TrainerError::CircuitBreakerOpen { retry_after_secs, .. }) if retry_after_secs <= 60
        ));
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let breaker = CircuitBreaker::new(config(3, 60));

        breaker.record_failure(&timeout()).await;
        breaker.record_failure(&timeout()).await;
        assert_eq!(breaker.stats().await.failure_count, 2);

        breaker.record_success().await;

        assert_eq!(breaker.stats().await.failure_count, 0);
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_probe_success_closes() {
        let breaker = CircuitBreaker::new(config(1, 0));

        breaker.record_failure(&timeout()).await;
        assert_eq!(breaker.state().await, CircuitState::Open);

        assert!(breaker.check_request().await.is_ok());
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);

        breaker.record_success().await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_admits_one_probe_at_a_time() {
        let breaker = CircuitBreaker::new(config(1, 0));
        breaker.record_failure(&timeout()).await;

        assert!(breaker.check_request().await.is_ok());
        assert!(matches!(
            breaker.check_request().await,
            Err(TrainerError::CircuitBreakerOpen { .. })
        ));
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);

        breaker.record_success().await;
        assert!(breaker.check_request().await.is_ok());
        assert!(breaker.check_request().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_while_half_open_send_one_probe() {
        let breaker = CircuitBreaker::new(config(1, 0));
        breaker.record_failure(&timeout()).await;

        let probe = breaker.call(|| async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, TrainerError>(1)
        });
        let other = async {
            tokio::task::yield_now().await;
            breaker.call(|| async { Ok::<_, TrainerError>(2) }).await
        };
        let (probe, other) = tokio::join!(probe, other);

        assert_eq!(probe.unwrap(), 1);
        assert!(matches!(other, Err(TrainerError::CircuitBreakerOpen { .. })));
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_permanent_probe_error_frees_the_probe_slot() {
        let breaker = CircuitBreaker::new(config(1, 0));
        breaker.record_failure(&timeout()).await;

        assert!(breaker.check_request().await.is_ok());
        breaker
            .record_failure(&TrainerError::InvalidResponse("not JSON".to_string()))
            .await;

        assert_eq!(breaker.state().await, CircuitState::HalfOpen);
        assert!(breaker.check_request().await.is_ok());
    }

    #[tokio::test]
    async fn test_half_open_probe_failure_reopens() {
        let breaker = CircuitBreaker::new(config(1, 0));

        breaker.record_failure(&timeout()).await;
        breaker.check_request().await.ok();
        breaker
            .record_failure(&TrainerError::Network("connection refused".to_string()))
            .await;

        assert_eq!(breaker.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_disabled_never_rejects() {
        let mut cfg = config(1, 60);
        cfg.enabled = false;
        let breaker = CircuitBreaker::new(cfg);

        for _ in 0..10 {
            breaker.record_failure(&timeout()).await;
        }

        assert!(breaker.check_request().await.is_ok());
    }

    #[tokio::test]
    async fn test_permanent_errors_are_ignored() {
        let breaker = CircuitBreaker::new(config(2, 60));

        breaker
            .record_failure(&TrainerError::InvalidResponse("not JSON".to_string()))
            .await;
        breaker
            .record_failure(&TrainerError::Backend {
                status: 404,
                message: "model not found".to_string(),
            })
            .await;

        assert_eq!(breaker.state().await, CircuitState::Closed);
        assert_eq!(breaker.stats().await.failure_count, 0);
    }

    #[tokio::test]
    async fn test_call_records_outcome() {
        let breaker = CircuitBreaker::new(config(1, 60));

        let ok = breaker.call(|| async { Ok::<_, TrainerError>(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err = breaker
            .call(|| async { Err::<u32, _>(timeout()) })
            .await;
        assert!(matches!(err, Err(TrainerError::Timeout(_))));
        assert_eq!(breaker.state().await, CircuitState::Open);

        // Rejected without running the operation
        let mut ran = false;
        let rejected = breaker
            .call(|| {
                ran = true;
                async { Ok::<_, TrainerError>(0) }
            })
            .await;
        assert!(matches!(rejected, Err(TrainerError::CircuitBreakerOpen { .. })));
        assert!(!ran);
    }

    #[tokio::test]
    async fn test_reset() {
        let breaker = CircuitBreaker::new(config(1, 60));
        breaker.record_failure(&timeout()).await;
        assert_eq!(breaker.state().await, CircuitState::Open);

        breaker.reset().await;

        assert_eq!(breaker.state().await, CircuitState::Closed);
        assert!(breaker.check_request().await.is_ok());
        assert!(breaker.stats().await.opened_at.is_none());
    }
}
