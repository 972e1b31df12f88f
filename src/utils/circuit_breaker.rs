use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Guards the notification sink. After `failure_threshold` consecutive
// failures the breaker opens and calls fail fast; once `open_timeout` has
// passed a probe is let through (half-open) and `success_threshold`
// consecutive successes close it again.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Gauge encoding used by the metrics registry.
    pub fn as_gauge(self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_timeout: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug)]
enum Phase {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen { successes: u32 },
}

impl Phase {
    fn state(&self) -> CircuitState {
        match self {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit breaker is open")]
    Open,

    #[error(transparent)]
    Failed(E),
}

#[derive(Clone)]
pub struct CircuitBreaker {
    phase: Arc<Mutex<Phase>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            phase: Arc::new(Mutex::new(Phase::Closed { failures: 0 })),
            config,
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.phase.lock().await.state()
    }

    /// Run `operation` unless the breaker is open.
    pub async fn call<Fut, T, E>(&self, operation: Fut) -> Result<T, CircuitBreakerError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.admit().await {
            return Err(CircuitBreakerError::Open);
        }

        match operation.await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(error) => {
                self.on_failure().await;
                Err(CircuitBreakerError::Failed(error))
            }
        }
    }

    async fn admit(&self) -> bool {
        let mut phase = self.phase.lock().await;

        if let Phase::Open { since } = *phase {
            if since.elapsed() < self.config.open_timeout {
                return false;
            }
            tracing::info!("Circuit breaker half-open, letting a probe through");
            *phase = Phase::HalfOpen { successes: 0 };
        }

        true
    }

    async fn on_success(&self) {
        let mut phase = self.phase.lock().await;

        match &mut *phase {
            Phase::Closed { failures } => *failures = 0,
            Phase::HalfOpen { successes } => {
                *successes += 1;
                if *successes >= self.config.success_threshold {
                    tracing::info!("Circuit breaker closed");
                    *phase = Phase::Closed { failures: 0 };
                }
            }
            Phase::Open { .. } => {}
        }
    }

    async fn on_failure(&self) {
        let mut phase = self.phase.lock().await;

        match &mut *phase {
            Phase::Closed { failures } => {
                *failures += 1;
                if *failures >= self.config.failure_threshold {
                    tracing::warn!(failures = *failures, "Circuit breaker opened");
                    *phase = Phase::Open { since: Instant::now() };
                }
            }
            Phase::HalfOpen { .. } => {
                tracing::warn!("Probe failed, circuit breaker reopened");
                *phase = Phase::Open { since: Instant::now() };
            }
            Phase::Open { since } => *since = Instant::now(),
        }
    }
}
