//! Per-source circuit breaker
//!
//! Tracks consecutive failures for one provider. After the threshold the
//! circuit opens and calls are rejected without touching the network; after
//! a cooldown, one half-open probe is allowed through.

use crate::config::BreakerConfig;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

// Field is named source_id, not source: thiserror reserves `source` for
// the error cause chain.
#[derive(Debug, Error)]
#[error("Circuit open for '{source_id}': {consecutive_failures} consecutive failures")]
pub struct CircuitOpen {
    pub source_id: String,
    pub consecutive_failures: u32,
}

/// Breaker state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls flow normally
    Closed,
    /// Calls are rejected until the cooldown elapses
    Open,
    /// One probe call is in flight; its outcome decides the next state
    HalfOpen,
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    source: String,
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(source: &str, config: &BreakerConfig) -> Self {
        Self {
            source: source.to_string(),
            failure_threshold: config.failure_threshold.max(1),
            cooldown: Duration::from_secs(config.cooldown_seconds),
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Gate a call. `Ok(())` means proceed (and report the outcome back via
    /// `record_success`/`record_failure`); `Err` means the circuit is open.
    pub fn try_acquire(&self) -> Result<(), CircuitOpen> {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");

        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.cooldown {
                    tracing::info!(
                        source = %self.source,
                        "Circuit half-open, allowing probe call"
                    );
                    inner.state = BreakerState::HalfOpen;
                    Ok(())
                } else {
                    Err(CircuitOpen {
                        source_id: self.source.clone(),
                        consecutive_failures: inner.consecutive_failures,
                    })
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        if inner.state != BreakerState::Closed {
            tracing::info!(source = %self.source, "Circuit closed after successful call");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        inner.consecutive_failures += 1;

        let should_open = match inner.state {
            // A failed probe reopens immediately
            BreakerState::HalfOpen => true,
            BreakerState::Closed => inner.consecutive_failures >= self.failure_threshold,
            BreakerState::Open => false,
        };

        if should_open {
            tracing::warn!(
                source = %self.source,
                consecutive_failures = inner.consecutive_failures,
                cooldown_seconds = self.cooldown.as_secs(),
                "Circuit opened"
            );
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().expect("breaker mutex poisoned").state
    }
}
