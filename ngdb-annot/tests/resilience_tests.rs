//! Resilience layer composition tests
//!
//! The unit tests cover each primitive alone; these exercise the
//! retry-then-breaker composition the provider transport uses, where one
//! exhausted call counts as one breaker failure.

use ngdb_annot::config::{BreakerConfig, RetryConfig};
use ngdb_annot::resilience::{BreakerState, CircuitBreaker, RateGate, RetryPolicy};
use ngdb_annot::sources::SourceError;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(&RetryConfig {
        max_attempts,
        initial_backoff_ms: 1,
        max_backoff_ms: 4,
    })
}

async fn call_through(
    retry: &RetryPolicy,
    breaker: &CircuitBreaker,
    attempts: &AtomicU32,
    outcome: Result<(), SourceError>,
) -> Result<(), SourceError> {
    breaker
        .try_acquire()
        .map_err(|e| SourceError::CircuitOpen(e.to_string()))?;

    let result = retry
        .execute("test", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            let outcome = match &outcome {
                Ok(()) => Ok(()),
                Err(SourceError::Network(msg)) => Err(SourceError::Network(msg.clone())),
                Err(SourceError::Api(code, msg)) => Err(SourceError::Api(*code, msg.clone())),
                Err(other) => Err(SourceError::Parse(other.to_string())),
            };
            async move { outcome }
        })
        .await;

    match &result {
        Ok(_) => breaker.record_success(),
        Err(_) => breaker.record_failure(),
    }
    result
}

#[tokio::test]
async fn test_exhausted_retries_count_once_against_breaker() {
    let retry = fast_retry(3);
    let breaker = CircuitBreaker::new(
        "test",
        &BreakerConfig {
            failure_threshold: 2,
            cooldown_seconds: 60,
        },
    );
    let attempts = AtomicU32::new(0);

    // First exhausted call: 3 attempts, breaker still closed
    let err = call_through(
        &retry,
        &breaker,
        &attempts,
        Err(SourceError::Network("down".to_string())),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SourceError::Network(_)));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(breaker.state(), BreakerState::Closed);

    // Second exhausted call reaches the threshold
    let _ = call_through(
        &retry,
        &breaker,
        &attempts,
        Err(SourceError::Network("down".to_string())),
    )
    .await;
    assert_eq!(breaker.state(), BreakerState::Open);

    // Open circuit fails fast, with no provider attempt at all
    let before = attempts.load(Ordering::SeqCst);
    let err = call_through(&retry, &breaker, &attempts, Ok(())).await.unwrap_err();
    assert!(matches!(err, SourceError::CircuitOpen(_)));
    assert_eq!(attempts.load(Ordering::SeqCst), before);
}

#[tokio::test]
async fn test_non_transient_error_fails_without_retry() {
    let retry = fast_retry(4);
    let breaker = CircuitBreaker::new(
        "test",
        &BreakerConfig {
            failure_threshold: 5,
            cooldown_seconds: 60,
        },
    );
    let attempts = AtomicU32::new(0);

    let err = call_through(
        &retry,
        &breaker,
        &attempts,
        Err(SourceError::Api(404, "not found".to_string())),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, SourceError::Api(404, _)));
    // A permanent error is not worth a second attempt
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_half_open_probe_recloses_on_success() {
    let retry = fast_retry(1);
    let breaker = CircuitBreaker::new(
        "test",
        &BreakerConfig {
            failure_threshold: 1,
            cooldown_seconds: 0,
        },
    );
    let attempts = AtomicU32::new(0);

    let _ = call_through(
        &retry,
        &breaker,
        &attempts,
        Err(SourceError::Network("down".to_string())),
    )
    .await;
    assert_eq!(breaker.state(), BreakerState::Open);

    // Zero cooldown: next acquire becomes the half-open probe
    call_through(&retry, &breaker, &attempts, Ok(())).await.unwrap();
    assert_eq!(breaker.state(), BreakerState::Closed);
}

#[tokio::test]
async fn test_rate_gates_are_independent_across_sources() {
    // A slow provider's gate must not slow a fast provider's
    let slow = RateGate::per_second(2);
    let fast = RateGate::per_second(50);

    // Put the slow gate mid-pace: its next caller must wait ~500ms
    slow.acquire().await;
    slow.acquire().await;

    let start = Instant::now();
    for _ in 0..5 {
        fast.acquire().await;
    }
    let fast_elapsed = start.elapsed();
    assert!(
        fast_elapsed.as_millis() < 250,
        "fast gate was delayed: {fast_elapsed:?}"
    );

    let start = Instant::now();
    slow.acquire().await;
    // The slow gate is still pacing its own source at 2 req/s
    assert!(start.elapsed().as_millis() >= 300);
}
