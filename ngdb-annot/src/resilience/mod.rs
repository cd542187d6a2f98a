//! Shared resilience layer
//!
//! One retry executor, one circuit breaker, one rate gate — composed by
//! every source client instead of each reimplementing ad hoc loops.

mod breaker;
mod rate_gate;
mod retry;

pub use breaker::{BreakerState, CircuitBreaker, CircuitOpen};
pub use rate_gate::RateGate;
pub use retry::{RetryPolicy, Retryable};
