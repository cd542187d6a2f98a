//! Event types for the NGDB annotation pipeline
//!
//! Provides shared event definitions and the EventBus used to stream
//! per-source progress to SSE subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Annotation pipeline event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
/// All events use this central enum for type safety and exhaustive matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AnnotEvent {
    /// A pipeline run started (fresh or resumed from a checkpoint)
    PipelineRunStarted {
        /// Run identifier (persisted in the checkpoint)
        run_id: Uuid,
        /// "incremental" or "full"
        strategy: String,
        /// Sources queued for this run, in no particular order
        sources: Vec<String>,
        /// True if this run resumed a previous checkpoint
        resumed: bool,
        /// When the run started
        timestamp: DateTime<Utc>,
    },

    /// One source's update began fetching
    SourceUpdateStarted {
        run_id: Uuid,
        source: String,
        timestamp: DateTime<Utc>,
    },

    /// Periodic progress for one source's update
    ///
    /// Emitted per processed page/batch, not per gene, to keep the
    /// broadcast channel from flooding on large populations.
    SourceUpdateProgress {
        run_id: Uuid,
        source: String,
        /// Genes processed so far (including failures)
        genes_processed: usize,
        /// Genes that failed after gene-level retries
        genes_failed: usize,
        /// Short description of the current operation
        current_operation: String,
        timestamp: DateTime<Utc>,
    },

    /// One source's update finished successfully
    SourceUpdateCompleted {
        run_id: Uuid,
        source: String,
        genes_updated: usize,
        genes_failed: usize,
        /// Stale records deleted before repopulation (full mode only)
        records_deleted: usize,
        timestamp: DateTime<Utc>,
    },

    /// One source's update failed (circuit open or retries exhausted);
    /// the pipeline continues with the remaining sources.
    SourceUpdateFailed {
        run_id: Uuid,
        source: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// The whole-population aggregate recompute started (once per run)
    AggregateRecomputeStarted {
        run_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A pipeline run finished; the checkpoint has been cleared
    PipelineRunCompleted {
        run_id: Uuid,
        sources_succeeded: usize,
        sources_failed: usize,
        duration_seconds: u64,
        timestamp: DateTime<Utc>,
    },

    /// A pipeline run was cancelled between sources; checkpoint retained
    PipelineRunCancelled {
        run_id: Uuid,
        sources_completed: usize,
        timestamp: DateTime<Utc>,
    },

    /// A percentile cache refresh completed for one score field
    PercentilesRefreshed {
        score_field: String,
        population: usize,
        timestamp: DateTime<Utc>,
    },
}

impl AnnotEvent {
    /// Event type name used as the SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            AnnotEvent::PipelineRunStarted { .. } => "PipelineRunStarted",
            AnnotEvent::SourceUpdateStarted { .. } => "SourceUpdateStarted",
            AnnotEvent::SourceUpdateProgress { .. } => "SourceUpdateProgress",
            AnnotEvent::SourceUpdateCompleted { .. } => "SourceUpdateCompleted",
            AnnotEvent::SourceUpdateFailed { .. } => "SourceUpdateFailed",
            AnnotEvent::AggregateRecomputeStarted { .. } => "AggregateRecomputeStarted",
            AnnotEvent::PipelineRunCompleted { .. } => "PipelineRunCompleted",
            AnnotEvent::PipelineRunCancelled { .. } => "PipelineRunCancelled",
            AnnotEvent::PercentilesRefreshed { .. } => "PercentilesRefreshed",
        }
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AnnotEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<AnnotEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: AnnotEvent,
    ) -> Result<usize, broadcast::error::SendError<AnnotEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Progress updates are non-critical; it is acceptable if no component
    /// is currently listening.
    pub fn emit_lossy(&self, event: AnnotEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_delivers_to_subscriber() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit_lossy(AnnotEvent::PercentilesRefreshed {
            score_field: "interaction_score".to_string(),
            population: 600,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event {
            AnnotEvent::PercentilesRefreshed { score_field, population, .. } => {
                assert_eq!(score_field, "interaction_score");
                assert_eq!(population, 600);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_emit_lossy_without_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.emit_lossy(AnnotEvent::AggregateRecomputeStarted {
            run_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_type_round_trip_serialization() {
        let event = AnnotEvent::SourceUpdateFailed {
            run_id: Uuid::new_v4(),
            source: "clinvar".to_string(),
            error: "circuit open".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"SourceUpdateFailed\""));
        let back: AnnotEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type(), "SourceUpdateFailed");
    }
}
