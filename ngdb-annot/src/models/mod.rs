//! Data model types for ngdb-annot

mod checkpoint;
mod evidence;
mod gene;
mod report;

pub use checkpoint::{PipelineCheckpoint, UpdateMode};
pub use evidence::{AggregateScore, EvidenceRecord};
pub use gene::GeneRecord;
pub use report::{RunPhase, RunReport, SourceRunStatus, SourceRunSummary};
