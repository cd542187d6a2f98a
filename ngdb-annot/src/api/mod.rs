//! HTTP API handlers for ngdb-annot

pub mod health;
pub mod percentiles;
pub mod pipeline;
pub mod scores;
pub mod settings;
pub mod sse;

pub use health::health_routes;
pub use percentiles::percentile_routes;
pub use pipeline::pipeline_routes;
pub use scores::score_routes;
pub use settings::settings_routes;
pub use sse::event_stream;
