//! # NGDB Common Library
//!
//! Shared code for the nephrology gene database services including:
//! - Common error types
//! - Configuration file loading
//! - Event types (AnnotEvent enum) and the broadcast EventBus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
