//! Data Models
//!
//! Configuration structures shared across the engine.

pub mod config;

pub use config::*;
