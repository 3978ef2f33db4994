//! Storage Layer
//!
//! Handles persistence: the SQLite database, the reference record store,
//! and the configuration file.

pub mod config;
pub mod database;
pub mod records;

pub use config::*;
pub use database::*;
pub use records::*;
