//! Services
//!
//! Business logic behind the engine facade: embedding, retrieval, and
//! contradiction detection.

pub mod contradiction;
pub mod embedding;
pub mod search;

#[cfg(test)]
pub(crate) mod test_helpers;
