//! Knowledge Engine Core
//!
//! Foundational types for the knowledge engine workspace. This crate has zero
//! dependencies on storage, network, or model code.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `records` - Record kinds and the value types collaborators exchange
//! - `collaborators` - Traits for record lookup, keyword search, and links
//!
//! ## Design Principles
//!
//! 1. **Minimal dependencies** - serde, thiserror, and chrono only
//! 2. **Trait-based seams** - the engine is hosted by any store that implements the collaborator traits
//! 3. **Unidirectional dependency** - this crate depends on nothing else in the workspace

pub mod collaborators;
pub mod error;
pub mod records;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Records ────────────────────────────────────────────────────────────
pub use records::{
    KeywordHit, LinkDirection, LinkedRecord, PendingRecord, RecordContent, RecordKind,
    RELATION_CONTRADICTS,
};

// ── Collaborators ──────────────────────────────────────────────────────
pub use collaborators::{KeywordSearch, LinkStore, RecordSource};
