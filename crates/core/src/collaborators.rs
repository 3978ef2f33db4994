//! Collaborator Traits
//!
//! The engine never owns knowledge records. It reaches the record store,
//! the keyword index, and the link table through these traits so any
//! persistence layer can host it. All methods are synchronous: the reference
//! implementation is SQLite-backed and callers run them inline from tokio
//! tasks the same way the embedding store does.

use crate::error::CoreResult;
use crate::records::{KeywordHit, LinkedRecord, PendingRecord, RecordContent, RecordKind};

/// Read access to record contents.
pub trait RecordSource: Send + Sync {
    /// Look up a record's content. Returns `Ok(None)` if it does not exist.
    fn get_record_content(&self, id: &str, kind: RecordKind) -> CoreResult<Option<RecordContent>>;

    /// Records of `kind` that have no stored embedding, at most `limit`.
    fn records_without_embeddings(
        &self,
        kind: RecordKind,
        limit: usize,
    ) -> CoreResult<Vec<PendingRecord>>;
}

/// Ranked full-text search, one record kind at a time.
pub trait KeywordSearch: Send + Sync {
    fn search(&self, kind: RecordKind, query: &str, limit: usize) -> CoreResult<Vec<KeywordHit>>;
}

/// Directed relationships between records.
pub trait LinkStore: Send + Sync {
    /// Create a directed link. Creating an existing link again is not an error.
    fn add_link(
        &self,
        source_id: &str,
        source_kind: RecordKind,
        target_id: &str,
        target_kind: RecordKind,
        relation: &str,
    ) -> CoreResult<()>;

    /// Records linked to `id` by `relation`, in either direction.
    fn linked_records(&self, id: &str, relation: &str) -> CoreResult<Vec<LinkedRecord>>;
}
