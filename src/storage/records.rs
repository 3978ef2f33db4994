//! Reference Record Store
//!
//! SQLite implementation of the record collaborator traits: record content
//! lookup, FTS5 keyword search, and directed links. Embedders with their own
//! persistence implement the traits themselves; this store backs the
//! integration tests and small deployments.

use chrono::{DateTime, Utc};
use knowledge_engine_core::{
    CoreResult, KeywordHit, KeywordSearch, LinkDirection, LinkStore, LinkedRecord, PendingRecord,
    RecordContent, RecordKind, RecordSource,
};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::storage::database::{Database, DbPool};
use crate::utils::error::{AppError, AppResult};

// ============================================================================
// Data Types
// ============================================================================

/// A record row as stored in the reference tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    pub kind: RecordKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// SqliteRecordStore
// ============================================================================

/// Record, keyword, and link collaborator backed by the engine database.
pub struct SqliteRecordStore {
    pool: DbPool,
}

impl SqliteRecordStore {
    /// Create a store from a connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a store from a Database instance
    pub fn from_database(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    /// Insert a new record with a freshly minted, kind-prefixed id.
    pub fn add_record(&self, kind: RecordKind, content: &str) -> AppResult<StoredRecord> {
        let id = format!("{}{}", kind.id_prefix(), uuid::Uuid::new_v4().simple());
        self.add_record_with_id(&id, kind, content)
    }

    /// Insert a record under a caller-chosen id.
    pub fn add_record_with_id(
        &self,
        id: &str,
        kind: RecordKind,
        content: &str,
    ) -> AppResult<StoredRecord> {
        if content.trim().is_empty() {
            return Err(AppError::validation("record content must not be empty"));
        }

        let created_at = Utc::now();
        let conn = self.get_connection()?;
        conn.execute(
            "INSERT INTO records (id, kind, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, kind.as_str(), content, created_at.to_rfc3339()],
        )?;

        Ok(StoredRecord {
            id: id.to_string(),
            kind,
            content: content.to_string(),
            created_at,
        })
    }

    /// Get a record by id, whatever its kind.
    pub fn get_record(&self, id: &str) -> AppResult<Option<StoredRecord>> {
        let conn = self.get_connection()?;
        let result = conn.query_row(
            "SELECT id, kind, content, created_at FROM records WHERE id = ?1",
            params![id],
            row_to_stored_record,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(AppError::Sqlite(e)),
        }
    }

    /// Replace a record's content. The FTS index follows via trigger.
    pub fn update_content(&self, id: &str, content: &str) -> AppResult<()> {
        let conn = self.get_connection()?;
        let changed = conn.execute(
            "UPDATE records SET content = ?2 WHERE id = ?1",
            params![id, content],
        )?;
        if changed == 0 {
            return Err(AppError::not_found(format!("record {}", id)));
        }
        Ok(())
    }

    /// Delete a record and every link touching it.
    ///
    /// The record's embedding lives in the embedding store and is removed
    /// separately.
    pub fn delete_record(&self, id: &str) -> AppResult<bool> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM record_links WHERE source_id = ?1 OR target_id = ?1",
            params![id],
        )?;
        let deleted = tx.execute("DELETE FROM records WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    /// Count records, optionally restricted to one kind.
    pub fn count_records(&self, kind: Option<RecordKind>) -> AppResult<usize> {
        let conn = self.get_connection()?;
        let count: i64 = match kind {
            Some(kind) => conn.query_row(
                "SELECT COUNT(*) FROM records WHERE kind = ?1",
                params![kind.as_str()],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?,
        };
        Ok(count as usize)
    }

    fn query_content(&self, id: &str, kind: RecordKind) -> AppResult<Option<RecordContent>> {
        let conn = self.get_connection()?;
        let result = conn.query_row(
            "SELECT content, created_at FROM records WHERE id = ?1 AND kind = ?2",
            params![id, kind.as_str()],
            |row| {
                Ok(RecordContent {
                    content: row.get(0)?,
                    created_at: parse_timestamp(row, 1)?,
                })
            },
        );

        match result {
            Ok(content) => Ok(Some(content)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(AppError::Sqlite(e)),
        }
    }

    fn query_without_embeddings(
        &self,
        kind: RecordKind,
        limit: usize,
    ) -> AppResult<Vec<PendingRecord>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT r.id, r.content
             FROM records r
             LEFT JOIN record_embeddings e ON e.record_id = r.id
             WHERE r.kind = ?1 AND e.record_id IS NULL
             ORDER BY r.created_at ASC, r.id ASC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![kind.as_str(), limit as i64], |row| {
            Ok(PendingRecord {
                id: row.get(0)?,
                content: row.get(1)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    fn query_keyword(&self, kind: RecordKind, query: &str, limit: usize) -> AppResult<Vec<KeywordHit>> {
        let Some(match_expr) = build_match_expression(query) else {
            return Ok(Vec::new());
        };

        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT r.id, r.kind, r.content, r.created_at, bm25(records_fts) AS rank
             FROM records_fts
             JOIN records r ON r.rowid = records_fts.rowid
             WHERE records_fts MATCH ?1 AND r.kind = ?2
             ORDER BY rank ASC, r.id ASC
             LIMIT ?3",
        )?;

        let rows = stmt.query_map(params![match_expr, kind.as_str(), limit as i64], |row| {
            let rank: f64 = row.get(4)?;
            Ok(KeywordHit {
                id: row.get(0)?,
                kind: parse_kind(row, 1)?,
                content: row.get(2)?,
                created_at: parse_timestamp(row, 3)?,
                // bm25() is lower-is-better; flip so higher means a better match.
                score: -rank,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    fn insert_link(
        &self,
        source_id: &str,
        source_kind: RecordKind,
        target_id: &str,
        target_kind: RecordKind,
        relation: &str,
    ) -> AppResult<()> {
        let conn = self.get_connection()?;
        conn.execute(
            "INSERT OR IGNORE INTO record_links
                (source_id, source_kind, target_id, target_kind, relation, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                source_id,
                source_kind.as_str(),
                target_id,
                target_kind.as_str(),
                relation,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn query_linked(&self, id: &str, relation: &str) -> AppResult<Vec<LinkedRecord>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT target_id, target_kind, relation, 'outgoing'
             FROM record_links WHERE source_id = ?1 AND relation = ?2
             UNION ALL
             SELECT source_id, source_kind, relation, 'incoming'
             FROM record_links WHERE target_id = ?1 AND relation = ?2",
        )?;

        let rows = stmt.query_map(params![id, relation], |row| {
            let direction: String = row.get(3)?;
            Ok(LinkedRecord {
                id: row.get(0)?,
                kind: parse_kind(row, 1)?,
                relation: row.get(2)?,
                direction: if direction == "outgoing" {
                    LinkDirection::Outgoing
                } else {
                    LinkDirection::Incoming
                },
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
    }

    fn get_connection(
        &self,
    ) -> AppResult<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))
    }
}

impl RecordSource for SqliteRecordStore {
    fn get_record_content(&self, id: &str, kind: RecordKind) -> CoreResult<Option<RecordContent>> {
        self.query_content(id, kind).map_err(Into::into)
    }

    fn records_without_embeddings(
        &self,
        kind: RecordKind,
        limit: usize,
    ) -> CoreResult<Vec<PendingRecord>> {
        self.query_without_embeddings(kind, limit)
            .map_err(Into::into)
    }
}

impl KeywordSearch for SqliteRecordStore {
    fn search(&self, kind: RecordKind, query: &str, limit: usize) -> CoreResult<Vec<KeywordHit>> {
        self.query_keyword(kind, query, limit).map_err(Into::into)
    }
}

impl LinkStore for SqliteRecordStore {
    fn add_link(
        &self,
        source_id: &str,
        source_kind: RecordKind,
        target_id: &str,
        target_kind: RecordKind,
        relation: &str,
    ) -> CoreResult<()> {
        self.insert_link(source_id, source_kind, target_id, target_kind, relation)
            .map_err(Into::into)
    }

    fn linked_records(&self, id: &str, relation: &str) -> CoreResult<Vec<LinkedRecord>> {
        self.query_linked(id, relation).map_err(Into::into)
    }
}

impl std::fmt::Debug for SqliteRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRecordStore").finish()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Turn free text into an FTS5 expression: every word quoted, OR-joined.
///
/// Quoting keeps FTS5 operators and punctuation in user text from being
/// interpreted as query syntax. Returns `None` when no searchable word remains.
fn build_match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.to_lowercase()))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

fn row_to_stored_record(row: &rusqlite::Row) -> rusqlite::Result<StoredRecord> {
    Ok(StoredRecord {
        id: row.get(0)?,
        kind: parse_kind(row, 1)?,
        content: row.get(2)?,
        created_at: parse_timestamp(row, 3)?,
    })
}

fn parse_kind(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<RecordKind> {
    let raw: String = row.get(idx)?;
    raw.parse::<RecordKind>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_timestamp(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

// ============================================================================
// Tests
// ============================================================================
