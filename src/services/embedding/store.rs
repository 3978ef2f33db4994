//! Embedding Store
//!
//! Persists one vector per record in the `record_embeddings` table. Vectors
//! are stored as little-endian f32 BLOBs next to the model name and
//! dimension that produced them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use knowledge_engine_core::RecordKind;
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::storage::database::{Database, DbPool};
use crate::utils::error::{AppError, AppResult};

// ============================================================================
// Data Types
// ============================================================================

/// A stored embedding together with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub record_id: String,
    pub record_kind: RecordKind,
    pub vector: Vec<f32>,
    pub model_name: String,
    pub created_at: DateTime<Utc>,
}

/// Number of vectors produced by one model at one dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub model: String,
    pub dimension: usize,
    pub count: usize,
}

/// Store-wide embedding counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingStats {
    pub total: usize,
    pub by_kind: HashMap<RecordKind, usize>,
    pub models: Vec<ModelUsage>,
}

// ============================================================================
// EmbeddingStore
// ============================================================================

/// SQLite-backed vector store keyed by record id.
pub struct EmbeddingStore {
    pool: DbPool,
}

impl EmbeddingStore {
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

    /// Insert or replace the vector for `record_id`.
    ///
    /// A record holds at most one vector; storing again (even from another
    /// model) overwrites the previous one.
    pub fn store_embedding(
        &self,
        record_id: &str,
        kind: RecordKind,
        vector: &[f32],
        model_name: &str,
    ) -> AppResult<()> {
        let bytes = embedding_to_bytes(vector);
        let conn = self.get_connection()?;
        conn.execute(
            "INSERT INTO record_embeddings
                (record_id, record_kind, embedding, model_name, dimension, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(record_id) DO UPDATE SET
                 record_kind = excluded.record_kind,
                 embedding = excluded.embedding,
                 model_name = excluded.model_name,
                 dimension = excluded.dimension,
                 created_at = excluded.created_at",
            params![
                record_id,
                kind.as_str(),
                bytes,
                model_name,
                vector.len() as i64,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Vector for `record_id`, or `None` when the record has none.
    pub fn get_embedding(&self, record_id: &str) -> AppResult<Option<Vec<f32>>> {
        let conn = self.get_connection()?;
        let result = conn.query_row(
            "SELECT embedding FROM record_embeddings WHERE record_id = ?1",
            params![record_id],
            |row| row.get::<_, Vec<u8>>(0),
        );

        match result {
            Ok(bytes) => Ok(Some(bytes_to_embedding(&bytes))),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(AppError::Sqlite(e)),
        }
    }

    /// Full row for `record_id`, including model and timestamp.
    pub fn get_embedding_record(&self, record_id: &str) -> AppResult<Option<EmbeddingRecord>> {
        let conn = self.get_connection()?;
        let result = conn.query_row(
            "SELECT record_id, record_kind, embedding, model_name, created_at
             FROM record_embeddings WHERE record_id = ?1",
            params![record_id],
            |row| {
                let kind: String = row.get(1)?;
                let bytes: Vec<u8> = row.get(2)?;
                let created_at: String = row.get(4)?;
                Ok((row.get::<_, String>(0)?, kind, bytes, row.get::<_, String>(3)?, created_at))
            },
        );

        let (record_id, kind, bytes, model_name, created_at) = match result {
            Ok(row) => row,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(AppError::Sqlite(e)),
        };

        let record_kind: RecordKind = kind.parse()?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| AppError::database(format!("invalid embedding timestamp: {}", e)))?;

        Ok(Some(EmbeddingRecord {
            record_id,
            record_kind,
            vector: bytes_to_embedding(&bytes),
            model_name,
            created_at,
        }))
    }

    /// Remove the vector for `record_id`. Returns whether a row was deleted.
    pub fn delete_embedding(&self, record_id: &str) -> AppResult<bool> {
        let conn = self.get_connection()?;
        let deleted = conn.execute(
            "DELETE FROM record_embeddings WHERE record_id = ?1",
            params![record_id],
        )?;
        Ok(deleted > 0)
    }

    /// Every stored vector of `kind`, keyed by record id.
    pub fn get_all_embeddings(&self, kind: RecordKind) -> AppResult<HashMap<String, Vec<f32>>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT record_id, embedding FROM record_embeddings WHERE record_kind = ?1",
        )?;

        let rows = stmt.query_map(params![kind.as_str()], |row| {
            let id: String = row.get(0)?;
            let bytes: Vec<u8> = row.get(1)?;
            Ok((id, bytes_to_embedding(&bytes)))
        })?;

        rows.collect::<Result<HashMap<_, _>, _>>()
            .map_err(AppError::from)
    }

    pub fn has_embedding(&self, record_id: &str) -> AppResult<bool> {
        let conn = self.get_connection()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM record_embeddings WHERE record_id = ?1)",
            params![record_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Count stored vectors, optionally restricted to one kind.
    pub fn count_embeddings(&self, kind: Option<RecordKind>) -> AppResult<usize> {
        let conn = self.get_connection()?;
        let count: i64 = match kind {
            Some(kind) => conn.query_row(
                "SELECT COUNT(*) FROM record_embeddings WHERE record_kind = ?1",
                params![kind.as_str()],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM record_embeddings", [], |row| {
                row.get(0)
            })?,
        };
        Ok(count as usize)
    }

    /// Per-kind counts and the `(model, dimension)` pairs in use.
    pub fn embedding_stats(&self) -> AppResult<EmbeddingStats> {
        let conn = self.get_connection()?;

        let mut by_kind = HashMap::new();
        let mut total = 0usize;
        {
            let mut stmt = conn.prepare(
                "SELECT record_kind, COUNT(*) FROM record_embeddings GROUP BY record_kind",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (kind, count) = row?;
                let count = count as usize;
                total += count;
                by_kind.insert(kind.parse::<RecordKind>()?, count);
            }
        }

        let mut stmt = conn.prepare(
            "SELECT model_name, dimension, COUNT(*)
             FROM record_embeddings
             GROUP BY model_name, dimension
             ORDER BY model_name ASC, dimension ASC",
        )?;
        let models = stmt
            .query_map([], |row| {
                Ok(ModelUsage {
                    model: row.get(0)?,
                    dimension: row.get::<_, i64>(1)? as usize,
                    count: row.get::<_, i64>(2)? as usize,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(EmbeddingStats {
            total,
            by_kind,
            models,
        })
    }

    fn get_connection(
        &self,
    ) -> AppResult<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))
    }
}

impl std::fmt::Debug for EmbeddingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingStore").finish()
    }
}

// ============================================================================
// Codec
// ============================================================================

/// Serialize an f32 vector to bytes (little-endian) for BLOB storage.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for val in embedding {
        bytes.extend_from_slice(&val.to_le_bytes());
    }
    bytes
}

/// Deserialize little-endian bytes back to an f32 vector.
///
/// A length that is not a multiple of 4 is malformed and decodes to an
/// empty vector.
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    if bytes.len() % 4 != 0 {
        return Vec::new();
    }
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
