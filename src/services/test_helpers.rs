//! Shared test utilities for service unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::services::embedding::provider::{
    EmbeddingBackend, EmbeddingError, EmbeddingProvider, EmbeddingResult,
};
use crate::services::embedding::store::EmbeddingStore;
use crate::storage::database::Database;
use crate::storage::records::SqliteRecordStore;

/// Provider that answers from a fixed text-to-vector table.
///
/// Unknown text embeds to `fallback`. With `fail` set every call errors.
pub(crate) struct TableProvider {
    table: HashMap<String, Vec<f32>>,
    fallback: Vec<f32>,
    fail: bool,
    calls: AtomicUsize,
}

impl TableProvider {
    pub(crate) fn new(entries: &[(&str, Vec<f32>)], fallback: Vec<f32>) -> Self {
        Self {
            table: entries
                .iter()
                .map(|(text, v)| (text.to_string(), v.clone()))
                .collect(),
            fallback,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(&[], Vec::new())
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for TableProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EmbeddingError::ProviderUnavailable {
                message: "test provider is down".to_string(),
            });
        }
        Ok(self
            .table
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone()))
    }

    fn model(&self) -> &str {
        "table-v1"
    }

    fn dimension(&self) -> usize {
        self.fallback.len()
    }

    async fn health_check(&self) -> EmbeddingResult<()> {
        Ok(())
    }

    fn is_local(&self) -> bool {
        true
    }

    fn backend(&self) -> EmbeddingBackend {
        EmbeddingBackend::Local
    }

    fn display_name(&self) -> &str {
        "Table (table-v1)"
    }
}

/// In-memory database with both stores attached.
pub(crate) struct StoreFixture {
    pub db: Database,
    pub embeddings: Arc<EmbeddingStore>,
    pub records: Arc<SqliteRecordStore>,
}

pub(crate) fn store_fixture() -> StoreFixture {
    let db = Database::new_in_memory().unwrap();
    StoreFixture {
        embeddings: Arc::new(EmbeddingStore::from_database(&db)),
        records: Arc::new(SqliteRecordStore::from_database(&db)),
        db,
    }
}
