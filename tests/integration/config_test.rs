//! Configuration Integration Tests
//!
//! Config files on disk and engine construction from them.

use std::fs;

use knowledge_engine::{
    AnalyzerKind, AppError, ConfigService, Database, EmbeddingBackend, KnowledgeEngine,
    RecordKind,
};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Config files
// ============================================================================

#[test]
fn test_toml_file_drives_engine_construction() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("engine.toml");
    fs::write(
        &path,
        r#"
[embedding]
backend = "local"
model = "mxbai-embed-large"
endpoint_url = "http://127.0.0.1:11434"

[pipeline]
worker_count = 9
queue_capacity = 5

[contradiction]
min_confidence = 0.8
"#,
    )
    .unwrap();

    let config = ConfigService::load_from_file(&path).unwrap();
    assert_eq!(config.pipeline.worker_count, 9);
    assert_eq!(config.contradiction.min_confidence, 0.8);
    assert_eq!(config.contradiction.analyzer, AnalyzerKind::Heuristic);

    let db = Database::new(temp_dir.path().join("knowledge.db")).unwrap();
    let engine = KnowledgeEngine::open_sqlite(config, &db).unwrap();
    let provider = engine.provider().unwrap();
    assert_eq!(provider.backend(), EmbeddingBackend::Local);
    assert_eq!(provider.model(), "mxbai-embed-large");
    assert!(provider.is_local());
}

#[test]
fn test_json_config_round_trips_through_service() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("engine.json");

    let mut service = ConfigService::open(&path).unwrap();
    assert_eq!(service.get_config().embedding.backend, "disabled");

    let mut config = service.get_config().clone();
    config.search.default_limit = 25;
    config.embedding.backend = "hosted".to_string();
    config.embedding.api_key = Some("sk-test".to_string());
    service.update_config(config).unwrap();

    let reloaded = ConfigService::load_from_file(&path).unwrap();
    assert_eq!(reloaded.search.default_limit, 25);
    assert_eq!(reloaded.embedding.api_key.as_deref(), Some("sk-test"));

    let db = Database::new_in_memory().unwrap();
    let engine = KnowledgeEngine::open_sqlite(reloaded, &db).unwrap();
    assert_eq!(
        engine.provider().map(|p| p.display_name().to_string()),
        Some("OpenAI (text-embedding-3-small)".to_string())
    );
}

#[test]
fn test_invalid_file_is_rejected() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("engine.toml");
    fs::write(&path, "[search]\nmin_similarity = 7.5\n").unwrap();

    let err = ConfigService::load_from_file(&path).unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[test]
fn test_unknown_backend_is_a_construction_error() {
    let db = Database::new_in_memory().unwrap();
    let mut config = knowledge_engine::EngineConfig::default();
    config.embedding.backend = "gpu-cluster".to_string();

    let err = KnowledgeEngine::open_sqlite(config, &db).unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
}

// ============================================================================
// Live backends
// ============================================================================

#[tokio::test]
#[ignore = "requires a running Ollama server with nomic-embed-text"]
async fn test_local_backend_backfill_live() {
    let db = Database::new_in_memory().unwrap();
    let mut config = knowledge_engine::EngineConfig::default();
    config.embedding.backend = "local".to_string();

    let records = knowledge_engine::SqliteRecordStore::from_database(&db);
    records
        .add_record_with_id("l_1", RecordKind::Learning, "pin dependency versions")
        .unwrap();

    let engine = KnowledgeEngine::open_sqlite(config, &db).unwrap();
    let done = engine
        .process_pending(None, 10, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(done, 1);

    let vector = engine.get_embedding("l_1").unwrap().unwrap();
    assert_eq!(vector.len(), engine.provider().unwrap().dimension());
}
