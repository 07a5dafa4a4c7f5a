use std::collections::HashMap;
use std::future::Future;
use std::io::Write;
use std::pin::Pin;

use serial_test::serial;

use super::*;
use crate::vault::VaultProvider;

const ENV_KEYS: [&str; 17] = [
    "RAGLINE_LLM_BASE_URL",
    "RAGLINE_LLM_MODEL",
    "RAGLINE_LLM_EMBEDDING_MODEL",
    "RAGLINE_LLM_EMBEDDING_DIM",
    "RAGLINE_VECTOR_BACKEND",
    "RAGLINE_QDRANT_URL",
    "RAGLINE_COLLECTION",
    "RAGLINE_CHUNK_SIZE",
    "RAGLINE_CHUNK_OVERLAP",
    "RAGLINE_STEP_STORE",
    "RAGLINE_SQLITE_PATH",
    "RAGLINE_STEP_MAX_ATTEMPTS",
    "RAGLINE_GATEWAY_BIND",
    "RAGLINE_GATEWAY_PORT",
    "RAGLINE_DEFAULT_TOP_K",
    "RAGLINE_OPENAI_API_KEY",
    "OPENAI_API_KEY",
];

fn clear_env() {
    for key in ENV_KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

struct MapVault(HashMap<&'static str, &'static str>);

impl VaultProvider for MapVault {
    fn get_secret(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<String>>> + Send + '_>> {
        let val = self.0.get(key).map(|v| (*v).to_owned());
        Box::pin(async move { Ok(val) })
    }
}

fn write_config(body: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(body.as_bytes()).unwrap();
    file
}

#[test]
fn defaults_match_documented_values() {
    let config = Config::default();
    assert_eq!(config.llm.base_url, "https://api.openai.com/v1");
    assert_eq!(config.llm.model, "gpt-4o-mini");
    assert_eq!(config.llm.embedding_model, "text-embedding-3-small");
    assert_eq!(config.llm.embedding_dim, 1536);
    assert_eq!(config.llm.embed_batch_size, 256);
    assert_eq!(config.llm.max_tokens, 1024);
    assert!((config.llm.temperature - 0.2).abs() < f32::EPSILON);
    assert_eq!(config.vector_store.backend, VectorBackend::Qdrant);
    assert_eq!(config.vector_store.url, "http://localhost:6334");
    assert_eq!(config.vector_store.collection, "ragline_chunks");
    assert_eq!(config.chunking.chunk_size, 1000);
    assert_eq!(config.chunking.chunk_overlap, 200);
    assert!(config.chunking.sentence_aware);
    assert!(config.ingestion.prune_stale_chunks);
    assert_eq!(config.ingestion.max_file_size, 52_428_800);
    assert_eq!(config.query.default_top_k, 5);
    assert_eq!(config.steps.store, StepStoreKind::Sqlite);
    assert_eq!(config.steps.max_attempts, 3);
    assert_eq!(config.steps.retention_secs, 86_400);
    assert_eq!(config.gateway.port, 8090);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn load_missing_file_uses_defaults() {
    clear_env();
    let config = Config::load(std::path::Path::new("/nonexistent/ragline.toml")).unwrap();
    assert_eq!(config.vector_store.collection, "ragline_chunks");
    assert!(config.secrets.openai_api_key.is_none());
}

#[test]
#[serial]
fn load_partial_file_fills_remaining_defaults() {
    clear_env();
    let file = write_config(
        r#"
[vector_store]
backend = "memory"
collection = "papers"

[chunking]
chunk_size = 400
chunk_overlap = 50
sentence_aware = false

[steps]
store = "memory"
"#,
    );
    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.vector_store.backend, VectorBackend::Memory);
    assert_eq!(config.vector_store.collection, "papers");
    assert_eq!(config.vector_store.url, "http://localhost:6334");
    assert_eq!(config.chunking.chunk_size, 400);
    assert!(!config.chunking.sentence_aware);
    assert_eq!(config.steps.store, StepStoreKind::Memory);
    assert_eq!(config.steps.sqlite_path, "ragline.db");
    assert_eq!(config.llm.model, "gpt-4o-mini");
}

#[test]
#[serial]
fn load_rejects_malformed_toml() {
    clear_env();
    let file = write_config("[chunking\nchunk_size = 3");
    assert!(Config::load(file.path()).is_err());
}

#[test]
#[serial]
fn load_rejects_invalid_overlap() {
    clear_env();
    let file = write_config("[chunking]\nchunk_size = 100\nchunk_overlap = 100\n");
    let err = Config::load(file.path()).unwrap_err();
    assert!(err.to_string().contains("chunk_overlap"), "{err}");
}

#[test]
#[serial]
fn env_overrides_take_precedence_over_file() {
    clear_env();
    let file = write_config("[vector_store]\ncollection = \"from_file\"\n");
    unsafe {
        std::env::set_var("RAGLINE_COLLECTION", "from_env");
        std::env::set_var("RAGLINE_VECTOR_BACKEND", "Memory");
        std::env::set_var("RAGLINE_CHUNK_SIZE", "500");
        std::env::set_var("RAGLINE_CHUNK_OVERLAP", "100");
        std::env::set_var("RAGLINE_STEP_STORE", "memory");
        std::env::set_var("RAGLINE_STEP_MAX_ATTEMPTS", "7");
        std::env::set_var("RAGLINE_GATEWAY_PORT", "9999");
        std::env::set_var("RAGLINE_DEFAULT_TOP_K", "3");
        std::env::set_var("RAGLINE_LLM_EMBEDDING_DIM", "768");
        std::env::set_var("RAGLINE_LLM_MODEL", "gpt-4o");
    }
    let config = Config::load(file.path()).unwrap();
    clear_env();

    assert_eq!(config.vector_store.collection, "from_env");
    assert_eq!(config.vector_store.backend, VectorBackend::Memory);
    assert_eq!(config.chunking.chunk_size, 500);
    assert_eq!(config.chunking.chunk_overlap, 100);
    assert_eq!(config.steps.store, StepStoreKind::Memory);
    assert_eq!(config.steps.max_attempts, 7);
    assert_eq!(config.gateway.port, 9999);
    assert_eq!(config.query.default_top_k, 3);
    assert_eq!(config.llm.embedding_dim, 768);
    assert_eq!(config.llm.model, "gpt-4o");
}

#[test]
#[serial]
fn unparseable_env_values_are_ignored() {
    clear_env();
    unsafe {
        std::env::set_var("RAGLINE_GATEWAY_PORT", "not-a-port");
        std::env::set_var("RAGLINE_VECTOR_BACKEND", "pinecone");
        std::env::set_var("RAGLINE_DEFAULT_TOP_K", "-1");
    }
    let config = Config::load(std::path::Path::new("/nonexistent/ragline.toml")).unwrap();
    clear_env();

    assert_eq!(config.gateway.port, 8090);
    assert_eq!(config.vector_store.backend, VectorBackend::Qdrant);
    assert_eq!(config.query.default_top_k, 5);
}

#[test]
fn validate_rejects_out_of_range_values() {
    let mut config = Config::default();
    config.chunking.chunk_overlap = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.llm.embedding_dim = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.query.default_top_k = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.steps.max_attempts = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.llm.embed_batch_size = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.llm.temperature = 2.5;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.steps.purge_interval_secs = 0;
    assert!(config.validate().is_err());
}

#[test]
fn validate_checks_gateway_bind_address() {
    for bad in ["localhost", "0.0.0.0:80", "", "300.1.1.1"] {
        let mut config = Config::default();
        config.gateway.bind = bad.into();
        let err = config.validate().unwrap_err();
        assert!(
            matches!(&err, PipelineError::InvalidConfig(msg) if msg.contains("gateway.bind")),
            "{bad:?} gave {err:?}"
        );
    }
    for good in ["0.0.0.0", "127.0.0.1", "::1"] {
        let mut config = Config::default();
        config.gateway.bind = good.into();
        assert!(config.validate().is_ok(), "{good:?} should be accepted");
    }
}

#[test]
#[serial]
fn load_rejects_unparseable_gateway_bind() {
    clear_env();
    let file = write_config("[gateway]\nbind = \"not an address\"\n");
    let err = Config::load(file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("gateway.bind"));
}

#[test]
fn splitter_and_retry_policy_follow_config() {
    let mut config = Config::default();
    config.chunking.chunk_size = 300;
    config.chunking.chunk_overlap = 30;
    config.steps.base_backoff_ms = 5;
    config.steps.step_timeout_secs = 9;
    config.steps.retention_secs = 60;

    let splitter = config.chunking.splitter_config();
    assert_eq!(splitter.chunk_size, 300);
    assert_eq!(splitter.chunk_overlap, 30);

    let policy = config.steps.retry_policy();
    assert_eq!(policy.base_backoff, std::time::Duration::from_millis(5));
    assert_eq!(policy.step_timeout, std::time::Duration::from_secs(9));
    assert_eq!(config.steps.retention(), std::time::Duration::from_secs(60));
    assert_eq!(config.steps.purge_interval(), std::time::Duration::from_secs(3600));
}

#[tokio::test]
async fn resolve_secrets_prefers_ragline_key() {
    let vault = MapVault(HashMap::from([
        ("RAGLINE_OPENAI_API_KEY", "sk-ragline"),
        ("OPENAI_API_KEY", "sk-generic"),
    ]));
    let mut config = Config::default();
    config.resolve_secrets(&vault).await.unwrap();
    assert_eq!(
        config.secrets.openai_api_key.as_ref().map(|s| s.expose()),
        Some("sk-ragline")
    );
}

#[tokio::test]
async fn resolve_secrets_falls_back_to_generic_key() {
    let vault = MapVault(HashMap::from([
        ("RAGLINE_OPENAI_API_KEY", "  "),
        ("OPENAI_API_KEY", "sk-generic"),
    ]));
    let mut config = Config::default();
    config.resolve_secrets(&vault).await.unwrap();
    assert_eq!(
        config.secrets.openai_api_key.as_ref().map(|s| s.expose()),
        Some("sk-generic")
    );
}

#[test]
fn secrets_are_never_serialized() {
    let mut config = Config::default();
    config.secrets.openai_api_key = Some(crate::vault::Secret::new("sk-hidden"));
    let toml = toml::to_string(&config).unwrap();
    assert!(!toml.contains("sk-hidden"));
    assert!(toml.contains("[chunking]"));
}
