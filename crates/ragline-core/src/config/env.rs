use super::{Config, StepStoreKind, VectorBackend};

fn parse_backend(v: &str) -> Option<VectorBackend> {
    serde_json::from_value(serde_json::Value::String(v.to_ascii_lowercase())).ok()
}

fn parse_step_store(v: &str) -> Option<StepStoreKind> {
    serde_json::from_value(serde_json::Value::String(v.to_ascii_lowercase())).ok()
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_llm();
        self.apply_env_overrides_storage();
        self.apply_env_overrides_serving();
    }

    fn apply_env_overrides_llm(&mut self) {
        if let Ok(v) = std::env::var("RAGLINE_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("RAGLINE_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("RAGLINE_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = std::env::var("RAGLINE_LLM_EMBEDDING_DIM") {
            if let Ok(dim) = v.parse::<usize>() {
                self.llm.embedding_dim = dim;
            } else {
                tracing::warn!("ignoring invalid RAGLINE_LLM_EMBEDDING_DIM value: {v}");
            }
        }
        if let Ok(v) = std::env::var("RAGLINE_CHUNK_SIZE") {
            if let Ok(size) = v.parse::<usize>() {
                self.chunking.chunk_size = size;
            } else {
                tracing::warn!("ignoring invalid RAGLINE_CHUNK_SIZE value: {v}");
            }
        }
        if let Ok(v) = std::env::var("RAGLINE_CHUNK_OVERLAP") {
            if let Ok(overlap) = v.parse::<usize>() {
                self.chunking.chunk_overlap = overlap;
            } else {
                tracing::warn!("ignoring invalid RAGLINE_CHUNK_OVERLAP value: {v}");
            }
        }
    }

    fn apply_env_overrides_storage(&mut self) {
        if let Ok(v) = std::env::var("RAGLINE_VECTOR_BACKEND") {
            if let Some(backend) = parse_backend(&v) {
                self.vector_store.backend = backend;
            } else {
                tracing::warn!("ignoring invalid RAGLINE_VECTOR_BACKEND value: {v}");
            }
        }
        if let Ok(v) = std::env::var("RAGLINE_QDRANT_URL") {
            self.vector_store.url = v;
        }
        if let Ok(v) = std::env::var("RAGLINE_COLLECTION") {
            self.vector_store.collection = v;
        }
        if let Ok(v) = std::env::var("RAGLINE_STEP_STORE") {
            if let Some(kind) = parse_step_store(&v) {
                self.steps.store = kind;
            } else {
                tracing::warn!("ignoring invalid RAGLINE_STEP_STORE value: {v}");
            }
        }
        if let Ok(v) = std::env::var("RAGLINE_SQLITE_PATH") {
            self.steps.sqlite_path = v;
        }
        if let Ok(v) = std::env::var("RAGLINE_STEP_MAX_ATTEMPTS") {
            if let Ok(n) = v.parse::<u32>() {
                self.steps.max_attempts = n;
            } else {
                tracing::warn!("ignoring invalid RAGLINE_STEP_MAX_ATTEMPTS value: {v}");
            }
        }
    }

    fn apply_env_overrides_serving(&mut self) {
        if let Ok(v) = std::env::var("RAGLINE_GATEWAY_BIND") {
            self.gateway.bind = v;
        }
        if let Ok(v) = std::env::var("RAGLINE_GATEWAY_PORT") {
            if let Ok(port) = v.parse::<u16>() {
                self.gateway.port = port;
            } else {
                tracing::warn!("ignoring invalid RAGLINE_GATEWAY_PORT value: {v}");
            }
        }
        if let Ok(v) = std::env::var("RAGLINE_DEFAULT_TOP_K") {
            if let Ok(k) = v.parse::<usize>() {
                self.query.default_top_k = k;
            } else {
                tracing::warn!("ignoring invalid RAGLINE_DEFAULT_TOP_K value: {v}");
            }
        }
    }
}
