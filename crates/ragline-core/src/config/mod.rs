mod env;
mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use std::net::IpAddr;
use std::path::Path;

use anyhow::Context;

use crate::pipeline::PipelineError;
use crate::vault::{Secret, VaultProvider};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist. Secrets are not read
    /// here; see [`Config::resolve_secrets`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or if the
    /// resulting configuration is invalid.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Resolve the provider API key through the vault.
    ///
    /// `RAGLINE_OPENAI_API_KEY` wins over `OPENAI_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault backend fails.
    pub async fn resolve_secrets(&mut self, vault: &dyn VaultProvider) -> anyhow::Result<()> {
        for key in ["RAGLINE_OPENAI_API_KEY", "OPENAI_API_KEY"] {
            if let Some(val) = vault.get_secret(key).await?
                && !val.trim().is_empty()
            {
                self.secrets.openai_api_key = Some(Secret::new(val));
                break;
            }
        }
        Ok(())
    }

    /// Check cross-field constraints that serde defaults cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first violated constraint.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));

        let chunking = &self.chunking;
        if chunking.chunk_overlap == 0 || chunking.chunk_overlap >= chunking.chunk_size {
            return invalid(format!(
                "chunking.chunk_overlap must be in 1..chunk_size (got overlap {} for size {})",
                chunking.chunk_overlap, chunking.chunk_size
            ));
        }
        if self.llm.embedding_dim == 0 {
            return invalid("llm.embedding_dim must be greater than 0".into());
        }
        if self.llm.embed_batch_size == 0 {
            return invalid("llm.embed_batch_size must be at least 1".into());
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return invalid(format!(
                "llm.temperature must be within 0.0..=2.0 (got {})",
                self.llm.temperature
            ));
        }
        if self.query.default_top_k == 0 {
            return invalid("query.default_top_k must be at least 1".into());
        }
        if self.steps.max_attempts == 0 {
            return invalid("steps.max_attempts must be at least 1".into());
        }
        if self.steps.purge_interval_secs == 0 {
            return invalid("steps.purge_interval_secs must be at least 1".into());
        }
        if self.vector_store.collection.trim().is_empty() {
            return invalid("vector_store.collection must not be empty".into());
        }
        if self.gateway.bind.parse::<IpAddr>().is_err() {
            return invalid(format!(
                "gateway.bind must be an IP address (got {:?})",
                self.gateway.bind
            ));
        }
        Ok(())
    }
}
