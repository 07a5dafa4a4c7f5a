#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rate limited")]
    RateLimited,

    #[error("{provider} rejected the credentials")]
    Unauthorized { provider: &'static str },

    #[error("{provider} API request failed (status {status})")]
    Api { provider: &'static str, status: u16 },

    #[error("empty response from {provider}")]
    EmptyResponse { provider: &'static str },

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Whether the failure is caused by the provider refusing our credentials.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Whether repeating the same request may succeed.
    ///
    /// Client errors (4xx) other than request timeout and rate limiting are
    /// permanent, as are rejected credentials and malformed requests.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => !e.is_builder(),
            Self::Api { status, .. } => matches!(status, 408 | 429 | 500..),
            Self::Unauthorized { .. } => false,
            Self::Json(_) | Self::RateLimited | Self::EmptyResponse { .. } | Self::Other(_) => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> LlmError {
        LlmError::Api {
            provider: "openai",
            status,
        }
    }

    #[test]
    fn client_errors_are_permanent() {
        for status in [400, 404, 413, 422] {
            assert!(!api(status).is_transient(), "{status}");
        }
        assert!(!LlmError::Unauthorized { provider: "openai" }.is_transient());
    }

    #[test]
    fn server_errors_and_throttling_are_transient() {
        for status in [408, 429, 500, 502, 503] {
            assert!(api(status).is_transient(), "{status}");
        }
        assert!(LlmError::RateLimited.is_transient());
        assert!(LlmError::EmptyResponse { provider: "openai" }.is_transient());
    }
}
