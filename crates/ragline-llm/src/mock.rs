//! Test-only mock provider.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::LlmError;
use crate::provider::{GenerationOptions, LlmProvider, Message};

/// Deterministic provider for tests.
///
/// Embeddings are a character histogram folded into `dimension` buckets, so texts
/// sharing vocabulary land close together under cosine similarity.
#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    recorded: Arc<Mutex<Vec<Vec<Message>>>>,
    embed_calls: Arc<AtomicUsize>,
    chat_calls: Arc<AtomicUsize>,
    embed_failures_left: Arc<AtomicU32>,
    pub default_response: String,
    pub dimension: usize,
    pub fail_chat: bool,
    /// Milliseconds to sleep before answering a chat request.
    pub delay_ms: u64,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            recorded: Arc::new(Mutex::new(Vec::new())),
            embed_calls: Arc::new(AtomicUsize::new(0)),
            chat_calls: Arc::new(AtomicUsize::new(0)),
            embed_failures_left: Arc::new(AtomicU32::new(0)),
            default_response: "mock response".into(),
            dimension: 8,
            fail_chat: false,
            delay_ms: 0,
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_chat: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Make the next `n` embedding calls fail with a transient API error.
    #[must_use]
    pub fn with_embed_failures(self, n: u32) -> Self {
        self.embed_failures_left.store(n, Ordering::SeqCst);
        self
    }

    #[must_use]
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    /// Message lists received by `chat`, oldest first.
    #[must_use]
    pub fn recorded(&self) -> Vec<Vec<Message>> {
        self.recorded
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let dim = self.dimension.max(1);
        let mut v = vec![0.0f32; dim];
        for c in text.chars().filter(|c| c.is_alphanumeric()) {
            let bucket = (c.to_ascii_lowercase() as usize) % dim;
            v[bucket] += 1.0;
        }
        v
    }
}

impl LlmProvider for MockProvider {
    async fn chat(
        &self,
        messages: &[Message],
        _options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if let Ok(mut rec) = self.recorded.lock() {
            rec.push(messages.to_vec());
        }
        if self.fail_chat {
            return Err(LlmError::Other("mock LLM error".into()));
        }
        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut r| (!r.is_empty()).then(|| r.remove(0)));
        Ok(next.unwrap_or_else(|| self.default_response.clone()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .embed_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(LlmError::Api {
                provider: "mock",
                status: 503,
            });
        }
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}
