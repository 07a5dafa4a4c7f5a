//! Embedding and chat-completion provider abstraction.

pub mod any;
pub mod error;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod openai;
pub mod provider;
pub(crate) mod retry;

pub use error::LlmError;
pub use provider::{GenerationOptions, LlmProvider, Message, Role};
