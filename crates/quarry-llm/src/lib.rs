//! Embedding provider abstraction and backend implementations.
//!
//! The index only needs one capability from a model provider: turning text
//! into a fixed-length vector. [`EmbeddingFunction`] captures that, and
//! [`any::AnyEmbedder`] selects one backend at configuration time.

pub mod any;
pub mod error;
pub mod gemini;
pub mod hashing;
pub(crate) mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod provider;

pub use any::AnyEmbedder;
pub use error::LlmError;
pub use provider::EmbeddingFunction;
