//! GeoSite LLM - Embedding and language-model ports
//!
//! This crate defines the ports for embedding and the language-model
//! collaborator, along with adapter implementations.

pub mod chat;
pub mod ollama;
pub mod ports;
pub mod prompts;

// Re-export main types
pub use chat::ChatModelClient;
pub use ollama::OllamaEmbedder;
pub use ports::{Embedder, LanguageModel};
