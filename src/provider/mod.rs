//! AI provider layer
//!
//! Adapters for each backend behind the [`Provider`] trait, plus the
//! [`ProviderRouter`] that picks one per query with health-based failover.

mod anthropic;
mod client;
mod config;
mod ollama;
mod openai;
mod router;

pub use anthropic::AnthropicProvider;
pub use client::*;
pub use config::*;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use router::*;
