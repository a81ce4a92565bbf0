//! LLM provider abstraction.
//!
//! `LlmProvider` is an enum over concrete provider implementations.
//! Add a new variant + module in `providers/` for each additional backend.
//!
//! Provider instances are shared immutable capabilities — clone them freely.
//! Streaming pushes text fragments into an `mpsc::Sender`; dropping the
//! receiver is how a consumer stops a stream early.

pub mod providers;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("stream receiver closed")]
    Closed,
}

// ── Messages ──────────────────────────────────────────────────────────────────

/// One chat message as sent to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user", content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant", content: content.into() }
    }
}

// ── Provider enum ─────────────────────────────────────────────────────────────

/// All available provider backends.
///
/// Enum dispatch avoids `dyn` trait objects and the `async-trait` dependency.
/// Adding a backend = new module + new variant + new `complete`/`stream` arm.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Dummy(providers::dummy::DummyProvider),
    OpenAiCompatible(providers::openai_compatible::OpenAiCompatibleProvider),
}

impl LlmProvider {
    /// One round-trip; returns the full reply text.
    pub async fn complete(
        &self,
        system: Option<&str>,
        messages: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        match self {
            LlmProvider::Dummy(p) => p.complete(messages).await,
            LlmProvider::OpenAiCompatible(p) => p.complete(system, messages).await,
        }
    }

    /// Stream the reply as fragments into `tx`. Returns once the provider is done
    /// or the receiver has gone away.
    pub async fn stream(
        &self,
        system: Option<&str>,
        messages: &[ChatMessage],
        tx: mpsc::Sender<String>,
    ) -> Result<(), ProviderError> {
        match self {
            LlmProvider::Dummy(p) => p.stream(messages, tx).await,
            LlmProvider::OpenAiCompatible(p) => p.stream(system, messages, tx).await,
        }
    }
}
