//! LLM client abstraction.
//!
//! The core never performs inference of its own; the semantic tagger and
//! the session summarizer call out through this trait and fall back to
//! pattern-based extraction when no provider is reachable.

mod anthropic;

pub use anthropic::AnthropicClient;

use crate::Result;

/// Trait for LLM providers.
pub trait LlmProvider: Send + Sync {
    /// The provider name.
    fn name(&self) -> &'static str;

    /// Generates a completion for the given prompt.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::External`] when the call fails; callers are
    /// expected to fall back rather than propagate.
    fn complete(&self, prompt: &str) -> Result<String>;
}

/// Builds the default provider when credentials are present in the
/// environment, `None` otherwise.
#[must_use]
pub fn provider_from_env() -> Option<Box<dyn LlmProvider>> {
    let client = AnthropicClient::new();
    if client.is_configured() {
        Some(Box::new(client))
    } else {
        None
    }
}
