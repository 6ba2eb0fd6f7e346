//! Generation client module.
//!
//! Provides a trait-based abstraction over text-generation providers, with
//! Azure OpenAI as the primary implementation. The solver components receive
//! a shared handle at construction time; there is no process-wide singleton.

mod azure;
mod error;

pub use azure::AzureOpenAiClient;
pub use error::{classify_http_status, LlmError, LlmErrorKind, RetryConfig};

use async_trait::async_trait;

/// Trait for text-generation clients.
///
/// One prompt in, one text completion out. Callers are expected to wrap
/// failures defensively; nothing in the solver path propagates an `LlmError`
/// past a component boundary.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: u32,
    ) -> Result<String, LlmError>;
}
