//! LLM provider adapter contract

use async_trait::async_trait;

use crate::completion::{CompletionOutcome, CompletionRequest};
use crate::error::ProviderError;

/// Uniform interface to a chat-completion backend
///
/// One implementation per provider wire format. Implementations must enforce
/// a hard per-call deadline and return `ProviderError::Unavailable` on
/// expiry rather than blocking; the router relies on this to keep a live
/// call within its latency budget.
#[async_trait]
pub trait LlmProvider: Send + Sync + 'static {
    /// Run one completion over the given history and function schemas
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionOutcome, ProviderError>;

    /// Stable provider name used in attempt records and logs
    fn name(&self) -> &str;
}
