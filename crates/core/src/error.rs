//! Error taxonomy
//!
//! Adapter-local failures (`ProviderError`) are recovered by the router's
//! fallback policy. `AllProvidersExhausted` surfaces to the bridge (absorbed
//! into a degraded utterance) and to the post-processor (terminal). Session
//! and analysis failures are explicit states, never silently dropped.

use thiserror::Error;

/// Failure classes at the provider adapter boundary
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Network failure, 5xx, or deadline expiry
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// 429-class throttling
    #[error("Provider rate limited")]
    RateLimited,

    /// Response violates the expected schema
    #[error("Provider returned malformed output: {0}")]
    MalformedOutput(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Unavailable("request timed out".to_string())
        } else {
            ProviderError::Unavailable(err.to_string())
        }
    }
}

/// Router-level failure
#[derive(Error, Debug)]
pub enum RouterError {
    /// Every configured provider failed the same request
    #[error("All providers exhausted after {attempts} attempts")]
    AllProvidersExhausted {
        attempts: usize,
        last_error: Option<ProviderError>,
    },
}

/// Session state violations
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    /// Event arrived for a call whose session has been closed
    #[error("Session closed: {call_id}")]
    SessionClosed { call_id: String },

    /// Attempt to resolve an already-resolved function call
    #[error("Function call {request_id} already resolved")]
    FunctionAlreadyResolved { request_id: String },

    /// Result recorded with no matching outstanding request
    #[error("No pending function call to resolve")]
    NoPendingFunction,

    /// A second function call was requested while one is outstanding
    #[error("Function call already pending")]
    FunctionAlreadyPending,
}

/// Post-processor terminal failures
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Transcript empty or carries no spoken content
    #[error("Incomplete transcript for call {call_id}")]
    IncompleteTranscript { call_id: String },

    /// Providers exhausted or malformed output persisted past the retry budget
    #[error("Extraction failed for call {call_id}: {reason}")]
    ExtractionFailed { call_id: String, reason: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Call registry contract failures
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Transcript not found for call {0}")]
    TranscriptNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}
