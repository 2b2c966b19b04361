//! Core types for the dispatch voice agent
//!
//! This crate provides the foundational types shared across all other crates:
//! - Conversation turns and transcripts
//! - Completion outcomes returned by LLM providers
//! - Post-call analysis records
//! - The provider and persistence contracts
//! - Error taxonomy

pub mod analysis;
pub mod completion;
pub mod error;
pub mod traits;
pub mod turn;

pub use analysis::{AgentConfig, CallAnalysis, CooperationLevel, Sentiment};
pub use completion::{
    AttemptOutcome, CompletionOutcome, CompletionRequest, ProviderAttempt, RoutedCompletion,
};
pub use error::{
    AnalysisError, ProviderError, RegistryError, RouterError, SessionError,
};
pub use traits::{CallRegistry, LlmProvider};
pub use turn::{
    ConversationTurn, FunctionCallRequest, FunctionCallResult, FunctionSchema, Transcript,
    TurnContent, TurnRole,
};
