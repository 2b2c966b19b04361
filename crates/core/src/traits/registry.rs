//! Persistence contract consumed by the core
//!
//! The core never issues raw queries; everything it needs from storage goes
//! through this narrow contract. Write discipline (single writer per
//! call_id) is the implementation's responsibility.

use async_trait::async_trait;

use crate::analysis::{AgentConfig, CallAnalysis};
use crate::error::RegistryError;
use crate::turn::Transcript;

/// Call/agent record store
#[async_trait]
pub trait CallRegistry: Send + Sync + 'static {
    /// Fetch the conversation configuration for an agent
    async fn get_agent_config(&self, agent_id: &str) -> Result<AgentConfig, RegistryError>;

    /// Store the flushed transcript of a finished call
    async fn save_transcript(&self, transcript: Transcript) -> Result<(), RegistryError>;

    /// Load a finished call's transcript
    async fn load_transcript(&self, call_id: &str) -> Result<Transcript, RegistryError>;

    /// Store a call analysis, replacing any prior analysis for the call
    async fn save_call_analysis(&self, analysis: CallAnalysis) -> Result<(), RegistryError>;
}
