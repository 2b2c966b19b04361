//! In-memory call registry

use async_trait::async_trait;
use dashmap::DashMap;

use dispatch_agent_core::{
    AgentConfig, CallAnalysis, CallRegistry, RegistryError, Transcript,
};

/// Dashmap-backed registry for development and tests
pub struct InMemoryCallRegistry {
    agents: DashMap<String, AgentConfig>,
    transcripts: DashMap<String, Transcript>,
    analyses: DashMap<String, CallAnalysis>,
}

impl InMemoryCallRegistry {
    pub fn new() -> Self {
        Self {
            agents: DashMap::new(),
            transcripts: DashMap::new(),
            analyses: DashMap::new(),
        }
    }

    /// Register an agent configuration
    pub fn put_agent_config(&self, config: AgentConfig) {
        self.agents.insert(config.agent_id.clone(), config);
    }

    /// Stored analysis for a call, if any
    pub fn get_call_analysis(&self, call_id: &str) -> Option<CallAnalysis> {
        self.analyses.get(call_id).map(|entry| entry.clone())
    }

    pub fn transcript_count(&self) -> usize {
        self.transcripts.len()
    }
}

impl Default for InMemoryCallRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CallRegistry for InMemoryCallRegistry {
    async fn get_agent_config(&self, agent_id: &str) -> Result<AgentConfig, RegistryError> {
        self.agents
            .get(agent_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| RegistryError::AgentNotFound(agent_id.to_string()))
    }

    async fn save_transcript(&self, transcript: Transcript) -> Result<(), RegistryError> {
        tracing::debug!(
            call_id = %transcript.call_id,
            turns = transcript.turns.len(),
            "Saving transcript"
        );
        self.transcripts
            .insert(transcript.call_id.clone(), transcript);
        Ok(())
    }

    async fn load_transcript(&self, call_id: &str) -> Result<Transcript, RegistryError> {
        self.transcripts
            .get(call_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| RegistryError::TranscriptNotFound(call_id.to_string()))
    }

    async fn save_call_analysis(&self, analysis: CallAnalysis) -> Result<(), RegistryError> {
        // Replace, never merge: a re-run overwrites the prior record whole.
        let replaced = self
            .analyses
            .insert(analysis.call_id.clone(), analysis)
            .is_some();
        if replaced {
            tracing::debug!("Replaced prior call analysis");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dispatch_agent_core::{CooperationLevel, Sentiment};

    fn analysis(call_id: &str, score: u8) -> CallAnalysis {
        CallAnalysis {
            call_id: call_id.to_string(),
            sentiment: Sentiment::Neutral,
            sentiment_confidence: 0.8,
            quality_score: score,
            key_topics: vec!["eta".to_string()],
            goal_achieved: true,
            cooperation: CooperationLevel::High,
            summary: "Driver checked in.".to_string(),
            analyzed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_agent_config_roundtrip() {
        let registry = InMemoryCallRegistry::new();
        registry.put_agent_config(AgentConfig {
            agent_id: "dispatch".to_string(),
            system_prompt: "prompt".to_string(),
            greeting: None,
            enabled_functions: vec![],
        });

        let config = registry.get_agent_config("dispatch").await.unwrap();
        assert_eq!(config.system_prompt, "prompt");

        let err = registry.get_agent_config("missing").await.unwrap_err();
        assert!(matches!(err, RegistryError::AgentNotFound(_)));
    }

    #[tokio::test]
    async fn test_transcript_roundtrip() {
        let registry = InMemoryCallRegistry::new();
        let err = registry.load_transcript("c1").await.unwrap_err();
        assert!(matches!(err, RegistryError::TranscriptNotFound(_)));

        registry
            .save_transcript(Transcript::new("c1", vec![]))
            .await
            .unwrap();
        let loaded = registry.load_transcript("c1").await.unwrap();
        assert_eq!(loaded.call_id, "c1");
    }

    #[tokio::test]
    async fn test_analysis_replaces_not_merges() {
        let registry = InMemoryCallRegistry::new();
        registry.save_call_analysis(analysis("c1", 4)).await.unwrap();
        registry.save_call_analysis(analysis("c1", 9)).await.unwrap();

        let stored = registry.get_call_analysis("c1").unwrap();
        assert_eq!(stored.quality_score, 9);
    }
}
