//! Post-call analysis records and agent configuration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Overall caller sentiment for a finished call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    /// Parse a provider-emitted label; returns None for out-of-set values
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "positive" => Some(Sentiment::Positive),
            "negative" => Some(Sentiment::Negative),
            "neutral" => Some(Sentiment::Neutral),
            _ => None,
        }
    }
}

/// How cooperative the driver was during the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CooperationLevel {
    High,
    Medium,
    Low,
}

impl CooperationLevel {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "high" => Some(CooperationLevel::High),
            "medium" => Some(CooperationLevel::Medium),
            "low" => Some(CooperationLevel::Low),
            _ => None,
        }
    }
}

/// Derived metrics for one finished call
///
/// Created once per call by the post-processor. Re-runs replace the stored
/// record, never merge into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallAnalysis {
    pub call_id: String,
    pub sentiment: Sentiment,
    /// Confidence in the sentiment label, [0, 1]
    pub sentiment_confidence: f32,
    /// Integer in [1, 10]
    pub quality_score: u8,
    /// At most five topics
    pub key_topics: Vec<String>,
    pub goal_achieved: bool,
    pub cooperation: CooperationLevel,
    /// Short free-text summary, truncated to 200 chars
    pub summary: String,
    pub analyzed_at: DateTime<Utc>,
}

/// Per-agent conversation configuration served by the call registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent_id: String,
    /// System prompt appended as the session's first turn
    pub system_prompt: String,
    /// Opening utterance; when absent the agent waits for the caller
    pub greeting: Option<String>,
    /// Names of function schemas enabled for this agent
    pub enabled_functions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentiment_parse() {
        assert_eq!(Sentiment::parse("Positive"), Some(Sentiment::Positive));
        assert_eq!(Sentiment::parse(" neutral "), Some(Sentiment::Neutral));
        assert_eq!(Sentiment::parse("ecstatic"), None);
    }

    #[test]
    fn test_cooperation_parse() {
        assert_eq!(CooperationLevel::parse("HIGH"), Some(CooperationLevel::High));
        assert_eq!(CooperationLevel::parse("none"), None);
    }
}
