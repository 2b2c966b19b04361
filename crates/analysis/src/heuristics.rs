//! Transcript-derived fallbacks
//!
//! The extractor trusts the provider for sentiment and quality, but the
//! optional fields fall back to these keyword heuristics when the provider
//! omits them. Keeps an analysis record complete without a second dispatch.

use once_cell::sync::Lazy;
use regex::Regex;

use dispatch_agent_core::{CooperationLevel, Sentiment, Transcript, TurnContent};

static TOPIC_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"\b(delay\w*|late|behind)\b", "delay"),
        (r"\btraffic\b", "traffic"),
        (r"\b(location|where)\b", "location"),
        (r"\b(eta|arriv\w*)\b", "eta"),
        (r"\b(emergency|accident|breakdown|blowout)\b", "emergency"),
        (r"\b(deliver\w*|load\w*|unload\w*|dropoff)\b", "delivery"),
        (r"\b(weather|storm|snow|rain|ice|fog)\b", "weather"),
    ]
    .into_iter()
    .map(|(pattern, topic)| (Regex::new(pattern).expect("static pattern"), topic))
    .collect()
});

/// Topics matched against the rendered transcript, in pattern order
pub fn keyword_topics(transcript: &Transcript, max_topics: usize) -> Vec<String> {
    let text = transcript.render().to_lowercase();
    let mut topics = Vec::new();
    for (pattern, topic) in TOPIC_PATTERNS.iter() {
        if topics.len() >= max_topics {
            break;
        }
        if pattern.is_match(&text) {
            topics.push((*topic).to_string());
        }
    }
    topics
}

/// A successfully resolved function call counts as a completed check-in
pub fn goal_achieved_hint(transcript: &Transcript) -> bool {
    transcript.turns.iter().any(|t| {
        matches!(&t.content, TurnContent::FunctionResult { result } if result.success)
    })
}

/// Rough cooperation estimate from engagement and sentiment
pub fn cooperation_hint(transcript: &Transcript, sentiment: Sentiment) -> CooperationLevel {
    let user_turns = transcript.user_texts().len();
    match (sentiment, user_turns) {
        (Sentiment::Negative, _) => CooperationLevel::Low,
        (_, 0..=1) => CooperationLevel::Low,
        (Sentiment::Positive, _) => CooperationLevel::High,
        (_, 2..=3) => CooperationLevel::Medium,
        _ => CooperationLevel::High,
    }
}

/// Summary assembled from the driver's own words when the provider omits one
pub fn fallback_summary(transcript: &Transcript, max_chars: usize) -> String {
    let joined = transcript.user_texts().join(" ");
    if joined.trim().is_empty() {
        return truncate_chars("Call ended without driver input.", max_chars);
    }
    truncate_chars(&format!("Driver call: {joined}"), max_chars)
}

/// Char-count truncation with a trailing ellipsis
///
/// The result never exceeds `max_chars`; caps too small to fit the
/// ellipsis get a hard cut instead.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= 3 {
        return text.chars().take(max_chars).collect();
    }
    let kept: String = text.chars().take(max_chars - 3).collect();
    format!("{kept}...")
}
