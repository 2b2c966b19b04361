//! Post-call transcript analysis
//!
//! Runs after a call ends, off the live path. The transcript is rendered
//! into one extraction prompt and the provider is asked to answer through a
//! single `record_call_analysis` function call; free text is not an
//! acceptable answer here. Invalid values earn exactly one retry with the
//! rejection reason appended, then the run fails.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use dispatch_agent_config::AnalysisConfig;
use dispatch_agent_core::{
    AnalysisError, CallAnalysis, CallRegistry, CompletionOutcome, CompletionRequest,
    ConversationTurn, CooperationLevel, FunctionSchema, Sentiment, Transcript, TurnRole,
};
use dispatch_agent_llm::FallbackRouter;

use crate::heuristics;

const RECORD_FUNCTION: &str = "record_call_analysis";

const EXTRACTION_INSTRUCTION: &str = "You review finished logistics dispatch calls. Read the \
     transcript and call the record_call_analysis function exactly once with your assessment. \
     Score quality from 1 (unusable) to 10 (flawless). Base every field on the transcript \
     alone; do not invent events that are not in it.";

/// Transcript post-processor
///
/// Shares the provider stack with the live bridge but tolerates latency;
/// it still goes through the fallback router so a provider outage degrades
/// to the secondary instead of losing the record.
pub struct TranscriptAnalyzer {
    router: FallbackRouter,
    registry: Arc<dyn CallRegistry>,
    config: AnalysisConfig,
}

impl TranscriptAnalyzer {
    pub fn new(
        router: FallbackRouter,
        registry: Arc<dyn CallRegistry>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            router,
            registry,
            config,
        }
    }

    /// Load the stored transcript for a call and analyze it
    pub async fn analyze_call(&self, call_id: &str) -> Result<CallAnalysis, AnalysisError> {
        let transcript = self.registry.load_transcript(call_id).await?;
        self.analyze(&transcript).await
    }

    /// Analyze one finished transcript and persist the record
    ///
    /// Re-runs replace the stored analysis whole.
    pub async fn analyze(&self, transcript: &Transcript) -> Result<CallAnalysis, AnalysisError> {
        if !transcript.has_spoken_content() {
            metrics::counter!("analysis_runs_total", "outcome" => "incomplete").increment(1);
            return Err(AnalysisError::IncompleteTranscript {
                call_id: transcript.call_id.clone(),
            });
        }

        // Fresh router handle per run so sticky demotion from a previous
        // analysis never carries over.
        let router = self.router.session_scope();
        let mut request = extraction_request(transcript);
        let mut retried = false;

        loop {
            let routed = router.dispatch(&request).await.map_err(|err| {
                metrics::counter!("analysis_runs_total", "outcome" => "failed").increment(1);
                AnalysisError::ExtractionFailed {
                    call_id: transcript.call_id.clone(),
                    reason: err.to_string(),
                }
            })?;

            match self.interpret(transcript, &routed.outcome) {
                Ok(analysis) => {
                    self.registry.save_call_analysis(analysis.clone()).await?;
                    metrics::counter!("analysis_runs_total", "outcome" => "success").increment(1);
                    tracing::info!(
                        call_id = %transcript.call_id,
                        provider = %routed.provider_used,
                        quality_score = analysis.quality_score,
                        "Call analysis stored"
                    );
                    return Ok(analysis);
                }
                Err(reason) if !retried => {
                    retried = true;
                    metrics::counter!("analysis_retries_total").increment(1);
                    tracing::warn!(
                        call_id = %transcript.call_id,
                        reason = %reason,
                        "Invalid extraction, retrying once"
                    );
                    request = retry_request(&request, &reason);
                }
                Err(reason) => {
                    metrics::counter!("analysis_runs_total", "outcome" => "failed").increment(1);
                    return Err(AnalysisError::ExtractionFailed {
                        call_id: transcript.call_id.clone(),
                        reason,
                    });
                }
            }
        }
    }

    fn interpret(
        &self,
        transcript: &Transcript,
        outcome: &CompletionOutcome,
    ) -> Result<CallAnalysis, String> {
        let call = match outcome {
            CompletionOutcome::FunctionCall { request } => request,
            CompletionOutcome::TextAndFunctionCall { request, .. } => request,
            CompletionOutcome::Text { .. } => {
                return Err(format!("expected a {RECORD_FUNCTION} call, got plain text"));
            }
        };
        if call.name != RECORD_FUNCTION {
            return Err(format!("unexpected function call '{}'", call.name));
        }
        self.build_analysis(transcript, &call.arguments)
    }

    fn build_analysis(
        &self,
        transcript: &Transcript,
        args: &Value,
    ) -> Result<CallAnalysis, String> {
        let sentiment_label = args
            .get("sentiment")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing sentiment".to_string())?;
        let sentiment = Sentiment::parse(sentiment_label)
            .ok_or_else(|| format!("unknown sentiment '{sentiment_label}'"))?;

        let raw_score = args
            .get("quality_score")
            .and_then(Value::as_i64)
            .ok_or_else(|| "missing or non-integer quality_score".to_string())?;
        // Off-by-one at either end is forgiven as a clamp; anything further
        // out means the extraction cannot be trusted.
        if !(0..=11).contains(&raw_score) {
            return Err(format!("quality_score {raw_score} out of range"));
        }
        let quality_score = raw_score.clamp(1, 10) as u8;

        let sentiment_confidence = match args.get("sentiment_confidence") {
            None | Some(Value::Null) => 0.5,
            Some(v) => v
                .as_f64()
                .ok_or_else(|| "non-numeric sentiment_confidence".to_string())?
                .clamp(0.0, 1.0) as f32,
        };

        let goal_achieved = match args.get("goal_achieved") {
            None | Some(Value::Null) => heuristics::goal_achieved_hint(transcript),
            Some(v) => v
                .as_bool()
                .ok_or_else(|| "non-boolean goal_achieved".to_string())?,
        };

        let cooperation = match args.get("cooperation").and_then(Value::as_str) {
            None => heuristics::cooperation_hint(transcript, sentiment),
            Some(label) => CooperationLevel::parse(label)
                .ok_or_else(|| format!("unknown cooperation '{label}'"))?,
        };

        let mut key_topics: Vec<String> = match args.get("key_topics") {
            None | Some(Value::Null) => Vec::new(),
            Some(v) => v
                .as_array()
                .ok_or_else(|| "key_topics is not an array".to_string())?
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        };
        if key_topics.is_empty() {
            key_topics = heuristics::keyword_topics(transcript, self.config.max_topics);
        }
        key_topics.truncate(self.config.max_topics);

        let summary = match args
            .get("summary")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
        {
            Some(s) => heuristics::truncate_chars(s.trim(), self.config.summary_max_chars),
            None => heuristics::fallback_summary(transcript, self.config.summary_max_chars),
        };

        Ok(CallAnalysis {
            call_id: transcript.call_id.clone(),
            sentiment,
            sentiment_confidence,
            quality_score,
            key_topics,
            goal_achieved,
            cooperation,
            summary,
            analyzed_at: Utc::now(),
        })
    }
}

fn analysis_schema() -> FunctionSchema {
    FunctionSchema {
        name: RECORD_FUNCTION.to_string(),
        description: "Record the structured assessment of a finished dispatch call".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "sentiment": {
                    "type": "string",
                    "enum": ["positive", "negative", "neutral"],
                    "description": "Overall caller sentiment"
                },
                "sentiment_confidence": {
                    "type": "number",
                    "minimum": 0,
                    "maximum": 1
                },
                "quality_score": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 10,
                    "description": "Overall call quality"
                },
                "key_topics": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Main subjects discussed, at most five"
                },
                "goal_achieved": {
                    "type": "boolean",
                    "description": "Whether the dispatch goal of the call was met"
                },
                "cooperation": {
                    "type": "string",
                    "enum": ["high", "medium", "low"]
                },
                "summary": {
                    "type": "string",
                    "description": "One or two sentences summarizing the call"
                }
            },
            "required": ["sentiment", "quality_score"]
        }),
    }
}

fn extraction_request(transcript: &Transcript) -> CompletionRequest {
    let history = vec![
        ConversationTurn::text(TurnRole::System, EXTRACTION_INSTRUCTION, 0),
        ConversationTurn::text(
            TurnRole::User,
            format!("Transcript:\n{}", transcript.render()),
            1,
        ),
    ];
    CompletionRequest::new(history, vec![analysis_schema()])
}

/// Previous request with the rejection reason appended as a system turn
fn retry_request(request: &CompletionRequest, reason: &str) -> CompletionRequest {
    let next_ordinal = request.history.last().map(|t| t.ordinal + 1).unwrap_or(0);
    let mut history = request.history.clone();
    history.push(ConversationTurn::text(
        TurnRole::System,
        format!(
            "Your {RECORD_FUNCTION} call was rejected: {reason}. Call {RECORD_FUNCTION} \
             again with valid values for every field."
        ),
        next_ordinal,
    ));
    CompletionRequest::new(history, request.function_schemas.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dispatch_agent_core::{FunctionCallRequest, LlmProvider, ProviderError};
    use dispatch_agent_persistence::InMemoryCallRegistry;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<CompletionOutcome, ProviderError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<CompletionOutcome, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn complete(
            &self,
            _request: &CompletionRequest,
        ) -> Result<CompletionOutcome, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .pop_front()
                .unwrap_or(Err(ProviderError::Unavailable("script exhausted".into())))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn record_call(args: serde_json::Value) -> Result<CompletionOutcome, ProviderError> {
        Ok(CompletionOutcome::FunctionCall {
            request: FunctionCallRequest {
                id: "fc_analysis".to_string(),
                name: RECORD_FUNCTION.to_string(),
                arguments: args,
                origin_ordinal: 0,
            },
        })
    }

    fn valid_args() -> serde_json::Value {
        serde_json::json!({
            "sentiment": "positive",
            "sentiment_confidence": 0.9,
            "quality_score": 8,
            "key_topics": ["traffic", "delay"],
            "goal_achieved": true,
            "cooperation": "high",
            "summary": "Driver reported a traffic delay and a new ETA."
        })
    }

    fn spoken_transcript() -> Transcript {
        Transcript::new(
            "call-9",
            vec![
                ConversationTurn::text(TurnRole::System, "You are a dispatcher.", 0),
                ConversationTurn::text(TurnRole::User, "I'm stuck in traffic, running late.", 1),
                ConversationTurn::text(TurnRole::Assistant, "Noted, I'll log the delay.", 2),
            ],
        )
    }

    fn analyzer(
        provider: Arc<ScriptedProvider>,
        registry: Arc<InMemoryCallRegistry>,
    ) -> TranscriptAnalyzer {
        TranscriptAnalyzer::new(
            FallbackRouter::new(vec![provider], false),
            registry,
            AnalysisConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_valid_extraction_persists_record() {
        let provider = ScriptedProvider::new(vec![record_call(valid_args())]);
        let registry = Arc::new(InMemoryCallRegistry::new());
        let analyzer = analyzer(provider, registry.clone());

        let analysis = analyzer.analyze(&spoken_transcript()).await.unwrap();
        assert_eq!(analysis.sentiment, Sentiment::Positive);
        assert_eq!(analysis.quality_score, 8);

        let stored = registry.get_call_analysis("call-9").unwrap();
        assert_eq!(stored, analysis);
    }

    #[tokio::test]
    async fn test_far_out_of_range_score_retries_once_then_fails() {
        let mut bad = valid_args();
        bad["quality_score"] = serde_json::json!(13);
        let provider = ScriptedProvider::new(vec![record_call(bad.clone()), record_call(bad)]);
        let registry = Arc::new(InMemoryCallRegistry::new());
        let analyzer = analyzer(provider.clone(), registry.clone());

        let err = analyzer.analyze(&spoken_transcript()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::ExtractionFailed { .. }));
        // One retry total, never a third dispatch
        assert_eq!(provider.call_count(), 2);
        assert!(registry.get_call_analysis("call-9").is_none());
    }

    #[tokio::test]
    async fn test_off_by_one_scores_are_clamped() {
        for (raw, clamped) in [(0, 1), (11, 10)] {
            let mut args = valid_args();
            args["quality_score"] = serde_json::json!(raw);
            let provider = ScriptedProvider::new(vec![record_call(args)]);
            let registry = Arc::new(InMemoryCallRegistry::new());
            let analyzer = analyzer(provider.clone(), registry);

            let analysis = analyzer.analyze(&spoken_transcript()).await.unwrap();
            assert_eq!(analysis.quality_score, clamped);
            // Clamping is not a retry
            assert_eq!(provider.call_count(), 1);
        }
    }

    #[tokio::test]
    async fn test_unknown_sentiment_retries_then_succeeds() {
        let mut bad = valid_args();
        bad["sentiment"] = serde_json::json!("ecstatic");
        let provider = ScriptedProvider::new(vec![record_call(bad), record_call(valid_args())]);
        let registry = Arc::new(InMemoryCallRegistry::new());
        let analyzer = analyzer(provider.clone(), registry);

        let analysis = analyzer.analyze(&spoken_transcript()).await.unwrap();
        assert_eq!(analysis.sentiment, Sentiment::Positive);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_plain_text_answer_consumes_the_retry() {
        let provider = ScriptedProvider::new(vec![
            Ok(CompletionOutcome::Text {
                text: "Great call overall!".to_string(),
            }),
            record_call(valid_args()),
        ]);
        let registry = Arc::new(InMemoryCallRegistry::new());
        let analyzer = analyzer(provider.clone(), registry);

        analyzer.analyze(&spoken_transcript()).await.unwrap();
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_transcript_rejected_without_dispatch() {
        let provider = ScriptedProvider::new(vec![record_call(valid_args())]);
        let registry = Arc::new(InMemoryCallRegistry::new());
        let analyzer = analyzer(provider.clone(), registry);

        let transcript = Transcript::new("call-empty", vec![]);
        let err = analyzer.analyze(&transcript).await.unwrap_err();
        assert!(matches!(err, AnalysisError::IncompleteTranscript { .. }));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_provider_exhaustion_is_terminal() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::Unavailable(
            "outage".to_string(),
        ))]);
        let registry = Arc::new(InMemoryCallRegistry::new());
        let analyzer = analyzer(provider.clone(), registry);

        let err = analyzer.analyze(&spoken_transcript()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::ExtractionFailed { .. }));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_rerun_replaces_stored_record() {
        let mut second = valid_args();
        second["quality_score"] = serde_json::json!(3);
        let provider =
            ScriptedProvider::new(vec![record_call(valid_args()), record_call(second)]);
        let registry = Arc::new(InMemoryCallRegistry::new());
        let analyzer = analyzer(provider, registry.clone());

        let transcript = spoken_transcript();
        analyzer.analyze(&transcript).await.unwrap();
        analyzer.analyze(&transcript).await.unwrap();

        let stored = registry.get_call_analysis("call-9").unwrap();
        assert_eq!(stored.quality_score, 3);
    }

    #[tokio::test]
    async fn test_omitted_optional_fields_fall_back_to_heuristics() {
        let provider = ScriptedProvider::new(vec![record_call(serde_json::json!({
            "sentiment": "neutral",
            "quality_score": 6
        }))]);
        let registry = Arc::new(InMemoryCallRegistry::new());
        let analyzer = analyzer(provider, registry);

        let analysis = analyzer.analyze(&spoken_transcript()).await.unwrap();
        // The transcript mentions traffic and running late
        assert!(analysis.key_topics.contains(&"delay".to_string()));
        assert!(analysis.key_topics.contains(&"traffic".to_string()));
        assert!(!analysis.summary.is_empty());
        assert!((analysis.sentiment_confidence - 0.5).abs() < f32::EPSILON);
        assert_eq!(analysis.cooperation, CooperationLevel::Low);
    }

    #[test]
    fn test_retry_request_appends_rejection_reason() {
        let request = extraction_request(&spoken_transcript());
        let retried = retry_request(&request, "quality_score 13 out of range");
        assert_eq!(retried.history.len(), request.history.len() + 1);
        let appended = retried.history.last().unwrap();
        assert_eq!(appended.role, TurnRole::System);
        assert!(appended
            .content
            .as_text()
            .unwrap()
            .contains("quality_score 13 out of range"));
    }
}
