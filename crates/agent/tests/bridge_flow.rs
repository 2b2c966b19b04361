//! End-to-end bridge flows with scripted providers and real tools

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use dispatch_agent_agent::{Bridge, BridgeState};
use dispatch_agent_config::BridgeConfig;
use dispatch_agent_core::{
    AgentConfig, CompletionOutcome, CompletionRequest, FunctionCallRequest, LlmProvider,
    ProviderError, TurnContent, TurnRole,
};
use dispatch_agent_llm::FallbackRouter;
use dispatch_agent_tools::create_default_registry;

/// Provider that replays a scripted sequence and records the histories it saw
struct ScriptedProvider {
    name: String,
    script: Mutex<VecDeque<Result<CompletionOutcome, ProviderError>>>,
    seen_histories: Mutex<Vec<Vec<dispatch_agent_core::ConversationTurn>>>,
    seen_schema_counts: Mutex<Vec<usize>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(name: &str, script: Vec<Result<CompletionOutcome, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            seen_histories: Mutex::new(Vec::new()),
            seen_schema_counts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionOutcome, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_histories.lock().push(request.history.clone());
        self.seen_schema_counts
            .lock()
            .push(request.function_schemas.len());
        self.script
            .lock()
            .pop_front()
            .unwrap_or(Err(ProviderError::Unavailable("script exhausted".into())))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn dispatch_agent() -> AgentConfig {
    AgentConfig {
        agent_id: "dispatch".to_string(),
        system_prompt: "You are a logistics dispatcher handling driver check-in calls.".to_string(),
        greeting: None,
        enabled_functions: vec![
            "lookup_location".to_string(),
            "get_load_details".to_string(),
            "log_driver_status".to_string(),
        ],
    }
}

fn lookup_call(id: &str, truck_id: &str) -> FunctionCallRequest {
    FunctionCallRequest {
        id: id.to_string(),
        name: "lookup_location".to_string(),
        arguments: serde_json::json!({ "truck_id": truck_id }),
        origin_ordinal: 0,
    }
}

#[tokio::test]
async fn test_truck_42_function_call_roundtrip() {
    // Provider first asks for a location lookup, then answers in text once
    // it has seen the result.
    let provider = ScriptedProvider::new(
        "groq",
        vec![
            Ok(CompletionOutcome::FunctionCall {
                request: lookup_call("fc_1", "42"),
            }),
            Ok(CompletionOutcome::Text {
                text: "Truck 42 is near exit 10".to_string(),
            }),
        ],
    );
    let router = FallbackRouter::new(vec![provider.clone()], false);
    let tools = Arc::new(create_default_registry(Duration::from_secs(1)));
    let mut bridge = Bridge::new(
        "call-42",
        dispatch_agent(),
        router,
        tools,
        BridgeConfig::default(),
    );

    bridge.on_call_started().unwrap();
    let emitted = bridge
        .on_user_utterance("Where is truck 42?")
        .await
        .unwrap();

    // Exactly the final text, nothing else
    assert_eq!(emitted, vec!["Truck 42 is near exit 10".to_string()]);
    assert_eq!(bridge.state(), BridgeState::Streaming);

    let transcript = bridge.on_call_ended().unwrap();
    let turns = &transcript.turns;

    // system, user, assistant-function-call, function-result, assistant-text
    assert_eq!(turns.len(), 5);
    assert_eq!(turns[0].role, TurnRole::System);
    assert_eq!(turns[1].role, TurnRole::User);
    assert_eq!(turns[1].content.as_text(), Some("Where is truck 42?"));
    assert!(matches!(
        turns[2].content,
        TurnContent::FunctionCall { .. }
    ));
    assert!(matches!(
        turns[3].content,
        TurnContent::FunctionResult { .. }
    ));
    assert_eq!(turns[4].content.as_text(), Some("Truck 42 is near exit 10"));

    // Strictly increasing ordinals
    for window in turns.windows(2) {
        assert!(window[1].ordinal > window[0].ordinal);
    }

    // The function result carries the seeded GPS payload
    if let TurnContent::FunctionResult { result } = &turns[3].content {
        assert!(result.success);
        assert!(result.payload["lat"].is_f64());
        assert!(result.payload["lon"].is_f64());
    }
}

#[tokio::test]
async fn test_redispatch_sees_function_result_before_next_text() {
    let provider = ScriptedProvider::new(
        "groq",
        vec![
            Ok(CompletionOutcome::FunctionCall {
                request: lookup_call("fc_1", "42"),
            }),
            Ok(CompletionOutcome::Text {
                text: "Found it.".to_string(),
            }),
        ],
    );
    let router = FallbackRouter::new(vec![provider.clone()], false);
    let tools = Arc::new(create_default_registry(Duration::from_secs(1)));
    let mut bridge = Bridge::new(
        "call-seq",
        dispatch_agent(),
        router,
        tools,
        BridgeConfig::default(),
    );

    bridge.on_call_started().unwrap();
    bridge.on_user_utterance("Where is truck 42?").await.unwrap();

    let histories = provider.seen_histories.lock();
    assert_eq!(histories.len(), 2);

    // The second dispatch's history ends with exactly one function result
    // following the function call - never zero, never two.
    let second = &histories[1];
    let result_turns = second
        .iter()
        .filter(|t| matches!(t.content, TurnContent::FunctionResult { .. }))
        .count();
    assert_eq!(result_turns, 1);
    assert!(matches!(
        second[second.len() - 2].content,
        TurnContent::FunctionCall { .. }
    ));
    assert!(matches!(
        second[second.len() - 1].content,
        TurnContent::FunctionResult { .. }
    ));
}

#[tokio::test]
async fn test_text_and_function_call_emits_both_texts() {
    let provider = ScriptedProvider::new(
        "groq",
        vec![
            Ok(CompletionOutcome::TextAndFunctionCall {
                text: "Let me check.".to_string(),
                request: lookup_call("fc_1", "7"),
            }),
            Ok(CompletionOutcome::Text {
                text: "Truck 7 is in Chicago.".to_string(),
            }),
        ],
    );
    let router = FallbackRouter::new(vec![provider], false);
    let tools = Arc::new(create_default_registry(Duration::from_secs(1)));
    let mut bridge = Bridge::new(
        "call-both",
        dispatch_agent(),
        router,
        tools,
        BridgeConfig::default(),
    );

    bridge.on_call_started().unwrap();
    let emitted = bridge.on_user_utterance("Where is truck 7?").await.unwrap();
    assert_eq!(
        emitted,
        vec![
            "Let me check.".to_string(),
            "Truck 7 is in Chicago.".to_string()
        ]
    );
}

#[tokio::test]
async fn test_tool_failure_resolves_with_failure_payload() {
    // Unknown function name never reaches the bridge (the adapter rejects
    // it), but a registered tool rejecting its arguments must still resolve.
    let provider = ScriptedProvider::new(
        "groq",
        vec![
            Ok(CompletionOutcome::FunctionCall {
                request: FunctionCallRequest {
                    id: "fc_bad".to_string(),
                    name: "lookup_location".to_string(),
                    arguments: serde_json::json!({}),
                    origin_ordinal: 0,
                },
            }),
            Ok(CompletionOutcome::Text {
                text: "I could not find that truck.".to_string(),
            }),
        ],
    );
    let router = FallbackRouter::new(vec![provider], false);
    let tools = Arc::new(create_default_registry(Duration::from_secs(1)));
    let mut bridge = Bridge::new(
        "call-toolerr",
        dispatch_agent(),
        router,
        tools,
        BridgeConfig::default(),
    );

    bridge.on_call_started().unwrap();
    let emitted = bridge.on_user_utterance("Where is my truck?").await.unwrap();
    assert_eq!(emitted, vec!["I could not find that truck.".to_string()]);

    let transcript = bridge.on_call_ended().unwrap();
    let result = transcript
        .turns
        .iter()
        .find_map(|t| match &t.content {
            TurnContent::FunctionResult { result } => Some(result),
            _ => None,
        })
        .unwrap();
    assert!(!result.success);
}

#[tokio::test]
async fn test_exhaustion_mid_call_then_recovery() {
    // First utterance exhausts every provider; second one succeeds. The
    // session survives the outage.
    let provider = ScriptedProvider::new(
        "groq",
        vec![
            Err(ProviderError::Unavailable("outage".into())),
            Ok(CompletionOutcome::Text {
                text: "Back with you.".to_string(),
            }),
        ],
    );
    let router = FallbackRouter::new(vec![provider], false);
    let tools = Arc::new(create_default_registry(Duration::from_secs(1)));
    let config = BridgeConfig::default();
    let degraded = config.degraded_utterance.clone();
    let mut bridge = Bridge::new("call-outage", dispatch_agent(), router, tools, config);

    bridge.on_call_started().unwrap();

    let first = bridge.on_user_utterance("Hello?").await.unwrap();
    assert_eq!(first, vec![degraded]);
    assert_eq!(bridge.state(), BridgeState::Streaming);

    let second = bridge.on_user_utterance("Still there?").await.unwrap();
    assert_eq!(second, vec!["Back with you.".to_string()]);
}

#[tokio::test]
async fn test_function_hop_cap_withholds_schemas() {
    // A provider that keeps chaining lookups is eventually forced to text:
    // past the hop cap the dispatch carries no schemas.
    let provider = ScriptedProvider::new(
        "groq",
        vec![
            Ok(CompletionOutcome::FunctionCall {
                request: lookup_call("fc_1", "42"),
            }),
            Ok(CompletionOutcome::FunctionCall {
                request: lookup_call("fc_2", "7"),
            }),
            Ok(CompletionOutcome::Text {
                text: "Done chaining.".to_string(),
            }),
        ],
    );
    let router = FallbackRouter::new(vec![provider.clone()], false);
    let tools = Arc::new(create_default_registry(Duration::from_secs(1)));
    let config = BridgeConfig {
        max_function_hops: 2,
        ..BridgeConfig::default()
    };
    let mut bridge = Bridge::new("call-chain", dispatch_agent(), router, tools, config);

    bridge.on_call_started().unwrap();
    let emitted = bridge.on_user_utterance("Check everything.").await.unwrap();
    assert_eq!(emitted, vec!["Done chaining.".to_string()]);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 3);

    let schema_counts = provider.seen_schema_counts.lock();
    assert_eq!(schema_counts[0], 3);
    assert_eq!(schema_counts[1], 3);
    // Third dispatch is past the cap: no schemas offered
    assert_eq!(schema_counts[2], 0);
}
