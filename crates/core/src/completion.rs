//! Provider completion outcomes and router attempt records

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::turn::{ConversationTurn, FunctionCallRequest, FunctionSchema};

/// Request handed to a provider adapter for one completion
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub history: Vec<ConversationTurn>,
    pub function_schemas: Vec<FunctionSchema>,
}

impl CompletionRequest {
    pub fn new(history: Vec<ConversationTurn>, function_schemas: Vec<FunctionSchema>) -> Self {
        Self {
            history,
            function_schemas,
        }
    }
}

/// Validated result of one provider completion
///
/// A provider may emit prose, a function invocation, or both in a single
/// turn. Untyped provider payloads never escape the adapter boundary; by the
/// time an outcome exists, the function-call arguments are known to be a
/// valid JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompletionOutcome {
    Text {
        text: String,
    },
    FunctionCall {
        request: FunctionCallRequest,
    },
    TextAndFunctionCall {
        text: String,
        request: FunctionCallRequest,
    },
}

impl CompletionOutcome {
    pub fn text(&self) -> Option<&str> {
        match self {
            CompletionOutcome::Text { text } => Some(text),
            CompletionOutcome::TextAndFunctionCall { text, .. } => Some(text),
            CompletionOutcome::FunctionCall { .. } => None,
        }
    }

    pub fn function_call(&self) -> Option<&FunctionCallRequest> {
        match self {
            CompletionOutcome::FunctionCall { request } => Some(request),
            CompletionOutcome::TextAndFunctionCall { request, .. } => Some(request),
            CompletionOutcome::Text { .. } => None,
        }
    }
}

/// How a single provider attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Timeout,
    RateLimited,
    Error,
    Malformed,
}

/// One provider attempt within a dispatch, kept for observability only
///
/// Never persisted; discarded with the dispatch that produced it.
#[derive(Debug, Clone)]
pub struct ProviderAttempt {
    pub provider: String,
    pub outcome: AttemptOutcome,
    pub latency: Duration,
    /// True when this attempt was the corrective re-prompt after malformed
    /// output from the same provider
    pub corrective: bool,
}

/// Successful dispatch result with its attempt trail
#[derive(Debug, Clone)]
pub struct RoutedCompletion {
    pub outcome: CompletionOutcome,
    pub provider_used: String,
    /// True when the completion did not come from the first-preference provider
    pub fallback_used: bool,
    pub attempts: Vec<ProviderAttempt>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> FunctionCallRequest {
        FunctionCallRequest {
            id: "fc_1".to_string(),
            name: "lookup_location".to_string(),
            arguments: serde_json::json!({ "truck_id": "42" }),
            origin_ordinal: 0,
        }
    }

    #[test]
    fn test_outcome_accessors() {
        let text = CompletionOutcome::Text {
            text: "hello".to_string(),
        };
        assert_eq!(text.text(), Some("hello"));
        assert!(text.function_call().is_none());

        let both = CompletionOutcome::TextAndFunctionCall {
            text: "checking".to_string(),
            request: sample_request(),
        };
        assert_eq!(both.text(), Some("checking"));
        assert_eq!(both.function_call().unwrap().name, "lookup_location");
    }

    #[test]
    fn test_outcome_serde_tag() {
        let outcome = CompletionOutcome::FunctionCall {
            request: sample_request(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["kind"], "function_call");
    }
}
