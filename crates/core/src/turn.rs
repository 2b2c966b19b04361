//! Conversation turns and transcripts
//!
//! A call's history is an append-only sequence of turns with strictly
//! increasing ordinals. Turns are immutable once appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// System instruction
    System,
    /// Caller (driver) input
    User,
    /// Agent output, including function-call requests
    Assistant,
    /// Resolved function result fed back to the provider
    Function,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::System => "system",
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
            TurnRole::Function => "function",
        }
    }
}

/// Payload of a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnContent {
    /// Plain utterance text
    Text { text: String },
    /// Provider-initiated function invocation
    FunctionCall { request: FunctionCallRequest },
    /// Result of an executed function call
    FunctionResult { result: FunctionCallResult },
}

impl TurnContent {
    /// Text of the turn, if it carries any
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TurnContent::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// One message unit in a conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: TurnContent,
    /// Position in the session history, strictly increasing from 0
    pub ordinal: u64,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: TurnRole, content: TurnContent, ordinal: u64) -> Self {
        Self {
            role,
            content,
            ordinal,
            timestamp: Utc::now(),
        }
    }

    /// Text turn constructor
    pub fn text(role: TurnRole, text: impl Into<String>, ordinal: u64) -> Self {
        Self::new(
            role,
            TurnContent::Text {
                text: text.into(),
            },
            ordinal,
        )
    }
}

/// Declaration of a callable function exposed to the provider
///
/// `parameters` is a JSON Schema object, passed through to the provider
/// verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Provider-initiated request to invoke a named function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallRequest {
    /// Provider-assigned call id, echoed back in the result turn
    pub id: String,
    pub name: String,
    /// Argument payload; always a JSON object, validated at the adapter
    pub arguments: serde_json::Value,
    /// Ordinal of the assistant turn that carried this request
    #[serde(default)]
    pub origin_ordinal: u64,
}

impl FunctionCallRequest {
    /// String argument accessor
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }

    /// Integer argument accessor
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.arguments.get(key).and_then(|v| v.as_i64())
    }
}

/// Outcome of executing a function call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallResult {
    /// Id of the request this resolves
    pub request_id: String,
    pub name: String,
    pub payload: serde_json::Value,
    pub success: bool,
}

impl FunctionCallResult {
    pub fn ok(request: &FunctionCallRequest, payload: serde_json::Value) -> Self {
        Self {
            request_id: request.id.clone(),
            name: request.name.clone(),
            payload,
            success: true,
        }
    }

    pub fn failed(request: &FunctionCallRequest, message: impl Into<String>) -> Self {
        Self {
            request_id: request.id.clone(),
            name: request.name.clone(),
            payload: serde_json::json!({ "error": message.into() }),
            success: false,
        }
    }
}

/// Flushed representation of a finished call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub call_id: String,
    pub turns: Vec<ConversationTurn>,
    pub ended_at: DateTime<Utc>,
}

impl Transcript {
    pub fn new(call_id: impl Into<String>, turns: Vec<ConversationTurn>) -> Self {
        Self {
            call_id: call_id.into(),
            turns,
            ended_at: Utc::now(),
        }
    }

    /// A transcript is usable for analysis only if it carries spoken content
    pub fn has_spoken_content(&self) -> bool {
        self.turns.iter().any(|t| {
            matches!(t.role, TurnRole::User | TurnRole::Assistant)
                && t.content.as_text().map_or(false, |s| !s.trim().is_empty())
        })
    }

    /// Render as plain text for extraction prompts
    pub fn render(&self) -> String {
        let mut out = String::new();
        for turn in &self.turns {
            match &turn.content {
                TurnContent::Text { text } => {
                    out.push_str(turn.role.as_str());
                    out.push_str(": ");
                    out.push_str(text);
                    out.push('\n');
                }
                TurnContent::FunctionCall { request } => {
                    out.push_str(&format!(
                        "assistant: [called {}({})]\n",
                        request.name, request.arguments
                    ));
                }
                TurnContent::FunctionResult { result } => {
                    out.push_str(&format!(
                        "function: [{} -> {}]\n",
                        result.name, result.payload
                    ));
                }
            }
        }
        out
    }

    /// User utterances only, for heuristic fallbacks
    pub fn user_texts(&self) -> Vec<&str> {
        self.turns
            .iter()
            .filter(|t| t.role == TurnRole::User)
            .filter_map(|t| t.content.as_text())
            .collect()
    }
}
