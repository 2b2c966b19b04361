//! OpenAI-compatible chat-completions adapter
//!
//! Both Groq and OpenAI expose the same wire format; one adapter serves both
//! as two configurations. Function calling uses the native `tools` array
//! with `tool_choice: "auto"`. Only the first tool call of a choice is
//! honored.
//!
//! The adapter enforces a hard per-completion deadline on top of the
//! client-level timeout; expiry maps to `ProviderError::Unavailable` so the
//! router can fail over without blocking the call.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use dispatch_agent_core::{
    CompletionOutcome, CompletionRequest, ConversationTurn, FunctionCallRequest, FunctionSchema,
    LlmProvider, ProviderError, TurnContent, TurnRole,
};

/// Configuration for one OpenAI-compatible endpoint
#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    /// Provider name used in attempt records and logs
    pub name: String,
    pub api_key: String,
    /// Base URL without the `/chat/completions` suffix
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Hard per-completion deadline
    pub deadline: Duration,
}

impl OpenAiCompatConfig {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_key: String::new(),
            base_url: base_url.into(),
            model: model.into(),
            temperature: 0.7,
            max_tokens: 150,
            deadline: Duration::from_millis(8000),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self.max_tokens = max_tokens;
        self
    }
}

/// Chat-completions provider adapter
pub struct OpenAiCompatProvider {
    config: OpenAiCompatConfig,
    client: Client,
}

impl OpenAiCompatProvider {
    pub fn new(config: OpenAiCompatConfig) -> Result<Self, ProviderError> {
        // Client timeout is a backstop; the real bound is the deadline in
        // complete().
        let client = Client::builder()
            .timeout(config.deadline + Duration::from_secs(2))
            .build()
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        Ok(Self { config, client })
    }

    async fn execute(&self, request: &CompletionRequest) -> Result<CompletionOutcome, ProviderError> {
        let body = ChatRequest {
            model: self.config.model.clone(),
            messages: convert_history(&request.history),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            tools: convert_schemas(&request.function_schemas),
            tool_choice: if request.function_schemas.is_empty() {
                None
            } else {
                Some("auto".to_string())
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Unavailable(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedOutput(format!("undecodable body: {}", e)))?;

        parse_response(parsed, &request.function_schemas)
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionOutcome, ProviderError> {
        match tokio::time::timeout(self.config.deadline, self.execute(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Unavailable(format!(
                "deadline of {:?} expired",
                self.config.deadline
            ))),
        }
    }

    fn name(&self) -> &str {
        &self.config.name
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatTool {
    #[serde(rename = "type")]
    kind: String,
    function: ChatFunctionDef,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatFunctionDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: ChatFunctionInvocation,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatFunctionInvocation {
    name: String,
    /// JSON-encoded argument object, per the wire format
    arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    #[serde(default)]
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ChatToolCall>>,
}

// ============================================================================
// Conversions
// ============================================================================

fn convert_history(history: &[ConversationTurn]) -> Vec<ChatMessage> {
    history
        .iter()
        .map(|turn| match &turn.content {
            TurnContent::Text { text } => ChatMessage {
                role: match turn.role {
                    TurnRole::System => "system",
                    TurnRole::User => "user",
                    TurnRole::Assistant => "assistant",
                    // A text turn never carries the function role, but map it
                    // safely anyway
                    TurnRole::Function => "tool",
                },
                content: Some(text.clone()),
                tool_calls: None,
                tool_call_id: None,
            },
            TurnContent::FunctionCall { request } => ChatMessage {
                role: "assistant",
                content: None,
                tool_calls: Some(vec![ChatToolCall {
                    id: request.id.clone(),
                    kind: "function".to_string(),
                    function: ChatFunctionInvocation {
                        name: request.name.clone(),
                        arguments: request.arguments.to_string(),
                    },
                }]),
                tool_call_id: None,
            },
            TurnContent::FunctionResult { result } => ChatMessage {
                role: "tool",
                content: Some(result.payload.to_string()),
                tool_calls: None,
                tool_call_id: Some(result.request_id.clone()),
            },
        })
        .collect()
}

fn convert_schemas(schemas: &[FunctionSchema]) -> Option<Vec<ChatTool>> {
    if schemas.is_empty() {
        return None;
    }
    Some(
        schemas
            .iter()
            .map(|s| ChatTool {
                kind: "function".to_string(),
                function: ChatFunctionDef {
                    name: s.name.clone(),
                    description: s.description.clone(),
                    parameters: s.parameters.clone(),
                },
            })
            .collect(),
    )
}

/// Validate and reshape a raw response into a `CompletionOutcome`
///
/// Rejections here become `MalformedOutput` so the router can issue its
/// single corrective re-prompt.
fn parse_response(
    response: ChatResponse,
    known_schemas: &[FunctionSchema],
) -> Result<CompletionOutcome, ProviderError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::MalformedOutput("empty choice set".to_string()))?;

    let text = choice
        .message
        .content
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    // Only the first tool call is honored
    let call = choice
        .message
        .tool_calls
        .and_then(|calls| calls.into_iter().next());

    let request = match call {
        Some(call) => {
            if !known_schemas.iter().any(|s| s.name == call.function.name) {
                return Err(ProviderError::MalformedOutput(format!(
                    "unknown function '{}'",
                    call.function.name
                )));
            }

            let arguments: serde_json::Value = serde_json::from_str(&call.function.arguments)
                .map_err(|e| {
                    ProviderError::MalformedOutput(format!(
                        "function arguments are not valid JSON: {}",
                        e
                    ))
                })?;
            if !arguments.is_object() {
                return Err(ProviderError::MalformedOutput(
                    "function arguments are not a JSON object".to_string(),
                ));
            }

            Some(FunctionCallRequest {
                id: call.id,
                name: call.function.name,
                arguments,
                origin_ordinal: 0, // assigned by the session on append
            })
        }
        None => None,
    };

    match (text, request) {
        (Some(text), None) => Ok(CompletionOutcome::Text { text }),
        (None, Some(request)) => Ok(CompletionOutcome::FunctionCall { request }),
        (Some(text), Some(request)) => {
            Ok(CompletionOutcome::TextAndFunctionCall { text, request })
        }
        (None, None) => Err(ProviderError::MalformedOutput(
            "choice carries neither text nor a tool call".to_string(),
        )),
    }
}
