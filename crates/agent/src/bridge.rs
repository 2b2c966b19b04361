//! Real-time bridge state machine
//!
//! One bridge per call, driven strictly sequentially by inbound events. A
//! function-call result must be appended before the next dispatch, so only
//! one dispatch is ever in flight per session; the state machine enforces
//! this without locking.
//!
//! Failure policy for a live call: provider exhaustion is absorbed into a
//! fixed degraded utterance. A voice call must never hang or hear a raw
//! error.

use std::sync::Arc;

use dispatch_agent_config::BridgeConfig;
use dispatch_agent_core::{
    AgentConfig, CompletionOutcome, CompletionRequest, FunctionCallResult, FunctionSchema,
    RouterError, SessionError, Transcript, TurnRole,
};
use dispatch_agent_llm::FallbackRouter;
use dispatch_agent_tools::ToolRegistry;

use crate::session::ConversationSession;

/// Bridge lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Session not yet started; waiting for the first inbound event
    AwaitingFirstTurn,
    /// Conversing; each inbound utterance triggers one dispatch
    Streaming,
    /// A function call is executing; no dispatch may start
    FunctionPending,
    /// Call ended; session flushed and further events rejected
    Closed,
}

/// Per-call duplex channel handler
pub struct Bridge {
    state: BridgeState,
    session: ConversationSession,
    router: FallbackRouter,
    tools: Arc<ToolRegistry>,
    schemas: Vec<FunctionSchema>,
    agent: AgentConfig,
    config: BridgeConfig,
}

impl Bridge {
    pub fn new(
        call_id: impl Into<String>,
        agent: AgentConfig,
        router: FallbackRouter,
        tools: Arc<ToolRegistry>,
        config: BridgeConfig,
    ) -> Self {
        let schemas = tools.schemas_for(&agent.enabled_functions);
        Self {
            state: BridgeState::AwaitingFirstTurn,
            session: ConversationSession::new(call_id),
            router,
            tools,
            schemas,
            agent,
            config,
        }
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn call_id(&self) -> &str {
        self.session.call_id()
    }

    pub fn turn_count(&self) -> usize {
        self.session.turn_count()
    }

    /// Handle `call.started`: seed the system turn and emit the greeting
    pub fn on_call_started(&mut self) -> Result<Vec<String>, SessionError> {
        match self.state {
            BridgeState::Closed => {
                return Err(SessionError::SessionClosed {
                    call_id: self.session.call_id().to_string(),
                })
            }
            BridgeState::AwaitingFirstTurn => {}
            // Duplicate start while live: ignore rather than reset state
            _ => return Ok(Vec::new()),
        }

        self.session
            .append_text(TurnRole::System, self.agent.system_prompt.clone());

        let mut emitted = Vec::new();
        if let Some(greeting) = self.agent.greeting.clone() {
            self.session.append_text(TurnRole::Assistant, greeting.clone());
            emitted.push(greeting);
        }

        self.state = BridgeState::Streaming;
        tracing::info!(call_id = %self.session.call_id(), "Call started");
        Ok(emitted)
    }

    /// Handle one inbound user utterance; returns the utterances to emit
    ///
    /// A function-call outcome executes the tool synchronously and
    /// re-dispatches immediately without waiting for a new inbound event.
    pub async fn on_user_utterance(&mut self, text: &str) -> Result<Vec<String>, SessionError> {
        match self.state {
            BridgeState::Closed => {
                return Err(SessionError::SessionClosed {
                    call_id: self.session.call_id().to_string(),
                })
            }
            // Session is created on the first inbound event for a call id;
            // an utterance arriving before call.started seeds the session.
            BridgeState::AwaitingFirstTurn => {
                self.on_call_started()?;
            }
            _ => {}
        }

        self.session.append_text(TurnRole::User, text);

        let mut emitted = Vec::new();
        let mut hops: u32 = 0;

        loop {
            // Past the hop cap, withhold schemas so the provider must answer
            // in text; a runaway function chain cannot stall the caller.
            let schemas = if hops >= self.config.max_function_hops {
                Vec::new()
            } else {
                self.schemas.clone()
            };

            let request = CompletionRequest::new(self.session.snapshot_history(), schemas);

            let routed = match self.router.dispatch(&request).await {
                Ok(routed) => routed,
                Err(RouterError::AllProvidersExhausted { attempts, .. }) => {
                    tracing::error!(
                        call_id = %self.session.call_id(),
                        attempts,
                        "All providers exhausted; emitting degraded utterance"
                    );
                    metrics::counter!("bridge_degraded_utterances_total").increment(1);

                    let degraded = self.config.degraded_utterance.clone();
                    self.session.append_text(TurnRole::Assistant, degraded.clone());
                    emitted.push(degraded);
                    self.state = BridgeState::Streaming;
                    return Ok(emitted);
                }
            };

            match routed.outcome {
                CompletionOutcome::Text { text } => {
                    self.session.append_text(TurnRole::Assistant, text.clone());
                    emitted.push(text);
                    self.state = BridgeState::Streaming;
                    return Ok(emitted);
                }
                CompletionOutcome::FunctionCall { request } => {
                    self.run_function(request).await?;
                    hops += 1;
                }
                CompletionOutcome::TextAndFunctionCall { text, request } => {
                    // The prose half reaches the caller before the lookup
                    // completes.
                    self.session.append_text(TurnRole::Assistant, text.clone());
                    emitted.push(text);
                    self.run_function(request).await?;
                    hops += 1;
                }
            }
        }
    }

    /// Handle `call.ended`: flush the session and close
    ///
    /// Idempotency lives in the error: a second `call.ended` for the same
    /// call id is rejected with `SessionClosed`, never processed twice.
    pub fn on_call_ended(&mut self) -> Result<Transcript, SessionError> {
        if self.state == BridgeState::Closed {
            return Err(SessionError::SessionClosed {
                call_id: self.session.call_id().to_string(),
            });
        }

        self.state = BridgeState::Closed;
        let transcript = self.session.to_transcript();
        tracing::info!(
            call_id = %self.session.call_id(),
            turns = transcript.turns.len(),
            "Call ended, session flushed"
        );
        Ok(transcript)
    }

    /// Execute one requested function synchronously under the bounded
    /// timeout, appending request and result turns
    async fn run_function(
        &mut self,
        request: dispatch_agent_core::FunctionCallRequest,
    ) -> Result<(), SessionError> {
        self.session.append_function_call(request.clone())?;
        self.state = BridgeState::FunctionPending;

        tracing::debug!(
            call_id = %self.session.call_id(),
            function = %request.name,
            "Executing function call"
        );

        let result = match self.tools.execute(&request.name, &request.arguments).await {
            Ok(payload) => FunctionCallResult::ok(&request, payload),
            Err(err) => {
                // The provider still sees a resolved result; a tool failure
                // must not leave the call stuck in FunctionPending.
                tracing::warn!(
                    call_id = %self.session.call_id(),
                    function = %request.name,
                    error = %err,
                    "Function execution failed"
                );
                FunctionCallResult::failed(&request, err.to_string())
            }
        };

        self.session.record_function_result(result)?;
        self.state = BridgeState::Streaming;
        Ok(())
    }
}
