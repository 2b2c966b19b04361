//! WebSocket call handler
//!
//! One socket per call. Events are processed strictly in arrival order;
//! a dispatch (including its function round-trips) finishes before the
//! next event is read, so the session never sees interleaved turns.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};

use dispatch_agent_agent::{Bridge, BridgeState};
use dispatch_agent_core::{CallRegistry, SessionError};

use crate::calls::CallGuard;
use crate::state::AppState;
use crate::ServerError;

/// Events sent by the voice platform
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CallEvent {
    #[serde(rename = "call.started")]
    CallStarted { agent_id: String },

    #[serde(rename = "user.utterance")]
    UserUtterance { text: String },

    #[serde(rename = "call.ended")]
    CallEnded,
}

/// Events sent back to the voice platform
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "assistant.utterance")]
    AssistantUtterance { text: String },

    #[serde(rename = "error")]
    Error { code: String, message: String },
}

/// WebSocket upgrade for one call
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> Result<Response, ServerError> {
    let guard = state.calls.begin_call(&call_id)?;
    metrics::counter!("calls_started_total").increment(1);
    Ok(ws.on_upgrade(move |socket| handle_call(socket, state, call_id, guard)))
}

async fn handle_call(socket: WebSocket, state: AppState, call_id: String, guard: CallGuard) {
    let (mut sender, mut receiver) = socket.split();
    let mut bridge: Option<Bridge> = None;

    tracing::info!(call_id = %call_id, "Call connected");

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if !guard.touch() {
                    send_event(
                        &mut sender,
                        &ServerEvent::Error {
                            code: "call_timed_out".to_string(),
                            message: "Call was idle past the timeout".to_string(),
                        },
                    )
                    .await;
                    break;
                }

                let event = match serde_json::from_str::<CallEvent>(&text) {
                    Ok(event) => event,
                    Err(err) => {
                        send_event(
                            &mut sender,
                            &ServerEvent::Error {
                                code: "bad_event".to_string(),
                                message: err.to_string(),
                            },
                        )
                        .await;
                        continue;
                    }
                };

                let ended = handle_event(&state, &call_id, &mut bridge, event, &mut sender).await;
                if ended {
                    break;
                }
            }
            Ok(Message::Ping(data)) => {
                let _ = sender.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => break,
            Err(err) => {
                tracing::warn!(call_id = %call_id, error = %err, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    // Socket dropped without call.ended still flushes the transcript so the
    // post-processor gets its input.
    if let Some(mut live) = bridge.take() {
        if live.state() != BridgeState::Closed {
            tracing::info!(call_id = %call_id, "Socket closed mid-call, flushing transcript");
            finish_call(&state, &mut live).await;
        }
    }

    tracing::info!(call_id = %call_id, "Call disconnected");
}

/// Handle one event; returns true when the call is over
async fn handle_event(
    state: &AppState,
    call_id: &str,
    bridge: &mut Option<Bridge>,
    event: CallEvent,
    sender: &mut SplitSink<WebSocket, Message>,
) -> bool {
    match event {
        CallEvent::CallStarted { agent_id } => {
            if bridge.is_none() {
                let agent = match state.registry.get_agent_config(&agent_id).await {
                    Ok(agent) => agent,
                    Err(err) => {
                        send_event(
                            sender,
                            &ServerEvent::Error {
                                code: "unknown_agent".to_string(),
                                message: err.to_string(),
                            },
                        )
                        .await;
                        return false;
                    }
                };
                *bridge = Some(Bridge::new(
                    call_id,
                    agent,
                    state.router.session_scope(),
                    state.tools.clone(),
                    state.settings.bridge.clone(),
                ));
            }
            if let Some(live) = bridge.as_mut() {
                match live.on_call_started() {
                    Ok(emitted) => emit_all(sender, emitted).await,
                    Err(err) => send_session_error(sender, &err).await,
                }
            }
            false
        }
        CallEvent::UserUtterance { text } => match bridge.as_mut() {
            Some(live) => {
                match live.on_user_utterance(&text).await {
                    Ok(emitted) => emit_all(sender, emitted).await,
                    Err(err) => send_session_error(sender, &err).await,
                }
                false
            }
            None => {
                send_event(
                    sender,
                    &ServerEvent::Error {
                        code: "call_not_started".to_string(),
                        message: "user.utterance before call.started".to_string(),
                    },
                )
                .await;
                false
            }
        },
        CallEvent::CallEnded => {
            match bridge.as_mut() {
                Some(live) => finish_call(state, live).await,
                None => {
                    send_event(
                        sender,
                        &ServerEvent::Error {
                            code: "call_not_started".to_string(),
                            message: "call.ended before call.started".to_string(),
                        },
                    )
                    .await;
                }
            }
            true
        }
    }
}

/// Flush the transcript, persist it, and kick off post-call analysis
async fn finish_call(state: &AppState, bridge: &mut Bridge) {
    let transcript = match bridge.on_call_ended() {
        Ok(transcript) => transcript,
        Err(err) => {
            tracing::warn!(call_id = %bridge.call_id(), error = %err, "Call already closed");
            return;
        }
    };
    metrics::counter!("calls_ended_total").increment(1);

    let call_id = transcript.call_id.clone();
    if let Err(err) = state.registry.save_transcript(transcript).await {
        tracing::error!(call_id = %call_id, error = %err, "Failed to save transcript");
        return;
    }
    state.spawn_analysis(call_id);
}

async fn emit_all(sender: &mut SplitSink<WebSocket, Message>, texts: Vec<String>) {
    for text in texts {
        send_event(sender, &ServerEvent::AssistantUtterance { text }).await;
    }
}

async fn send_session_error(sender: &mut SplitSink<WebSocket, Message>, err: &SessionError) {
    let code = match err {
        SessionError::SessionClosed { .. } => "session_closed",
        SessionError::FunctionAlreadyResolved { .. } => "function_already_resolved",
        SessionError::NoPendingFunction => "no_pending_function",
        SessionError::FunctionAlreadyPending => "function_already_pending",
    };
    send_event(
        sender,
        &ServerEvent::Error {
            code: code.to_string(),
            message: err.to_string(),
        },
    )
    .await;
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &ServerEvent) {
    match serde_json::to_string(event) {
        Ok(json) => {
            if let Err(err) = sender.send(Message::Text(json)).await {
                tracing::debug!(error = %err, "Failed to send event");
            }
        }
        Err(err) => tracing::error!(error = %err, "Failed to encode server event"),
    }
}
