//! Dispatch agent server
//!
//! WebSocket surface for live calls plus the post-call webhook. One socket
//! per call; events on a call are handled strictly in order.

pub mod calls;
pub mod http;
pub mod metrics;
pub mod state;
pub mod websocket;

pub use calls::CallManager;
pub use http::create_router;
pub use metrics::init_metrics;
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use dispatch_agent_core::RegistryError;

/// Server-level errors
///
/// Session errors never surface here; they go out as WebSocket `error`
/// events on the live socket.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Call capacity reached")]
    CapacityReached,

    #[error("Call already active: {0}")]
    DuplicateCall(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::CapacityReached => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::DuplicateCall(_) => StatusCode::CONFLICT,
            ServerError::Registry(RegistryError::AgentNotFound(_)) => StatusCode::NOT_FOUND,
            ServerError::Registry(RegistryError::TranscriptNotFound(_)) => StatusCode::NOT_FOUND,
            ServerError::Registry(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
