//! HTTP surface
//!
//! Besides the per-call WebSocket this exposes the platform webhook that
//! re-triggers post-call analysis, plus health and metrics endpoints.

use axum::{
    extract::{Json, State},
    http::{HeaderValue, Method, StatusCode},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use dispatch_agent_core::{CallRegistry, Transcript};

use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::websocket::ws_handler;
use crate::ServerError;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(
        state.settings.server.cors_enabled,
        &state.settings.server.cors_origins,
    );

    Router::new()
        .route("/ws/:call_id", get(ws_handler))
        .route("/webhook/call-ended", post(call_ended_webhook))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(enabled: bool, origins: &[String]) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (not for production)");
        return CorsLayer::permissive();
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            let value = origin.parse::<HeaderValue>().ok();
            if value.is_none() {
                tracing::warn!(origin = %origin, "Invalid CORS origin, skipping");
            }
            value
        })
        .collect();

    if parsed.is_empty() {
        tracing::info!("No valid CORS origins configured, browser origins are blocked");
        return CorsLayer::new()
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any);
    }

    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

#[derive(Debug, Deserialize)]
struct CallEndedWebhook {
    call_id: String,
    /// Full transcript from the platform; the stored one is used when omitted
    #[serde(default)]
    transcript: Option<Transcript>,
}

/// Platform webhook fired after a call ends
///
/// Responds 202 immediately; the analysis runs in a spawned task. A
/// transcript in the payload is persisted first so calls that never flushed
/// locally still get analyzed.
async fn call_ended_webhook(
    State(state): State<AppState>,
    Json(payload): Json<CallEndedWebhook>,
) -> Result<(StatusCode, Json<serde_json::Value>), ServerError> {
    tracing::info!(call_id = %payload.call_id, "Call-ended webhook received");

    if let Some(mut transcript) = payload.transcript {
        if transcript.call_id != payload.call_id {
            tracing::warn!(
                call_id = %payload.call_id,
                transcript_call_id = %transcript.call_id,
                "Webhook transcript id differs from envelope, envelope id wins"
            );
            transcript.call_id = payload.call_id.clone();
        }
        state.registry.save_transcript(transcript).await?;
    }

    state.spawn_analysis(payload.call_id.clone());

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "status": "accepted",
            "call_id": payload.call_id,
        })),
    ))
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "active_calls": state.calls.count(),
        "providers": state.router.provider_names(),
        "tools": state.tools.len(),
    }))
}

async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let providers = state.router.provider_names();
    let ready = !providers.is_empty() && !state.tools.is_empty();
    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(serde_json::json!({
            "status": if ready { "ready" } else { "not_ready" },
            "providers": providers,
            "tools": state.tools.len(),
        })),
    )
}
