//! Dispatch agent server entry point

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use dispatch_agent_config::{load_settings, Settings};
use dispatch_agent_core::AgentConfig;
use dispatch_agent_llm::build_router;
use dispatch_agent_persistence::InMemoryCallRegistry;
use dispatch_agent_server::{create_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Priority: env vars > config/{env}.yaml > config/default.yaml > defaults
    let env = std::env::var("DISPATCH_AGENT_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => {
            // Tracing not yet initialized
            eprintln!(
                "Loaded configuration (env: {})",
                env.as_deref().unwrap_or("default")
            );
            settings
        }
        Err(err) => {
            eprintln!("Warning: failed to load config: {err}. Using defaults.");
            Settings::default()
        }
    };
    settings.validate()?;

    init_tracing(&settings);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?settings.environment,
        "Starting dispatch agent server"
    );

    let metrics_handle = if settings.observability.metrics_enabled {
        let handle = init_metrics()?;
        tracing::info!("Prometheus metrics exposed at /metrics");
        Some(handle)
    } else {
        None
    };

    let router = build_router(&settings)?;
    tracing::info!(providers = ?router.provider_names(), "Provider router ready");

    let registry = Arc::new(InMemoryCallRegistry::new());
    seed_default_agent(&registry);

    let mut state = AppState::new(settings.clone(), router, registry);
    if let Some(handle) = metrics_handle {
        state = state.with_metrics(handle);
    }

    let _sweep_shutdown = state.calls.start_sweep_task(Duration::from_secs(60));

    let app = create_router(state);
    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    tracing::info!(%addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Default dispatch agent until agent configs come from real storage
fn seed_default_agent(registry: &InMemoryCallRegistry) {
    registry.put_agent_config(AgentConfig {
        agent_id: "dispatch".to_string(),
        system_prompt: "You are a dispatcher for a logistics company handling driver \
             check-in calls. Keep replies short and speakable. Use the provided \
             functions to look up trucks, loads, and to log driver status; never \
             guess locations or load details."
            .to_string(),
        greeting: Some("Dispatch here. How can I help?".to_string()),
        enabled_functions: vec![
            "lookup_location".to_string(),
            "get_load_details".to_string(),
            "log_driver_status".to_string(),
        ],
    });
}

fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &settings.observability.log_level;
        format!("dispatch_agent={level},tower_http=info").into()
    });

    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!(error = %err, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
