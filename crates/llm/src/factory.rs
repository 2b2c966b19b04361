//! Provider construction from settings

use std::sync::Arc;
use std::time::Duration;

use dispatch_agent_config::{ProviderEndpoint, Settings};
use dispatch_agent_core::{LlmProvider, ProviderError};

use crate::openai_compat::{OpenAiCompatConfig, OpenAiCompatProvider};
use crate::router::FallbackRouter;

/// Build the configured providers in declared preference order
pub fn build_providers(settings: &Settings) -> Result<Vec<Arc<dyn LlmProvider>>, ProviderError> {
    let mut providers: Vec<Arc<dyn LlmProvider>> = Vec::new();

    for name in &settings.router.preference {
        let endpoint = match name.as_str() {
            "groq" => &settings.providers.groq,
            "openai" => &settings.providers.openai,
            other => {
                // Settings::validate rejects unknown names; tolerate here by
                // skipping so a stale config cannot take the process down.
                tracing::warn!(provider = other, "Skipping unknown provider in preference list");
                continue;
            }
        };

        providers.push(Arc::new(build_provider(name, endpoint, settings)?));
    }

    Ok(providers)
}

fn build_provider(
    name: &str,
    endpoint: &ProviderEndpoint,
    settings: &Settings,
) -> Result<OpenAiCompatProvider, ProviderError> {
    let config = OpenAiCompatConfig::new(name, endpoint.base_url.clone(), endpoint.model.clone())
        .with_api_key(endpoint.api_key.clone())
        .with_deadline(Duration::from_millis(settings.providers.request_timeout_ms))
        .with_sampling(settings.providers.temperature, settings.providers.max_tokens);

    OpenAiCompatProvider::new(config)
}

/// Build the fallback router from settings
pub fn build_router(settings: &Settings) -> Result<FallbackRouter, ProviderError> {
    let providers = build_providers(settings)?;
    Ok(FallbackRouter::new(
        providers,
        settings.router.sticky_fallback,
    ))
}
