//! Shared application state

use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusHandle;

use dispatch_agent_analysis::TranscriptAnalyzer;
use dispatch_agent_config::Settings;
use dispatch_agent_core::CallRegistry;
use dispatch_agent_llm::FallbackRouter;
use dispatch_agent_tools::{create_default_registry, ToolRegistry};

use crate::calls::CallManager;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub router: Arc<FallbackRouter>,
    pub tools: Arc<ToolRegistry>,
    pub registry: Arc<dyn CallRegistry>,
    pub analyzer: Arc<TranscriptAnalyzer>,
    pub calls: Arc<CallManager>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        router: FallbackRouter,
        registry: Arc<dyn CallRegistry>,
    ) -> Self {
        let tools = Arc::new(create_default_registry(Duration::from_millis(
            settings.bridge.tool_timeout_ms,
        )));
        let calls = Arc::new(CallManager::new(
            settings.server.max_calls,
            Duration::from_secs(settings.server.call_timeout_seconds),
        ));
        let analyzer = Arc::new(TranscriptAnalyzer::new(
            router.session_scope(),
            registry.clone(),
            settings.analysis.clone(),
        ));

        Self {
            settings: Arc::new(settings),
            router: Arc::new(router),
            tools,
            registry,
            analyzer,
            calls,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Run post-call analysis off the request path
    pub fn spawn_analysis(&self, call_id: String) {
        let analyzer = self.analyzer.clone();
        tokio::spawn(async move {
            match analyzer.analyze_call(&call_id).await {
                Ok(analysis) => tracing::info!(
                    call_id = %call_id,
                    quality_score = analysis.quality_score,
                    "Post-call analysis complete"
                ),
                Err(err) => tracing::warn!(
                    call_id = %call_id,
                    error = %err,
                    "Post-call analysis failed"
                ),
            }
        });
    }
}
