//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation, warnings only
    #[default]
    Development,
    /// Staging mode - stricter validation
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream LLM provider endpoints and credentials
    #[serde(default)]
    pub providers: ProviderSettings,

    /// Fallback router policy
    #[serde(default)]
    pub router: RouterConfig,

    /// Real-time bridge behavior
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Post-call analysis behavior
    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_providers()?;
        self.validate_bridge()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if self.server.max_calls == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_calls".to_string(),
                message: "Must allow at least 1 concurrent call".to_string(),
            });
        }

        if self.environment.is_production()
            && self.server.cors_enabled
            && self.server.cors_origins.is_empty()
        {
            tracing::warn!(
                "CORS is enabled in production but no origins are configured. \
                 This may block legitimate requests."
            );
        }

        Ok(())
    }

    fn validate_providers(&self) -> Result<(), ConfigError> {
        if self.router.preference.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "router.preference".to_string(),
                message: "At least one provider must be configured".to_string(),
            });
        }

        for name in &self.router.preference {
            let endpoint = match name.as_str() {
                "groq" => &self.providers.groq,
                "openai" => &self.providers.openai,
                other => {
                    return Err(ConfigError::InvalidValue {
                        field: "router.preference".to_string(),
                        message: format!("Unknown provider '{}'", other),
                    })
                }
            };

            if self.environment.is_strict() && endpoint.api_key.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("providers.{}.api_key", name),
                    message: format!(
                        "API key is required in {:?} mode",
                        self.environment
                    ),
                });
            }
        }

        if self.providers.request_timeout_ms < 500 {
            return Err(ConfigError::InvalidValue {
                field: "providers.request_timeout_ms".to_string(),
                message: "Deadline too low (minimum 500ms)".to_string(),
            });
        }

        if self.providers.request_timeout_ms > 30_000 {
            return Err(ConfigError::InvalidValue {
                field: "providers.request_timeout_ms".to_string(),
                message: "Deadline too high for a live call (maximum 30000ms)".to_string(),
            });
        }

        Ok(())
    }

    fn validate_bridge(&self) -> Result<(), ConfigError> {
        if self.bridge.tool_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "bridge.tool_timeout_ms".to_string(),
                message: "Tool timeout must be at least 1ms".to_string(),
            });
        }

        if self.bridge.degraded_utterance.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "bridge.degraded_utterance".to_string(),
                message: "Degraded utterance cannot be empty".to_string(),
            });
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum concurrent live calls
    #[serde(default = "default_max_calls")]
    pub max_calls: usize,

    /// Idle call timeout before the sweeper discards the session, seconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout_seconds: u64,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_max_calls() -> usize {
    500
}
fn default_call_timeout() -> u64 {
    600
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_calls: default_max_calls(),
            call_timeout_seconds: default_call_timeout(),
            cors_enabled: default_true(),
            // Empty by default - must be explicitly configured for production
            cors_origins: Vec::new(),
        }
    }
}

/// One upstream provider endpoint (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    #[serde(default)]
    pub api_key: String,

    pub base_url: String,

    pub model: String,
}

/// Provider adapter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_groq_endpoint")]
    pub groq: ProviderEndpoint,

    #[serde(default = "default_openai_endpoint")]
    pub openai: ProviderEndpoint,

    /// Hard per-completion deadline, bounded by the conversational latency
    /// budget rather than the provider's own default
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_groq_endpoint() -> ProviderEndpoint {
    ProviderEndpoint {
        api_key: String::new(),
        base_url: "https://api.groq.com/openai/v1".to_string(),
        model: "llama-3.3-70b-versatile".to_string(),
    }
}

fn default_openai_endpoint() -> ProviderEndpoint {
    ProviderEndpoint {
        api_key: String::new(),
        base_url: "https://api.openai.com/v1".to_string(),
        model: "gpt-4o-mini".to_string(),
    }
}

fn default_request_timeout_ms() -> u64 {
    8000
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    150
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            groq: default_groq_endpoint(),
            openai: default_openai_endpoint(),
            request_timeout_ms: default_request_timeout_ms(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Fallback router policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Ordered provider preference; iterated deterministically
    #[serde(default = "default_preference")]
    pub preference: Vec<String>,

    /// When true, a provider that failed hard stays demoted for the rest of
    /// the session instead of being retried on the next dispatch
    #[serde(default)]
    pub sticky_fallback: bool,
}

fn default_preference() -> Vec<String> {
    vec!["groq".to_string(), "openai".to_string()]
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            preference: default_preference(),
            sticky_fallback: false,
        }
    }
}

/// Real-time bridge behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Bounded timeout for synchronous function execution, milliseconds
    #[serde(default = "default_tool_timeout_ms")]
    pub tool_timeout_ms: u64,

    /// Fixed apology/redirect emitted when every provider fails mid-call
    #[serde(default = "default_degraded_utterance")]
    pub degraded_utterance: String,

    /// Cap on function-call chains within one inbound event
    #[serde(default = "default_max_function_hops")]
    pub max_function_hops: u32,
}

fn default_tool_timeout_ms() -> u64 {
    5000
}

fn default_degraded_utterance() -> String {
    "I'm having trouble accessing the call information right now. \
     Please hold while I connect you to a dispatcher."
        .to_string()
}

fn default_max_function_hops() -> u32 {
    3
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            tool_timeout_ms: default_tool_timeout_ms(),
            degraded_utterance: default_degraded_utterance(),
            max_function_hops: default_max_function_hops(),
        }
    }
}

/// Post-call analysis behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Maximum key topics retained per analysis
    #[serde(default = "default_max_topics")]
    pub max_topics: usize,

    /// Summary truncation length, chars
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,
}

fn default_max_topics() -> usize {
    5
}
fn default_summary_max_chars() -> usize {
    200
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_topics: default_max_topics(),
            summary_max_chars: default_summary_max_chars(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (DISPATCH_AGENT__ prefix)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("DISPATCH_AGENT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
