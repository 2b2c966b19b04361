//! Configuration for the dispatch agent
//!
//! Settings are layered: `config/default.yaml`, then `config/{env}.yaml`,
//! then `DISPATCH_AGENT__`-prefixed environment variables. A single
//! read-only `Settings` is constructed at process start and passed by
//! reference into the router and adapters; there is no mutable global state.

mod settings;

pub use settings::{
    load_settings, AnalysisConfig, BridgeConfig, ObservabilityConfig, ProviderEndpoint,
    ProviderSettings, RouterConfig, RuntimeEnvironment, ServerConfig, Settings,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
