//! Contracts at the seams: provider adapters and the call registry

mod provider;
mod registry;

pub use provider::LlmProvider;
pub use registry::CallRegistry;
