//! Dispatch tools
//!
//! Functions the provider can invoke mid-call, executed synchronously by the
//! bridge under a bounded timeout. The registry owns the name-to-tool map
//! and exposes the function schemas advertised to providers.

pub mod dispatch;
pub mod registry;

pub use dispatch::{create_default_registry, LogDriverStatus, LookupLocation, LookupLoadDetails};
pub use registry::{DispatchTool, ToolError, ToolRegistry};
