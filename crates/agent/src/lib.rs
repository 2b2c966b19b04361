//! Real-time conversation bridge
//!
//! Sits between the voice platform's event stream and the provider router:
//! per-call session state, the bridge state machine, and synchronous
//! function execution.

pub mod bridge;
pub mod session;

pub use bridge::{Bridge, BridgeState};
pub use session::ConversationSession;
