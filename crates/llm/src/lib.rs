//! LLM provider adapters and the fallback router
//!
//! Features:
//! - OpenAI-compatible chat-completions adapter (Groq, OpenAI)
//! - Native function calling (`tools` / `tool_choice: "auto"`)
//! - Hard per-completion deadlines
//! - Deterministic preference-order fallback with a single corrective
//!   re-prompt on malformed output

pub mod factory;
pub mod openai_compat;
pub mod router;

pub use factory::{build_providers, build_router};
pub use openai_compat::{OpenAiCompatConfig, OpenAiCompatProvider};
pub use router::FallbackRouter;
