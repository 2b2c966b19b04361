//! Post-call transcript analysis
//!
//! Turns a finished call transcript into a structured `CallAnalysis`
//! record: sentiment, quality score, key topics, goal outcome, and a short
//! summary. Runs asynchronously after the call ends; failures here never
//! touch the live path.

mod extractor;
mod heuristics;

pub use extractor::TranscriptAnalyzer;
