// src/analyze/mod.rs
// Summarization pipeline: completion provider adapter, prompt, draft parsing/validation.

pub mod ai_adapter;
pub mod prompt;
pub mod summarize;

pub use summarize::{parse_draft, SummarizationAgent};
