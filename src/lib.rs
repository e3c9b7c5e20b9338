// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod ingest;
pub mod json_extract;
pub mod metrics;
pub mod orchestrator;
pub mod poll;
pub mod report;
pub mod scheduler;

// ---- Re-exports for stable public API ----
pub use analyze::ai_adapter;
pub use analyze::SummarizationAgent;
pub use config::Settings;
pub use error::{ConfigError, GenerationError, HandleError, SearchError};
pub use ingest::types::{EmptyReason, FetchOutcome, PostRecord};
pub use ingest::SearchAdapter;
pub use orchestrator::Orchestrator;
pub use poll::{Draft, EmptyDraft, PollDraft};
pub use report::{ReportSink, StdoutSink, TickReport};
pub use scheduler::{Scheduler, SchedulerState};
