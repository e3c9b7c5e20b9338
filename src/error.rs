// src/error.rs
//! Error taxonomy shared by the search, summarization and orchestration layers.

use thiserror::Error;

/// Startup configuration problems. Fatal: the scheduler never starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting: {key}")]
    Missing { key: &'static str },

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("no handles configured (set X_HANDLES or HANDLES_PATH)")]
    NoHandles,

    #[error("failed to load handle list: {0:#}")]
    HandleFile(#[source] anyhow::Error),
}

/// Failures of the search capability for one handle.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("search provider unreachable: {0}")]
    Unreachable(String),

    #[error("search request timed out")]
    Timeout,

    #[error("search provider rejected credentials (HTTP {status})")]
    Auth { status: u16 },

    #[error("search provider returned HTTP {status}")]
    Status { status: u16 },

    #[error("malformed search response: {0}")]
    Malformed(String),
}

impl SearchError {
    /// Whether a bounded retry may help.
    pub fn is_transient(&self) -> bool {
        match self {
            SearchError::Unreachable(_) | SearchError::Timeout => true,
            SearchError::Status { status } => *status == 429 || *status >= 500,
            SearchError::Auth { .. } | SearchError::Malformed(_) => false,
        }
    }

    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SearchError::Timeout
        } else if let Some(status) = e.status() {
            SearchError::Status {
                status: status.as_u16(),
            }
        } else if e.is_decode() {
            SearchError::Malformed(e.to_string())
        } else {
            SearchError::Unreachable(e.to_string())
        }
    }
}

/// Failures of the language-model completion call itself.
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Request(String),

    #[error("completion request timed out")]
    Timeout,

    #[error("completion provider returned HTTP {status}")]
    Status { status: u16 },

    #[error("completion response carried no content")]
    Empty,
}

impl From<reqwest::Error> for CompletionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CompletionError::Timeout
        } else if let Some(status) = e.status() {
            CompletionError::Status {
                status: status.as_u16(),
            }
        } else {
            CompletionError::Request(e.to_string())
        }
    }
}

/// Failures of the summarization agent for one handle.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("model call failed: {0}")]
    Completion(#[from] CompletionError),

    #[error("model response is not a poll draft: {0}")]
    Unparseable(String),

    #[error("poll draft failed validation: {0}")]
    Invalid(String),
}

/// Per-handle failure recorded by the orchestrator for one tick.
#[derive(Error, Debug)]
pub enum HandleError {
    #[error("search failed: {0}")]
    Search(#[from] SearchError),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),
}

impl HandleError {
    /// Pipeline stage that failed, used as a label in reports and metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            HandleError::Search(_) => "search",
            HandleError::Generation(_) => "generation",
        }
    }
}
