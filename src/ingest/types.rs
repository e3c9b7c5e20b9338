// src/ingest/types.rs
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::SearchError;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct PostRecord {
    pub id: String,
    pub author_handle: String, // without '@'
    pub text: String,          // normalized text
    pub posted_at: DateTime<Utc>,
    #[serde(default)]
    pub engagement_metrics: BTreeMap<String, u64>, // e.g. likes, reposts, replies, views
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Why a handle produced no posts this tick. Not an error.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum EmptyReason {
    NoRecentActivity,
    HandleNotFound,
    AccessDenied,
    InvalidHandle,
    NoSuitableTopic(String),
}

impl fmt::Display for EmptyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmptyReason::NoRecentActivity => f.write_str("no recent activity"),
            EmptyReason::HandleNotFound => f.write_str("handle not found"),
            EmptyReason::AccessDenied => f.write_str("access denied"),
            EmptyReason::InvalidHandle => f.write_str("invalid handle"),
            EmptyReason::NoSuitableTopic(why) if why.is_empty() => {
                f.write_str("no suitable topic")
            }
            EmptyReason::NoSuitableTopic(why) => write!(f, "no suitable topic ({why})"),
        }
    }
}

/// Normalized result of one search for one handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Posts(Vec<PostRecord>),
    Empty(EmptyReason),
}

/// Query sent to a provider. Always scoped to a single handle.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub handle: String,
    pub since: Option<DateTime<Utc>>,
    pub max_posts: usize,
    pub topic_hint: Option<String>,
}

/// External "recent posts by handle" capability. Responses are normalized by
/// [`crate::ingest::SearchAdapter`] before anyone else sees them.
#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<FetchOutcome, SearchError>;
    fn name(&self) -> &'static str;
}
