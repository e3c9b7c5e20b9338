// src/poll.rs
//! Poll drafts produced by the summarization agent.

use serde::Serialize;

use crate::ingest::types::{EmptyReason, PostRecord};

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 4;

/// A proposed poll. Only built through validation in [`crate::analyze::summarize`], so
/// `options` holds 2..=4 non-empty entries and `sample_posts` come from the input posts.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PollDraft {
    pub handle: String,
    pub topic: String,
    pub rationale: String,
    pub poll_question: String,
    pub options: Vec<String>,
    pub sample_posts: Vec<PostRecord>,
}

/// Explanation record standing in for a draft when there is nothing to poll about.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EmptyDraft {
    pub handle: String,
    pub reason: EmptyReason,
    pub rationale: String,
}

impl EmptyDraft {
    pub fn new(handle: &str, reason: EmptyReason) -> Self {
        let rationale = format!("No poll drafted for @{handle}: {reason}.");
        Self {
            handle: handle.to_string(),
            reason,
            rationale,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Draft {
    Poll(PollDraft),
    Empty(EmptyDraft),
}

impl Draft {
    pub fn handle(&self) -> &str {
        match self {
            Draft::Poll(d) => &d.handle,
            Draft::Empty(e) => &e.handle,
        }
    }

    pub fn rationale(&self) -> &str {
        match self {
            Draft::Poll(d) => &d.rationale,
            Draft::Empty(e) => &e.rationale,
        }
    }

    pub fn sample_posts(&self) -> &[PostRecord] {
        match self {
            Draft::Poll(d) => &d.sample_posts,
            Draft::Empty(_) => &[],
        }
    }

    pub fn as_poll(&self) -> Option<&PollDraft> {
        match self {
            Draft::Poll(d) => Some(d),
            Draft::Empty(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_draft_explains_reason() {
        let d = Draft::Empty(EmptyDraft::new("acct2", EmptyReason::NoRecentActivity));
        assert!(d.rationale().contains("no recent activity"));
        assert!(d.rationale().contains("@acct2"));
        assert!(d.sample_posts().is_empty());
        assert!(d.as_poll().is_none());
    }

    #[test]
    fn serializes_with_status_tag() {
        let d = Draft::Empty(EmptyDraft::new("a", EmptyReason::AccessDenied));
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["status"], "empty");
        assert_eq!(v["reason"]["kind"], "access_denied");
    }
}
