// src/ingest/providers/fixture.rs
use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::error::SearchError;
use crate::ingest::types::{EmptyReason, FetchOutcome, PostRecord, SearchProvider, SearchQuery};

/// What the fixture answers for one handle.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureEntry {
    Posts(Vec<PostRecord>),
    Empty(EmptyReason),
    Unreachable(String),
}

/// Deterministic provider for tests and offline runs (`SEARCH_PROVIDER=fixture`).
/// Handles without an entry answer `handle_not_found`.
#[derive(Debug, Clone, Default)]
pub struct FixtureSearchProvider {
    entries: HashMap<String, FixtureEntry>,
}

impl FixtureSearchProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_posts(mut self, handle: &str, posts: Vec<PostRecord>) -> Self {
        self.entries
            .insert(handle.to_ascii_lowercase(), FixtureEntry::Posts(posts));
        self
    }

    pub fn with_empty(mut self, handle: &str, reason: EmptyReason) -> Self {
        self.entries
            .insert(handle.to_ascii_lowercase(), FixtureEntry::Empty(reason));
        self
    }

    pub fn with_unreachable(mut self, handle: &str, msg: &str) -> Self {
        self.entries.insert(
            handle.to_ascii_lowercase(),
            FixtureEntry::Unreachable(msg.to_string()),
        );
        self
    }

    /// Load `{ "<handle>": {"posts": [...]} | {"empty": {...}} | {"unreachable": "..."} }`.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let raw: HashMap<String, FixtureEntry> =
            serde_json::from_str(s).context("parsing search fixture json")?;
        let entries = raw
            .into_iter()
            .map(|(k, v)| (k.trim_start_matches('@').to_ascii_lowercase(), v))
            .collect();
        Ok(Self { entries })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading search fixture from {}", path.display()))?;
        Self::from_json_str(&content)
    }
}

#[async_trait]
impl SearchProvider for FixtureSearchProvider {
    async fn search(&self, query: &SearchQuery) -> Result<FetchOutcome, SearchError> {
        match self.entries.get(&query.handle.to_ascii_lowercase()) {
            Some(FixtureEntry::Posts(posts)) => {
                let posts = posts
                    .iter()
                    .filter(|p| query.since.map_or(true, |since| p.posted_at >= since))
                    .cloned()
                    .collect();
                Ok(FetchOutcome::Posts(posts))
            }
            Some(FixtureEntry::Empty(reason)) => Ok(FetchOutcome::Empty(reason.clone())),
            Some(FixtureEntry::Unreachable(msg)) => Err(SearchError::Unreachable(msg.clone())),
            None => Ok(FetchOutcome::Empty(EmptyReason::HandleNotFound)),
        }
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
