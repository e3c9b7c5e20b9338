// src/ingest/mod.rs
pub mod providers;
pub mod types;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use once_cell::sync::OnceCell;

use crate::error::SearchError;
use crate::ingest::types::{EmptyReason, FetchOutcome, PostRecord, SearchProvider, SearchQuery};

/// Max characters kept from a single post.
const MAX_POST_CHARS: usize = 1500;

/// Normalize post text: decode entities, strip tags, unify quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[a-z][^>]*>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > MAX_POST_CHARS {
        out = out.chars().take(MAX_POST_CHARS).collect();
    }

    out
}

/// Canonical form of a handle (`@Foo ` -> `Foo`), or `None` if it is not a valid X handle.
pub fn normalize_handle(raw: &str) -> Option<String> {
    static RE_HANDLE: OnceCell<regex::Regex> = OnceCell::new();
    let re = RE_HANDLE.get_or_init(|| regex::Regex::new(r"^[A-Za-z0-9_]{1,15}$").unwrap());
    let h = raw.trim().trim_start_matches('@');
    re.is_match(h).then(|| h.to_string())
}

/// Keep only posts authored by `handle` at or after `since`, normalize text, drop empties
/// and duplicate ids, order most recent first and cap at `max_posts`.
/// Providers may search at coarser granularity than the window, so `since` is enforced here.
/// Returns (kept, dropped_count).
pub fn normalize_posts(
    handle: &str,
    raw: Vec<PostRecord>,
    since: Option<DateTime<Utc>>,
    max_posts: usize,
) -> (Vec<PostRecord>, usize) {
    let total = raw.len();
    let mut seen: HashSet<String> = HashSet::new();
    let mut keep = Vec::with_capacity(raw.len());

    for mut post in raw {
        let author = post.author_handle.trim().trim_start_matches('@');
        if !author.eq_ignore_ascii_case(handle) {
            continue;
        }
        if since.is_some_and(|since| post.posted_at < since) {
            continue;
        }
        post.author_handle = handle.to_string();
        post.id = post.id.trim().to_string();
        post.text = normalize_text(&post.text);
        if post.id.is_empty() || post.text.is_empty() {
            continue;
        }
        if !seen.insert(post.id.clone()) {
            continue;
        }
        keep.push(post);
    }

    keep.sort_by(|a, b| b.posted_at.cmp(&a.posted_at));
    keep.truncate(max_posts);
    let dropped = total - keep.len();
    (keep, dropped)
}

/// Search-side settings that stay fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub max_posts: usize,
    pub window: Option<Duration>,
    pub topic_hint: Option<String>,
    pub max_retries: u8,
    pub backoff_base: Duration,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_posts: 20,
            window: None,
            topic_hint: None,
            max_retries: 2,
            backoff_base: Duration::from_millis(500),
        }
    }
}

/// Search Adapter: one handle in, normalized posts (or an explicit empty reason) out.
#[derive(Clone)]
pub struct SearchAdapter {
    provider: Arc<dyn SearchProvider>,
    opts: SearchOptions,
}

impl SearchAdapter {
    pub fn new(provider: Arc<dyn SearchProvider>, opts: SearchOptions) -> Self {
        crate::metrics::ensure_metrics_described();
        Self { provider, opts }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub async fn fetch_posts(&self, handle: &str) -> Result<FetchOutcome, SearchError> {
        self.fetch_posts_at(handle, Utc::now()).await
    }

    /// Same as [`fetch_posts`](Self::fetch_posts) with an explicit "now" for the search window.
    pub async fn fetch_posts_at(
        &self,
        handle: &str,
        now: DateTime<Utc>,
    ) -> Result<FetchOutcome, SearchError> {
        let Some(handle) = normalize_handle(handle) else {
            tracing::warn!(handle, "rejecting invalid handle without searching");
            return Ok(FetchOutcome::Empty(EmptyReason::InvalidHandle));
        };

        // A window reaching before the representable range means "no lower bound".
        let since = self
            .opts
            .window
            .and_then(|w| chrono::Duration::from_std(w).ok())
            .and_then(|w| now.checked_sub_signed(w));
        let query = SearchQuery {
            handle: handle.clone(),
            since,
            max_posts: self.opts.max_posts,
            topic_hint: self.opts.topic_hint.clone(),
        };

        let t0 = std::time::Instant::now();
        let outcome = self.search_with_retry(&query).await;
        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        metrics::histogram!("search_duration_ms").record(ms);

        match outcome? {
            FetchOutcome::Posts(raw) => {
                let (posts, dropped) = normalize_posts(&handle, raw, since, self.opts.max_posts);
                counter!("search_posts_total").increment(posts.len() as u64);
                tracing::debug!(
                    handle = %handle,
                    kept = posts.len(),
                    dropped,
                    "search returned posts"
                );
                if posts.is_empty() {
                    Ok(FetchOutcome::Empty(EmptyReason::NoRecentActivity))
                } else {
                    Ok(FetchOutcome::Posts(posts))
                }
            }
            empty @ FetchOutcome::Empty(_) => Ok(empty),
        }
    }

    async fn search_with_retry(&self, query: &SearchQuery) -> Result<FetchOutcome, SearchError> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            match self.provider.search(query).await {
                Ok(out) => return Ok(out),
                Err(e) if e.is_transient() && attempt <= self.opts.max_retries => {
                    let delay = self.opts.backoff_base * (1u32 << (attempt - 1));
                    tracing::warn!(
                        error = %e,
                        handle = %query.handle,
                        provider = self.provider.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient search failure, retrying"
                    );
                    counter!("search_retries_total").increment(1);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    counter!("search_errors_total").increment(1);
                    return Err(e);
                }
            }
        }
    }
}
