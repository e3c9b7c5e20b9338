// src/ingest/providers/xai.rs
//! xAI chat completions with live search restricted to a single X handle.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::SearchError;
use crate::ingest::types::{EmptyReason, FetchOutcome, PostRecord, SearchProvider, SearchQuery};
use crate::json_extract::extract_json;

pub const DEFAULT_BASE_URL: &str = "https://api.x.ai/v1";
pub const DEFAULT_MODEL: &str = "grok-3";

const SYSTEM_PROMPT: &str = "You are a data collector for X (Twitter). Use live search only. \
Never invent posts. Reply with a single JSON object and nothing else.";

pub struct XaiSearchProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl XaiSearchProvider {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("poll-agent/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .timeout(timeout)
            .build()
            .context("building xAI http client")?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct XSource<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    included_x_handles: [&'a str; 1],
}

#[derive(Serialize)]
struct SearchParameters<'a> {
    mode: &'a str,
    sources: Vec<XSource<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    from_date: Option<String>,
    max_search_results: usize,
    return_citations: bool,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    search_parameters: SearchParameters<'a>,
}

#[derive(Deserialize)]
struct Resp {
    choices: Vec<Choice>,
}
#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}
#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

pub(crate) fn build_prompt(query: &SearchQuery) -> String {
    let window = match query.since {
        Some(since) => format!("posted at or after {}", since.to_rfc3339()),
        None => "posted recently".to_string(),
    };
    let hint = query.topic_hint.as_deref().unwrap_or("none");
    format!(
        "Fetch up to {max} of the most recent posts by @{handle} {window}. \
Only include posts authored by @{handle}; ignore everyone else.\n\
Optional topic hint: {hint}.\n\
Return exactly this JSON shape:\n\
{{\"status\": \"ok\" | \"no_recent_activity\" | \"handle_not_found\" | \"access_denied\",\n \
\"posts\": [{{\"id\": \"numeric post id\", \"author_handle\": \"{handle}\", \
\"posted_at\": \"RFC3339 timestamp\", \"url\": \"https://x.com/...\", \"text\": \"full text\", \
\"engagement\": {{\"likes\": 0, \"reposts\": 0, \"replies\": 0, \"quotes\": 0, \"views\": 0}}}}]}}\n\
Use \"handle_not_found\" if the account does not exist and \"access_denied\" if it is \
protected or suspended.",
        max = query.max_posts,
        handle = query.handle,
    )
}

#[async_trait]
impl SearchProvider for XaiSearchProvider {
    async fn search(&self, query: &SearchQuery) -> Result<FetchOutcome, SearchError> {
        let prompt = build_prompt(query);
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: 0.0,
            search_parameters: SearchParameters {
                mode: "on",
                sources: vec![XSource {
                    kind: "x",
                    included_x_handles: [query.handle.as_str()],
                }],
                from_date: query.since.map(|d| d.format("%Y-%m-%d").to_string()),
                max_search_results: query.max_posts,
                return_citations: false,
            },
        };

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(SearchError::from_reqwest)?;

        if let Some(e) = classify_status(resp.status()) {
            return Err(e);
        }

        let body: Resp = resp
            .json()
            .await
            .map_err(|e| SearchError::Malformed(format!("envelope: {e}")))?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        parse_search_content(&query.handle, &content)
    }

    fn name(&self) -> &'static str {
        "xai"
    }
}

/// HTTP status of the search call mapped to an error, `None` on success.
/// 401/403 mean our credential is rejected; everything else keeps its code so
/// [`SearchError::is_transient`] can decide on 429/5xx.
pub(crate) fn classify_status(status: StatusCode) -> Option<SearchError> {
    if status.is_success() {
        return None;
    }
    let code = status.as_u16();
    Some(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SearchError::Auth { status: code },
        _ => SearchError::Status { status: code },
    })
}

#[derive(Deserialize)]
struct Payload {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    posts: Vec<RawPost>,
}

#[derive(Deserialize)]
struct RawPost {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default, alias = "handle")]
    author_handle: Option<String>,
    #[serde(default)]
    posted_at: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default, alias = "engagement_metrics")]
    engagement: BTreeMap<String, serde_json::Value>,
}

/// Turn the model's JSON answer into a [`FetchOutcome`]. Posts with no usable id or
/// timestamp are dropped rather than guessed.
pub fn parse_search_content(handle: &str, content: &str) -> Result<FetchOutcome, SearchError> {
    let json = extract_json(content)
        .ok_or_else(|| SearchError::Malformed("no JSON in search response".into()))?;

    // Some models answer with a bare array of posts.
    let payload: Payload = if json.starts_with('[') {
        let posts: Vec<RawPost> =
            serde_json::from_str(json).map_err(|e| SearchError::Malformed(e.to_string()))?;
        Payload {
            status: None,
            posts,
        }
    } else {
        serde_json::from_str(json).map_err(|e| SearchError::Malformed(e.to_string()))?
    };

    match payload.status.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("handle_not_found") => return Ok(FetchOutcome::Empty(EmptyReason::HandleNotFound)),
        Some("access_denied") => return Ok(FetchOutcome::Empty(EmptyReason::AccessDenied)),
        _ => {}
    }

    let mut posts = Vec::with_capacity(payload.posts.len());
    for raw in payload.posts {
        let id = raw
            .id
            .as_ref()
            .and_then(value_to_id)
            .or_else(|| raw.url.as_deref().and_then(id_from_url));
        let posted_at = raw.posted_at.as_deref().and_then(parse_timestamp);
        let (Some(id), Some(posted_at), Some(text)) = (id, posted_at, raw.text) else {
            tracing::debug!(handle, "dropping search item without id/timestamp/text");
            continue;
        };
        posts.push(PostRecord {
            id,
            author_handle: raw.author_handle.unwrap_or_else(|| handle.to_string()),
            text,
            posted_at,
            engagement_metrics: engagement_counts(&raw.engagement),
            url: raw.url.filter(|u| !u.trim().is_empty()),
        });
    }

    if posts.is_empty() {
        return Ok(FetchOutcome::Empty(EmptyReason::NoRecentActivity));
    }
    Ok(FetchOutcome::Posts(posts))
}

fn value_to_id(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn id_from_url(url: &str) -> Option<String> {
    let (_, tail) = url.split_once("/status/")?;
    let id: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
    (!id.is_empty()).then_some(id)
}

/// Accepts RFC3339 and the "YYYY-MM-DD HH:MM:SS[ UTC]" form models like to emit.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let s = s.trim_end_matches("UTC").trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .map(|n| n.and_utc())
}

fn engagement_counts(raw: &BTreeMap<String, serde_json::Value>) -> BTreeMap<String, u64> {
    raw.iter()
        .filter_map(|(k, v)| {
            let n = match v {
                serde_json::Value::Number(n) => n
                    .as_u64()
                    .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64)),
                serde_json::Value::String(s) => s.replace(',', "").trim().parse().ok(),
                _ => None,
            }?;
            Some((k.to_ascii_lowercase(), n))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_posts_and_metrics() {
        let content = r#"```json
{"status":"ok","posts":[
 {"id":"101","author_handle":"acct1","posted_at":"2025-09-06T09:00:00Z",
  "url":"https://x.com/acct1/status/101","text":"Rates are going up",
  "engagement":{"Likes":12,"reposts":"1,204","views":3.0,"note":"n/a"}},
 {"handle":"acct1","posted_at":"2025-09-06 10:00:00 UTC",
  "url":"https://x.com/acct1/status/102?s=20","text":"Second"},
 {"id":"103","posted_at":"yesterday","text":"no timestamp"}
]}
```"#;
        let FetchOutcome::Posts(posts) = parse_search_content("acct1", content).unwrap() else {
            panic!("expected posts");
        };
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, "101");
        assert_eq!(posts[0].engagement_metrics.get("likes"), Some(&12));
        assert_eq!(posts[0].engagement_metrics.get("reposts"), Some(&1204));
        assert_eq!(posts[0].engagement_metrics.get("views"), Some(&3));
        assert!(!posts[0].engagement_metrics.contains_key("note"));
        assert_eq!(posts[1].id, "102");
        assert_eq!(
            posts[1].posted_at,
            Utc.with_ymd_and_hms(2025, 9, 6, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn status_maps_to_empty_reason() {
        let nf = parse_search_content("x", r#"{"status":"handle_not_found","posts":[]}"#);
        assert_eq!(nf.unwrap(), FetchOutcome::Empty(EmptyReason::HandleNotFound));
        let ad = parse_search_content("x", r#"{"status":"ACCESS_DENIED"}"#);
        assert_eq!(ad.unwrap(), FetchOutcome::Empty(EmptyReason::AccessDenied));
        let none = parse_search_content("x", r#"{"status":"no_recent_activity","posts":[]}"#);
        assert_eq!(
            none.unwrap(),
            FetchOutcome::Empty(EmptyReason::NoRecentActivity)
        );
    }

    #[test]
    fn bare_array_is_accepted() {
        let content = r#"[{"id":7,"posted_at":"2025-09-06T09:00:00+02:00","text":"hi"}]"#;
        let FetchOutcome::Posts(posts) = parse_search_content("acct", content).unwrap() else {
            panic!("expected posts");
        };
        assert_eq!(posts[0].id, "7");
        assert_eq!(posts[0].author_handle, "acct");
        assert_eq!(
            posts[0].posted_at,
            Utc.with_ymd_and_hms(2025, 9, 6, 7, 0, 0).unwrap()
        );
    }

    #[test]
    fn garbage_is_malformed() {
        let err = parse_search_content("x", "sorry, search is unavailable").unwrap_err();
        assert!(matches!(err, SearchError::Malformed(_)));
        let err = parse_search_content("x", r#"{"posts": "nope"}"#).unwrap_err();
        assert!(matches!(err, SearchError::Malformed(_)));
    }

    #[test]
    fn prompt_is_scoped_to_one_handle() {
        let q = SearchQuery {
            handle: "acct1".into(),
            since: Some(Utc.with_ymd_and_hms(2025, 9, 6, 8, 30, 0).unwrap()),
            max_posts: 5,
            topic_hint: None,
        };
        let p = build_prompt(&q);
        assert!(p.contains("@acct1"));
        assert!(p.contains("2025-09-06T08:30:00+00:00"));
        assert!(p.contains("up to 5"));
    }

    #[test]
    fn http_status_classification() {
        assert!(classify_status(StatusCode::OK).is_none());

        for code in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            let e = classify_status(code).unwrap();
            assert!(matches!(e, SearchError::Auth { status } if status == code.as_u16()));
            assert!(!e.is_transient());
        }

        let e = classify_status(StatusCode::TOO_MANY_REQUESTS).unwrap();
        assert!(matches!(e, SearchError::Status { status: 429 }));
        assert!(e.is_transient());

        let e = classify_status(StatusCode::INTERNAL_SERVER_ERROR).unwrap();
        assert!(matches!(e, SearchError::Status { status: 500 }));
        assert!(e.is_transient());

        let e = classify_status(StatusCode::NOT_FOUND).unwrap();
        assert!(matches!(e, SearchError::Status { status: 404 }));
        assert!(!e.is_transient());
    }
}
