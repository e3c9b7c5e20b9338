// src/analyze/prompt.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::ingest::types::PostRecord;

pub const SYSTEM_PROMPT: &str = "You are a neutral poll editor. From the posts you are given, \
pick the single most poll-worthy trending topic and draft a poll about it.\n\
Rules:\n\
- Use only the supplied posts. Never invent posts, quotes, numbers or ids.\n\
- Politics, elections, markets, technology, culture and sports are all allowed.\n\
- Refuse only direct incitement to violence, explicit sexual content and private-data leaks; \
in that case answer with status \"no_suitable_topic\".\n\
- Titles and options must be balanced and neutral; each option is at most 20 words.\n\
- Describe claims with neutral reporting language (\"According to posts...\").\n\
- Output one JSON object only: no Markdown, no prose, no code fences.";

/// Base system prompt, extended with operator rules when a rules file is configured.
/// The base rules (posts only, JSON only) stay in force either way.
pub fn system_prompt(rules: Option<&str>) -> Cow<'static, str> {
    match rules.map(str::trim).filter(|r| !r.is_empty()) {
        None => Cow::Borrowed(SYSTEM_PROMPT),
        Some(r) => Cow::Owned(format!("{SYSTEM_PROMPT}\n\nAdditional house rules:\n{r}")),
    }
}

#[derive(Serialize)]
struct PromptPost<'a> {
    id: &'a str,
    posted_at: String,
    text: &'a str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    engagement: &'a BTreeMap<String, u64>,
}

/// User message: handle, time, optional hint, the posts as JSON, and the answer schema.
pub fn build_user_prompt(
    handle: &str,
    posts: &[PostRecord],
    topic_hint: Option<&str>,
    now: DateTime<Utc>,
) -> String {
    let listed: Vec<PromptPost<'_>> = posts
        .iter()
        .map(|p| PromptPost {
            id: &p.id,
            posted_at: p.posted_at.to_rfc3339(),
            text: &p.text,
            engagement: &p.engagement_metrics,
        })
        .collect();
    let posts_json = serde_json::to_string_pretty(&listed).unwrap_or_else(|_| "[]".to_string());

    format!(
        "Current UTC time: {now}.\n\
Account: @{handle}\n\
Optional topic hint: {hint}\n\n\
Recent posts by @{handle} (JSON):\n{posts_json}\n\n\
Answer with exactly this JSON shape:\n\
{{\n  \"status\": \"poll_topic_found\" | \"no_suitable_topic\",\n  \
\"topic\": \"short topic title\",\n  \
\"rationale\": \"3-5 sentences: what happened and why this topic beat the others (engagement, timeliness, controversy)\",\n  \
\"poll_question\": \"engaging, neutral question\",\n  \
\"options\": [\"2 to 4 short neutral options\"],\n  \
\"sample_post_ids\": [\"ids copied from the posts above that support the topic\"],\n  \
\"reason\": \"only when status is no_suitable_topic\"\n}}",
        now = now.format("%Y-%m-%d %H:%M:%S"),
        hint = topic_hint.unwrap_or("none"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn prompt_embeds_handle_ids_and_hint() {
        let posts = vec![PostRecord {
            id: "42".into(),
            author_handle: "acct1".into(),
            text: "Budget vote tonight".into(),
            posted_at: Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap(),
            engagement_metrics: [("likes".to_string(), 10u64)].into_iter().collect(),
            url: None,
        }];
        let now = Utc.with_ymd_and_hms(2025, 9, 6, 10, 0, 0).unwrap();
        let p = build_user_prompt("acct1", &posts, Some("economy"), now);
        assert!(p.contains("@acct1"));
        assert!(p.contains("\"id\": \"42\""));
        assert!(p.contains("\"likes\": 10"));
        assert!(p.contains("Optional topic hint: economy"));
        assert!(p.contains("2025-09-06 10:00:00"));
        assert!(p.contains("sample_post_ids"));
    }

    #[test]
    fn rules_extend_the_base_prompt() {
        assert_eq!(system_prompt(None), SYSTEM_PROMPT);
        assert_eq!(system_prompt(Some("  ")), SYSTEM_PROMPT);
        let p = system_prompt(Some("- Avoid celebrity gossip."));
        assert!(p.starts_with(SYSTEM_PROMPT));
        assert!(p.ends_with("Additional house rules:\n- Avoid celebrity gossip."));
    }
}
