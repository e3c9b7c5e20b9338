// src/analyze/summarize.rs
//! Summarization agent: posts for one handle in, a validated [`Draft`] out.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::Deserialize;

use crate::analyze::ai_adapter::DynCompletion;
use crate::analyze::prompt::{build_user_prompt, system_prompt};
use crate::error::GenerationError;
use crate::ingest::types::{EmptyReason, FetchOutcome, PostRecord};
use crate::json_extract::extract_json_object;
use crate::poll::{Draft, EmptyDraft, PollDraft, MAX_OPTIONS, MIN_OPTIONS};

/// Stateless: every call builds its own prompt and keeps nothing afterwards.
#[derive(Clone)]
pub struct SummarizationAgent {
    llm: DynCompletion,
    topic_hint: Option<String>,
    system: String,
}

impl SummarizationAgent {
    pub fn new(llm: DynCompletion) -> Self {
        Self {
            llm,
            topic_hint: None,
            system: system_prompt(None).into_owned(),
        }
    }

    /// Extend the system prompt with operator rules (contents of `RULES_PATH`).
    pub fn with_rules(mut self, rules: Option<&str>) -> Self {
        self.system = system_prompt(rules).into_owned();
        self
    }

    pub fn with_topic_hint(mut self, hint: Option<String>) -> Self {
        self.topic_hint = hint;
        self
    }

    pub fn provider_name(&self) -> &'static str {
        self.llm.name()
    }

    /// Handle a search outcome: posts go to the model, an empty outcome becomes an
    /// explanation record carrying the search's reason.
    pub async fn summarize_outcome(
        &self,
        handle: &str,
        outcome: FetchOutcome,
    ) -> Result<Draft, GenerationError> {
        match outcome {
            FetchOutcome::Posts(posts) => self.summarize(handle, &posts).await,
            FetchOutcome::Empty(reason) => Ok(Draft::Empty(EmptyDraft::new(handle, reason))),
        }
    }

    pub async fn summarize(
        &self,
        handle: &str,
        posts: &[PostRecord],
    ) -> Result<Draft, GenerationError> {
        if posts.is_empty() {
            return Ok(Draft::Empty(EmptyDraft::new(
                handle,
                EmptyReason::NoRecentActivity,
            )));
        }

        let user = build_user_prompt(handle, posts, self.topic_hint.as_deref(), Utc::now());
        let raw = self.llm.complete(&self.system, &user).await?;

        parse_draft(handle, &raw, posts).inspect_err(|e| {
            let preview: String = raw.chars().take(200).collect();
            tracing::debug!(handle, error = %e, preview = %preview, "rejected model output");
        })
    }
}

#[derive(Deserialize)]
struct RawDraft {
    #[serde(default)]
    status: Option<String>,
    #[serde(default, alias = "topic_title", alias = "title")]
    topic: Option<String>,
    #[serde(default, alias = "description", alias = "why_choose_this_poll")]
    rationale: Option<String>,
    #[serde(default)]
    poll_question: Option<String>,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default, alias = "sample_posts")]
    sample_post_ids: Vec<serde_json::Value>,
    #[serde(default, alias = "explain")]
    reason: Option<String>,
}

/// Parse and validate model output against the posts it was given.
pub fn parse_draft(
    handle: &str,
    raw: &str,
    posts: &[PostRecord],
) -> Result<Draft, GenerationError> {
    let json = extract_json_object(raw)
        .ok_or_else(|| GenerationError::Unparseable("no JSON object in model output".into()))?;
    let draft: RawDraft =
        serde_json::from_str(json).map_err(|e| GenerationError::Unparseable(e.to_string()))?;

    let status = draft.status.as_deref().unwrap_or("").trim().to_ascii_lowercase();
    if status.starts_with("no_suitable_topic") {
        let why = clean_line(draft.reason.as_deref().unwrap_or(""));
        return Ok(Draft::Empty(EmptyDraft::new(
            handle,
            EmptyReason::NoSuitableTopic(why),
        )));
    }
    if status.starts_with("no_new_posts") || status == "no_recent_activity" {
        return Ok(Draft::Empty(EmptyDraft::new(
            handle,
            EmptyReason::NoRecentActivity,
        )));
    }

    let topic = clean_line(draft.topic.as_deref().unwrap_or(""));
    if topic.is_empty() {
        return Err(GenerationError::Invalid("topic is empty".into()));
    }
    let poll_question = clean_line(draft.poll_question.as_deref().unwrap_or(""));
    if poll_question.is_empty() {
        return Err(GenerationError::Invalid("poll_question is empty".into()));
    }

    let options: Vec<String> = draft.options.iter().map(|o| clean_line(o)).collect();
    if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&options.len()) {
        return Err(GenerationError::Invalid(format!(
            "expected {MIN_OPTIONS}-{MAX_OPTIONS} options, got {}",
            options.len()
        )));
    }
    if let Some(i) = options.iter().position(|o| o.is_empty()) {
        return Err(GenerationError::Invalid(format!("option {} is empty", i + 1)));
    }
    let mut distinct = HashSet::new();
    if !options.iter().all(|o| distinct.insert(o.to_lowercase())) {
        return Err(GenerationError::Invalid("options are not distinct".into()));
    }

    let by_id: HashMap<&str, &PostRecord> = posts.iter().map(|p| (p.id.as_str(), p)).collect();
    let mut sample_posts = Vec::new();
    let mut used = HashSet::new();
    for v in &draft.sample_post_ids {
        let Some(id) = sample_id(v) else {
            return Err(GenerationError::Invalid(format!(
                "sample post reference {v} carries no id"
            )));
        };
        let Some(post) = by_id.get(id.as_str()) else {
            return Err(GenerationError::Invalid(format!(
                "sample post {id} is not among the input posts"
            )));
        };
        if used.insert(id) {
            sample_posts.push((*post).clone());
        }
    }

    Ok(Draft::Poll(PollDraft {
        handle: handle.to_string(),
        topic,
        rationale: draft.rationale.as_deref().map(clean_text).unwrap_or_default(),
        poll_question,
        options,
        sample_posts,
    }))
}

/// Accepts `"123"`, `123` or `{"id": "123", ...}`.
fn sample_id(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Object(m) => m.get("id").and_then(sample_id),
        _ => None,
    }
}

/// Single line, collapsed whitespace.
fn clean_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keeps paragraph breaks, trims each line.
fn clean_text(s: &str) -> String {
    s.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::ai_adapter::MockCompletion;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn posts() -> Vec<PostRecord> {
        ["101", "102", "103"]
            .iter()
            .enumerate()
            .map(|(i, id)| PostRecord {
                id: id.to_string(),
                author_handle: "acct1".into(),
                text: format!("post {i}"),
                posted_at: Utc.with_ymd_and_hms(2025, 9, 6, 9, i as u32, 0).unwrap(),
                engagement_metrics: Default::default(),
                url: None,
            })
            .collect()
    }

    const GOOD: &str = r#"{"status":"poll_topic_found","topic":" Budget  vote ",
        "rationale":"Three posts discuss it.","poll_question":"Will the budget pass?",
        "options":["Yes","No","Too early to tell"],"sample_post_ids":["102", 101, {"id":"102"}]}"#;

    #[test]
    fn valid_draft_resolves_samples_in_order() {
        let d = parse_draft("acct1", GOOD, &posts()).unwrap();
        let p = d.as_poll().expect("poll");
        assert_eq!(p.topic, "Budget vote");
        assert_eq!(p.options.len(), 3);
        let ids: Vec<_> = p.sample_posts.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["102", "101"]);
    }

    #[test]
    fn fabricated_sample_is_rejected() {
        let raw = r#"{"topic":"t","poll_question":"q?","options":["a","b"],"sample_post_ids":["999"]}"#;
        let err = parse_draft("acct1", raw, &posts()).unwrap_err();
        assert!(matches!(err, GenerationError::Invalid(ref m) if m.contains("999")));
    }

    #[test]
    fn option_count_bounds() {
        for opts in [r#"["only"]"#, r#"["a","b","c","d","e"]"#, r#"[]"#] {
            let raw = format!(r#"{{"topic":"t","poll_question":"q?","options":{opts}}}"#);
            assert!(
                matches!(parse_draft("a", &raw, &posts()), Err(GenerationError::Invalid(_))),
                "{opts} should be rejected"
            );
        }
        let raw = r#"{"topic":"t","poll_question":"q?","options":["a","  "]}"#;
        assert!(parse_draft("a", raw, &posts()).is_err());
        let raw = r#"{"topic":"t","poll_question":"q?","options":["Yes","yes"]}"#;
        assert!(parse_draft("a", raw, &posts()).is_err());
    }

    #[test]
    fn empty_topic_or_question_rejected() {
        let raw = r#"{"topic":"","poll_question":"q?","options":["a","b"]}"#;
        assert!(parse_draft("a", raw, &posts()).is_err());
        let raw = r#"{"topic":"t","options":["a","b"]}"#;
        assert!(parse_draft("a", raw, &posts()).is_err());
    }

    #[test]
    fn bracketed_prose_before_the_object_is_skipped() {
        let raw = format!("Draft [v1]:\n{GOOD}\nThanks [end]");
        let d = parse_draft("acct1", &raw, &posts()).unwrap();
        assert_eq!(d.as_poll().map(|p| p.topic.as_str()), Some("Budget vote"));
    }

    #[test]
    fn prose_is_unparseable() {
        let err = parse_draft("a", "I could not find anything.", &posts()).unwrap_err();
        assert!(matches!(err, GenerationError::Unparseable(_)));
        let err = parse_draft("a", r#"{"options": "yes/no"}"#, &posts()).unwrap_err();
        assert!(matches!(err, GenerationError::Unparseable(_)));
    }

    #[test]
    fn no_suitable_topic_becomes_empty_draft() {
        let raw = "```json\n{\"status\":\"no_suitable_topic\",\"reason\":\"only greetings\"}\n```";
        let d = parse_draft("acct1", raw, &posts()).unwrap();
        assert!(matches!(
            d,
            Draft::Empty(EmptyDraft { reason: EmptyReason::NoSuitableTopic(ref why), .. }) if why == "only greetings"
        ));
        assert!(d.rationale().contains("only greetings"));
    }

    #[tokio::test]
    async fn empty_posts_skip_the_model() {
        let mock = Arc::new(MockCompletion::new(GOOD));
        let agent = SummarizationAgent::new(mock.clone());
        let d = agent.summarize("acct2", &[]).await.unwrap();
        assert!(d.rationale().contains("no recent activity"));
        assert!(d.sample_posts().is_empty());
        assert_eq!(mock.calls(), 0);

        let d = agent
            .summarize_outcome("acct3", FetchOutcome::Empty(EmptyReason::AccessDenied))
            .await
            .unwrap();
        assert!(d.rationale().contains("access denied"));
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn house_rules_reach_the_model() {
        let mock = Arc::new(MockCompletion::new(GOOD));
        let agent = SummarizationAgent::new(mock.clone()).with_rules(Some("- No lottery polls."));
        agent.summarize("acct1", &posts()).await.unwrap();
        let system = mock.last_system_prompt().unwrap();
        assert!(system.starts_with(crate::analyze::prompt::SYSTEM_PROMPT));
        assert!(system.contains("- No lottery polls."));
    }

    #[tokio::test]
    async fn completion_failure_is_generation_error() {
        let agent = SummarizationAgent::new(Arc::new(MockCompletion::failing("503")));
        let err = agent.summarize("acct1", &posts()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Completion(_)));
    }
}
