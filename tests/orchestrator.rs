// tests/orchestrator.rs
use std::sync::Arc;

use poll_agent::ai_adapter::MockCompletion;
use poll_agent::ingest::providers::fixture::FixtureSearchProvider;
use poll_agent::ingest::{SearchAdapter, SearchOptions};
use poll_agent::{Draft, EmptyReason, HandleError, Orchestrator, SummarizationAgent};

const DRAFT_1002: &str = r#"{"status":"poll_topic_found","topic":"Transit budget",
 "rationale":"Both posts are about tonight's budget vote.",
 "poll_question":"Should the transit budget pass?",
 "options":["Yes","No","Needs amendments"],
 "sample_post_ids":["1002"]}"#;

fn fixture() -> FixtureSearchProvider {
    FixtureSearchProvider::from_path("tests/fixtures/search_fixture.json".as_ref())
        .expect("fixture loads")
}

fn no_retry() -> SearchOptions {
    SearchOptions {
        max_retries: 0,
        ..SearchOptions::default()
    }
}

fn orchestrator(llm: Arc<MockCompletion>) -> Orchestrator {
    let search = SearchAdapter::new(Arc::new(fixture()), no_retry());
    Orchestrator::new(search, SummarizationAgent::new(llm))
}

fn handles(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn active_and_quiet_accounts() {
    let llm = Arc::new(MockCompletion::new(DRAFT_1002));
    let report = orchestrator(llm.clone())
        .run_once(&handles(&["acct1", "acct2"]))
        .await;

    assert_eq!(report.handles(), vec!["acct1", "acct2"]);

    let poll = match report.get("acct1") {
        Some(Ok(Draft::Poll(p))) => p,
        other => panic!("expected poll for acct1, got {other:?}"),
    };
    assert!((2..=4).contains(&poll.options.len()));
    assert_eq!(poll.sample_posts.len(), 1);
    assert_eq!(poll.sample_posts[0].id, "1002");
    assert_eq!(poll.sample_posts[0].author_handle, "acct1");
    // entity decoded during normalization
    assert!(poll.sample_posts[0].text.contains("& turnout"));

    match report.get("acct2") {
        Some(Ok(Draft::Empty(e))) => {
            assert_eq!(e.reason, EmptyReason::NoRecentActivity);
            assert!(e.rationale.contains("no recent activity"));
        }
        other => panic!("expected empty draft for acct2, got {other:?}"),
    }

    // only acct1 reached the model
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn one_failing_handle_does_not_abort_the_tick() {
    let llm = Arc::new(MockCompletion::new(DRAFT_1002));
    let report = orchestrator(llm)
        .run_once(&handles(&["down", "acct1", "locked", "ghost"]))
        .await;

    assert_eq!(report.handles(), vec!["down", "acct1", "locked", "ghost"]);
    assert!(matches!(
        report.get("down"),
        Some(Err(HandleError::Search(_)))
    ));
    assert!(matches!(report.get("acct1"), Some(Ok(Draft::Poll(_)))));
    assert!(matches!(
        report.get("locked"),
        Some(Ok(Draft::Empty(e))) if e.reason == EmptyReason::AccessDenied
    ));
    assert!(matches!(
        report.get("ghost"),
        Some(Ok(Draft::Empty(e))) if e.reason == EmptyReason::HandleNotFound
    ));
    assert_eq!(report.counts(), (1, 2, 1));
}

#[tokio::test]
async fn invalid_handle_is_reported_not_searched() {
    let llm = Arc::new(MockCompletion::new(DRAFT_1002));
    let report = orchestrator(llm.clone())
        .run_once(&handles(&["not a handle!"]))
        .await;
    assert!(matches!(
        report.get("not a handle!"),
        Some(Ok(Draft::Empty(e))) if e.reason == EmptyReason::InvalidHandle
    ));
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn fabricated_sample_fails_generation_for_that_handle_only() {
    let fabricated = DRAFT_1002.replace("\"1002\"", "\"424242\"");
    let llm = Arc::new(MockCompletion::new(fabricated));
    let report = orchestrator(llm)
        .run_once(&handles(&["acct1", "acct2"]))
        .await;

    match report.get("acct1") {
        Some(Err(e @ HandleError::Generation(_))) => assert_eq!(e.stage(), "generation"),
        other => panic!("expected generation failure, got {other:?}"),
    }
    assert!(matches!(report.get("acct2"), Some(Ok(Draft::Empty(_)))));
}

#[tokio::test]
async fn every_sample_post_comes_from_the_search_results() {
    let llm = Arc::new(MockCompletion::new(
        DRAFT_1002.replace("[\"1002\"]", "[\"1001\",\"1002\",\"1001\"]"),
    ));
    let report = orchestrator(llm).run_once(&handles(&["acct1"])).await;
    let poll = match report.get("acct1") {
        Some(Ok(Draft::Poll(p))) => p,
        other => panic!("expected poll, got {other:?}"),
    };
    let ids: Vec<_> = poll.sample_posts.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["1001", "1002"]);
    // the other account's post never leaks in
    assert!(poll.sample_posts.iter().all(|p| p.author_handle == "acct1"));
}

#[tokio::test]
async fn concurrency_keeps_configured_order() {
    let llm = Arc::new(MockCompletion::new(DRAFT_1002));
    let search = SearchAdapter::new(Arc::new(fixture()), no_retry());
    let orch = Orchestrator::new(search, SummarizationAgent::new(llm)).with_concurrency(4);
    let list = handles(&["acct2", "acct1", "ghost", "locked", "acct1"]);
    let report = orch.run_once(&list).await;
    assert_eq!(report.handles(), vec!["acct2", "acct1", "ghost", "locked", "acct1"]);
    assert_eq!(report.counts(), (2, 3, 0));
}
