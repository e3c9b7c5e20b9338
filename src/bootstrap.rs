// src/bootstrap.rs
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::analyze::ai_adapter::build_completion_provider;
use crate::analyze::SummarizationAgent;
use crate::config::{SearchBackend, Settings};
use crate::ingest::providers::fixture::FixtureSearchProvider;
use crate::ingest::providers::xai::XaiSearchProvider;
use crate::ingest::types::SearchProvider;
use crate::ingest::{SearchAdapter, SearchOptions};
use crate::orchestrator::Orchestrator;

/// Search provider selected by settings.
pub fn build_search_provider(settings: &Settings) -> anyhow::Result<Arc<dyn SearchProvider>> {
    let search = &settings.search;
    let provider: Arc<dyn SearchProvider> = match &search.backend {
        SearchBackend::Xai { api_key } => Arc::new(XaiSearchProvider::new(
            api_key.expose(),
            &search.model,
            &search.base_url,
            settings.request_timeout,
        )?),
        SearchBackend::Fixture { path } => Arc::new(
            FixtureSearchProvider::from_path(path)
                .with_context(|| format!("SEARCH_PROVIDER=fixture ({})", path.display()))?,
        ),
    };
    Ok(provider)
}

pub fn build_search_adapter(settings: &Settings) -> anyhow::Result<SearchAdapter> {
    let provider = build_search_provider(settings)?;
    let opts = SearchOptions {
        max_posts: settings.search.max_posts,
        window: Some(settings.search.window),
        topic_hint: settings.search.topic_hint.clone(),
        max_retries: settings.search.max_retries,
        ..SearchOptions::default()
    };
    Ok(SearchAdapter::new(provider, opts))
}

/// Wire search, summarization and the orchestrator from validated settings.
pub fn build_orchestrator(settings: &Settings) -> anyhow::Result<Orchestrator> {
    let search = build_search_adapter(settings)?;
    let llm = build_completion_provider(settings)?;
    let agent = SummarizationAgent::new(llm)
        .with_topic_hint(settings.search.topic_hint.clone())
        .with_rules(settings.llm.rules.as_deref());

    // Safe diagnostics only: provider names and models, never keys.
    info!(
        search = search.provider_name(),
        search_model = %settings.search.model,
        llm = agent.provider_name(),
        llm_model = %settings.llm.model,
        handles = settings.handles.len(),
        concurrency = settings.handle_concurrency,
        house_rules = settings.llm.rules.is_some(),
        "pipeline ready"
    );

    Ok(Orchestrator::new(search, agent).with_concurrency(settings.handle_concurrency))
}
