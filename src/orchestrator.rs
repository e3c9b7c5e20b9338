// src/orchestrator.rs
//! One tick: for every configured handle, search then summarize, with failures kept per handle.

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::watch;

use crate::analyze::SummarizationAgent;
use crate::error::HandleError;
use crate::ingest::SearchAdapter;
use crate::report::{HandleResult, TickReport};
use crate::scheduler::{SchedulerState, TickRunner};

pub struct Orchestrator {
    search: SearchAdapter,
    agent: SummarizationAgent,
    concurrency: usize,
}

impl Orchestrator {
    pub fn new(search: SearchAdapter, agent: SummarizationAgent) -> Self {
        crate::metrics::ensure_metrics_described();
        Self {
            search,
            agent,
            concurrency: 1,
        }
    }

    /// Process up to `n` handles at once. Output order stays the configured order.
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Run a single tick outside the scheduler.
    pub async fn run_once(&self, handles: &[String]) -> TickReport {
        let (state, _rx) = watch::channel(SchedulerState::Idle);
        self.run_tick_with_state(0, handles, &state).await
    }

    async fn run_tick_with_state(
        &self,
        tick: u64,
        handles: &[String],
        state: &watch::Sender<SchedulerState>,
    ) -> TickReport {
        let started_at = Utc::now();
        let t0 = std::time::Instant::now();
        tracing::info!(
            tick,
            handles = handles.len(),
            search = self.search.provider_name(),
            llm = self.agent.provider_name(),
            "tick started"
        );

        // Futures are built up front; a closure inside the stream trips the Send check
        // of the async-trait boxed future.
        let pending: Vec<_> = handles
            .iter()
            .map(|h| self.process_handle(h, state))
            .collect();
        let results: Vec<HandleResult> = stream::iter(pending)
            .buffered(self.concurrency)
            .collect()
            .await;

        let report = TickReport {
            tick,
            started_at,
            finished_at: Utc::now(),
            results,
        };

        let (polls, empties, failures) = report.counts();
        counter!("poll_ticks_total").increment(1);
        histogram!("poll_tick_duration_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        gauge!("poll_last_tick_ts").set(report.finished_at.timestamp() as f64);
        tracing::info!(
            tick,
            polls,
            empties,
            failures,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "tick finished"
        );
        report
    }

    async fn process_handle(
        &self,
        handle: &str,
        state: &watch::Sender<SchedulerState>,
    ) -> HandleResult {
        let outcome = self.search_and_summarize(handle, state).await;
        let result = HandleResult {
            handle: handle.to_string(),
            outcome,
        };
        counter!("poll_handle_outcomes_total", "outcome" => result.status()).increment(1);
        if let Err(e) = &result.outcome {
            if matches!(e, HandleError::Generation(_)) {
                counter!("generation_errors_total").increment(1);
            }
            tracing::warn!(handle, stage = e.stage(), error = %e, "handle failed this tick");
        }
        result
    }

    async fn search_and_summarize(
        &self,
        handle: &str,
        state: &watch::Sender<SchedulerState>,
    ) -> Result<crate::poll::Draft, HandleError> {
        state.send_replace(SchedulerState::Fetching);
        let fetched = self.search.fetch_posts(handle).await?;

        state.send_replace(SchedulerState::Summarizing);
        let draft = self.agent.summarize_outcome(handle, fetched).await?;
        Ok(draft)
    }
}

#[async_trait]
impl TickRunner for Orchestrator {
    async fn run_tick(
        &self,
        tick: u64,
        handles: &[String],
        state: &watch::Sender<SchedulerState>,
    ) -> TickReport {
        self.run_tick_with_state(tick, handles, state).await
    }
}
