// src/scheduler.rs
//! Fixed-interval tick loop with cooperative shutdown.
//!
//! Ticks are measured start-to-start. A tick that overruns the interval is followed
//! immediately by the next one; missed ticks are not replayed in a burst.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::report::{ReportSink, TickReport};

/// Observable scheduler phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Fetching,
    Summarizing,
    Sleeping,
    ShuttingDown,
}

/// Body of a tick. Implemented by the orchestrator; tests plug in fakes.
#[async_trait]
pub trait TickRunner: Send + Sync {
    async fn run_tick(
        &self,
        tick: u64,
        handles: &[String],
        state: &watch::Sender<SchedulerState>,
    ) -> TickReport;
}

pub struct Scheduler<R> {
    runner: R,
    handles: Arc<[String]>,
    interval: Duration,
    grace: Duration,
    state: watch::Sender<SchedulerState>,
}

enum TickEnd {
    Done(TickReport),
    Interrupted,
}

impl<R: TickRunner> Scheduler<R> {
    pub fn new(runner: R, handles: Vec<String>, interval: Duration) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            runner,
            handles: handles.into(),
            interval,
            grace: Duration::from_secs(10),
            state,
        }
    }

    /// How long an in-flight tick may keep running after shutdown is requested.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Tick now, then every `interval`, until `shutdown` flips to `true` (or its sender
    /// is dropped). Returns the number of ticks started.
    pub async fn run_forever(
        &self,
        mut shutdown: watch::Receiver<bool>,
        sink: &dyn ReportSink,
    ) -> u64 {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tick: u64 = 0;

        tracing::info!(
            handles = ?self.handles,
            interval_secs = self.interval.as_secs(),
            "scheduler started"
        );

        loop {
            if tick > 0 {
                self.state.send_replace(SchedulerState::Sleeping);
            }
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                _ = ticker.tick() => {}
            }

            tick += 1;
            let fut = self.runner.run_tick(tick, &self.handles, &self.state);
            tokio::pin!(fut);

            let end = tokio::select! {
                report = &mut fut => TickEnd::Done(report),
                _ = shutdown_requested(&mut shutdown) => TickEnd::Interrupted,
            };

            match end {
                TickEnd::Done(report) => {
                    self.state.send_replace(SchedulerState::Idle);
                    sink.publish(&report);
                }
                TickEnd::Interrupted => {
                    self.state.send_replace(SchedulerState::ShuttingDown);
                    tracing::info!(
                        tick,
                        grace_secs = self.grace.as_secs_f64(),
                        "shutdown requested mid-tick, waiting for it to finish"
                    );
                    match time::timeout(self.grace, &mut fut).await {
                        Ok(report) => sink.publish(&report),
                        Err(_) => tracing::warn!(tick, "grace period elapsed, abandoning tick"),
                    }
                    break;
                }
            }
        }

        self.state.send_replace(SchedulerState::ShuttingDown);
        tracing::info!(ticks = tick, "scheduler stopped");
        tick
    }
}

/// Resolves once shutdown is requested. A dropped sender counts as a request.
pub async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
