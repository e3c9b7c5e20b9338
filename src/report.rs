// src/report.rs
//! Tick results and how they are emitted (JSON lines on stdout, summary in the log).

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::error::HandleError;
use crate::poll::Draft;

/// Outcome for one configured handle in one tick.
#[derive(Debug)]
pub struct HandleResult {
    pub handle: String,
    pub outcome: Result<Draft, HandleError>,
}

impl HandleResult {
    /// Label used in logs, metrics and the emitted record.
    pub fn status(&self) -> &'static str {
        match &self.outcome {
            Ok(Draft::Poll(_)) => "poll",
            Ok(Draft::Empty(_)) => "empty",
            Err(_) => "failed",
        }
    }
}

/// Everything one tick produced, in configured handle order.
#[derive(Debug)]
pub struct TickReport {
    pub tick: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<HandleResult>,
}

impl TickReport {
    pub fn get(&self, handle: &str) -> Option<&Result<Draft, HandleError>> {
        self.results
            .iter()
            .find(|r| r.handle == handle)
            .map(|r| &r.outcome)
    }

    pub fn handles(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.handle.as_str()).collect()
    }

    /// (polls, empties, failures)
    pub fn counts(&self) -> (usize, usize, usize) {
        self.results
            .iter()
            .fold((0, 0, 0), |(p, e, f), r| match r.status() {
                "poll" => (p + 1, e, f),
                "empty" => (p, e + 1, f),
                _ => (p, e, f + 1),
            })
    }
}

/// JSON record for one handle: the draft (tagged `status: poll|empty`) or a labelled failure.
pub fn record_json(tick: u64, result: &HandleResult) -> Value {
    let mut v = match &result.outcome {
        Ok(draft) => serde_json::to_value(draft).unwrap_or(Value::Null),
        Err(e) => json!({
            "status": "failed",
            "handle": result.handle,
            "stage": e.stage(),
            "error": e.to_string(),
        }),
    };
    if let Some(map) = v.as_object_mut() {
        map.insert("tick".to_string(), json!(tick));
    }
    v
}

/// Write one JSON line per handle.
pub fn write_json_lines<W: Write>(report: &TickReport, out: &mut W) -> io::Result<()> {
    for r in &report.results {
        let line = serde_json::to_string(&record_json(report.tick, r))?;
        writeln!(out, "{line}")?;
    }
    out.flush()
}

/// Where finished ticks go.
pub trait ReportSink: Send + Sync {
    fn publish(&self, report: &TickReport);
}

/// Production sink: records on stdout, one log line per handle on the tracing stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl ReportSink for StdoutSink {
    fn publish(&self, report: &TickReport) {
        for r in &report.results {
            match &r.outcome {
                Ok(Draft::Poll(d)) => tracing::info!(
                    tick = report.tick,
                    handle = %r.handle,
                    topic = %d.topic,
                    options = d.options.len(),
                    samples = d.sample_posts.len(),
                    "poll drafted"
                ),
                Ok(Draft::Empty(e)) => tracing::info!(
                    tick = report.tick,
                    handle = %r.handle,
                    reason = %e.reason,
                    "no poll this tick"
                ),
                Err(e) => tracing::warn!(
                    tick = report.tick,
                    handle = %r.handle,
                    stage = e.stage(),
                    error = %e,
                    "handle failed"
                ),
            }
        }

        let stdout = io::stdout();
        let mut lock = stdout.lock();
        if let Err(e) = write_json_lines(report, &mut lock) {
            tracing::error!(error = %e, tick = report.tick, "failed to write tick report");
        }
    }
}
