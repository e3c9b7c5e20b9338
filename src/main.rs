//! Poll agent: binary entrypoint.
//! Loads settings, wires search + summarization, then ticks until SIGINT/SIGTERM.
//!
//! Drafts go to stdout as JSON lines; logs go to stderr.

use std::process::ExitCode;

use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use poll_agent::bootstrap::build_orchestrator;
use poll_agent::config::{LogFormat, Settings};
use poll_agent::report::{ReportSink, StdoutSink};
use poll_agent::scheduler::Scheduler;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("poll_agent=info,warn"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init(),
    }
}

/// Flip `tx` on the first SIGINT (or SIGTERM on unix).
fn spawn_signal_listener(tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => tracing::info!("shutdown signal received (Ctrl+C)"),
                        _ = term.recv() => tracing::info!("shutdown signal received (SIGTERM)"),
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "SIGTERM handler unavailable, listening for Ctrl+C only");
                    let _ = tokio::signal::ctrl_c().await;
                    tracing::info!("shutdown signal received (Ctrl+C)");
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received (Ctrl+C)");
        }
        let _ = tx.send(true);
    });
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();

    let settings = match Settings::from_env() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("poll-agent: configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(settings.log_format);

    if let Some(addr) = settings.metrics_addr {
        match poll_agent::metrics::install_exporter(addr) {
            Ok(()) => tracing::info!(%addr, "prometheus exporter listening"),
            Err(e) => tracing::warn!(error = %e, "metrics exporter not started"),
        }
    }

    let orchestrator = match build_orchestrator(&settings) {
        Ok(o) => o,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "startup failed");
            return ExitCode::FAILURE;
        }
    };

    let sink = StdoutSink;

    if settings.run_once {
        let report = orchestrator.run_once(&settings.handles).await;
        sink.publish(&report);
        return ExitCode::SUCCESS;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_signal_listener(shutdown_tx);

    let scheduler = Scheduler::new(orchestrator, settings.handles.clone(), settings.poll_interval)
        .with_grace(settings.shutdown_grace);
    let ticks = scheduler.run_forever(shutdown_rx, &sink).await;

    tracing::info!(ticks, "poll-agent exiting");
    ExitCode::SUCCESS
}
