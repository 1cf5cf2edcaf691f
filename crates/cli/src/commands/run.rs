//! `run` command implementation.

use std::process::ExitCode;

use anyhow::{Context, Result};
use pipeline::{PipelineController, ShutdownHandle};
use tracing::{info, warn};

use super::load_config;
use crate::cli::RunArgs;

/// Execute the `run` command
///
/// Exits non-zero when any message failed or was still pending after flush.
pub async fn run_pipeline(args: &RunArgs) -> Result<ExitCode> {
    let config = load_config(&args.config).context("Failed to load configuration")?;

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
        info!(port = args.metrics_port, "Metrics endpoint available");
    }

    let controller = PipelineController::new(config);
    info!(
        mode = %controller.config().pipeline.mode,
        workers = controller.config().pipeline.worker_count,
        topic = %controller.config().broker.topic,
        transport = ?controller.config().broker.transport,
        session = %controller.session_id(),
        "Configuration loaded"
    );

    let source = controller
        .open_source()
        .context("Failed to open record source")?;

    // Ctrl+C / SIGTERM trigger the same shutdown path as normal completion
    let shutdown = controller.shutdown_handle();
    let signal_task = tokio::spawn(forward_shutdown_signal(shutdown));

    info!("Starting pipeline...");
    let result = controller.run(source).await;
    signal_task.abort();

    let report = result.context("Pipeline execution failed")?;
    report.print_summary();

    if report.is_success() {
        info!(metrics = %report.metrics, "Ingestion completed successfully");
        Ok(ExitCode::SUCCESS)
    } else {
        warn!(
            failed = report.metrics.failed,
            pending = report.metrics.pending,
            pending_after_flush = report.pending_after_flush,
            "Ingestion completed with undelivered messages"
        );
        Ok(ExitCode::FAILURE)
    }
}

async fn forward_shutdown_signal(shutdown: ShutdownHandle) {
    match wait_for_signal().await {
        Ok(signal) => {
            warn!(signal, "Received shutdown signal, stopping pipeline...");
            shutdown.shutdown(signal);
        }
        Err(e) => warn!(error = %e, "Failed to install signal handlers"),
    }
}

/// Wait for Ctrl+C or SIGTERM
async fn wait_for_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|_| "SIGINT")
    }
}
