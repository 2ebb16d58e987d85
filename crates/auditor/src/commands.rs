use std::io::Write;

use anyhow::{Context, bail};
use application::audit_service_impl::AuditAppService;
use domain::workflow::error::WorkflowError;
use infrastructure::constants::GRACEFUL_SHUTDOWN_TIMEOUT;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// `run`: one audit in the foreground; the report goes to stdout.
pub async fn cmd_run(service: &AuditAppService, perform_cleanup: bool) -> anyhow::Result<()> {
    resume_interrupted(service)?;

    match service.run_audit(perform_cleanup).await {
        Ok(report) => {
            info!(
                report_id = %report.report_id,
                health_status = %report.health_status,
                "audit finished"
            );
            print_json(&report)?;
            service.drain().await;
            Ok(())
        }
        Err(WorkflowError::Cancelled) => {
            stop(service).await;
            bail!("audit interrupted, it resumes on the next start")
        }
        Err(e) => Err(e).context("audit run failed"),
    }
}

/// `schedule`: the recurring audit until a signal or the iteration limit.
pub async fn cmd_schedule(
    service: &AuditAppService,
    cancel: &CancellationToken,
    interval_hours: u64,
    max_iterations: Option<u64>,
) -> anyhow::Result<()> {
    resume_interrupted(service)?;

    let handle = service.start_scheduled_audit(interval_hours, max_iterations);
    info!(scheduler_id = %handle.scheduler_id, "auditor ready, waiting for shutdown signal");
    let outcome = handle.join().await;

    if cancel.is_cancelled() {
        stop(service).await;
    } else {
        service.drain().await;
    }

    match outcome {
        Ok(()) | Err(WorkflowError::Cancelled) => {
            info!("auditor stopped");
            Ok(())
        }
        Err(e) => Err(e).context("scheduler stopped"),
    }
}

/// `report <id>`: print a stored report.
pub async fn cmd_report(service: &AuditAppService, report_id: &str) -> anyhow::Result<()> {
    match service.get_report(report_id).await? {
        Some(report) => print_json(&report),
        None => bail!("report '{report_id}' not found"),
    }
}

/// `runs`: print the most recent run records.
pub fn cmd_runs(service: &AuditAppService, limit: usize) -> anyhow::Result<()> {
    let runs = service.list_runs(limit)?;
    print_json(&runs)
}

fn resume_interrupted(service: &AuditAppService) -> anyhow::Result<()> {
    let resumed = service.resume_incomplete()?;
    if !resumed.is_empty() {
        info!(count = resumed.len(), run_ids = ?resumed, "resuming interrupted runs");
    }
    Ok(())
}

/// Cancel in-flight work and give it a bounded time to park.
async fn stop(service: &AuditAppService) {
    info!("shutdown: cancelling runs and waiting for them to park");
    if tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, service.shutdown())
        .await
        .is_err()
    {
        warn!(
            timeout_secs = GRACEFUL_SHUTDOWN_TIMEOUT.as_secs(),
            "runs did not stop in time, they resume on the next start"
        );
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
