#![forbid(unsafe_code)]

mod cli;
mod commands;
mod shutdown;
mod startup;

use anyhow::Result;

use cli::Command;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::parse();
    let command = cli.command.clone().unwrap_or_else(Command::daemon);

    if command == Command::Version {
        println!("memory-auditor {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // ── 1. Load config ──────────────────────────────────────────────
    let config = startup::load_config(&cli)?;

    // ── 2. Initialize logging ───────────────────────────────────────
    startup::init_observability(&cli, &config)?;

    // Service root span: fields appear in every log entry of this task
    let _root_span = tracing::span!(
        tracing::Level::INFO,
        "service",
        service.name = "memory-auditor",
        service.version = env!("CARGO_PKG_VERSION"),
    )
    .entered();

    // ── 3. Wire stores, workflow and service ────────────────────────
    let cancel = shutdown::create_shutdown_token();
    let service = startup::build_service(&config, cancel.clone())?;

    // ── 4. Dispatch ─────────────────────────────────────────────────
    match command {
        Command::Run { cleanup } => {
            commands::cmd_run(&service, cleanup || config.audit.perform_cleanup).await
        }
        Command::Schedule {
            interval_hours,
            max_iterations,
        } => {
            let interval_hours = interval_hours.unwrap_or(config.audit.schedule_interval_hours);
            commands::cmd_schedule(&service, &cancel, interval_hours, max_iterations).await
        }
        Command::Report { report_id } => commands::cmd_report(&service, &report_id).await,
        Command::Runs { limit } => commands::cmd_runs(&service, limit),
        Command::Version => Ok(()),
    }
}
