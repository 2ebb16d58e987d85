use clap::{Parser, Subcommand};
use infrastructure::config::{LogFormat, LogLevel};
use infrastructure::constants::DEFAULT_RUNS_LIMIT;

#[derive(Parser, Debug)]
#[command(
    name = "memory-auditor",
    about = "Consistency auditor for the document store, cache and vector index",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to the YAML configuration file. Without one, defaults plus
    /// `MEMORY_AUDIT_*` environment overrides are used.
    #[arg(short, long, env = "MEMORY_AUDIT_CONFIG", global = true)]
    pub config: Option<String>,

    /// Log level override (takes precedence over config file)
    #[arg(short, long, global = true)]
    pub log_level: Option<LogLevel>,

    /// Log format: json (default, production) or text (development)
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run one audit, wait for it and print the report as JSON
    Run {
        /// Delete detected inconsistencies (within the safety cap)
        #[arg(long)]
        cleanup: bool,
    },

    /// Run audits on a fixed interval until interrupted (default)
    Schedule {
        /// Hours between runs (overrides audit.schedule_interval_hours)
        #[arg(long)]
        interval_hours: Option<u64>,

        /// Stop after this many runs
        #[arg(long)]
        max_iterations: Option<u64>,
    },

    /// Print a stored report as JSON
    Report {
        /// Report id, e.g. `audit-1718000000000`
        report_id: String,
    },

    /// List recent runs, newest first
    Runs {
        #[arg(long, default_value_t = DEFAULT_RUNS_LIMIT)]
        limit: usize,
    },

    /// Display version and build information
    Version,
}

impl Command {
    /// Subcommand used when none is given.
    pub fn daemon() -> Self {
        Self::Schedule {
            interval_hours: None,
            max_iterations: None,
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn cli_defaults() {
        let cli = Cli::try_parse_from(["memory-auditor"]).unwrap();
        assert!(cli.log_level.is_none());
        assert!(cli.log_format.is_none());
        assert!(cli.command.is_none());
    }

    #[test]
    fn cli_custom_config_path() {
        let cli = Cli::try_parse_from(["memory-auditor", "--config", "/tmp/test.yaml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some("/tmp/test.yaml"));
    }

    #[test]
    fn cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "memory-auditor",
            "run",
            "--log-level",
            "debug",
            "--log-format",
            "pretty",
        ])
        .unwrap();
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
        assert_eq!(cli.log_format, Some(LogFormat::Text));
    }

    #[test]
    fn cli_run_subcommand() {
        let cli = Cli::try_parse_from(["memory-auditor", "run"]).unwrap();
        assert_eq!(cli.command, Some(Command::Run { cleanup: false }));

        let cli = Cli::try_parse_from(["memory-auditor", "run", "--cleanup"]).unwrap();
        assert_eq!(cli.command, Some(Command::Run { cleanup: true }));
    }

    #[test]
    fn cli_schedule_subcommand() {
        let cli = Cli::try_parse_from([
            "memory-auditor",
            "schedule",
            "--interval-hours",
            "6",
            "--max-iterations",
            "2",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Some(Command::Schedule {
                interval_hours: Some(6),
                max_iterations: Some(2),
            })
        );
    }

    #[test]
    fn cli_report_requires_id() {
        assert!(Cli::try_parse_from(["memory-auditor", "report"]).is_err());
        let cli = Cli::try_parse_from(["memory-auditor", "report", "audit-1"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Command::Report {
                report_id: "audit-1".to_string()
            })
        );
    }

    #[test]
    fn cli_runs_default_limit() {
        let cli = Cli::try_parse_from(["memory-auditor", "runs"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Command::Runs {
                limit: DEFAULT_RUNS_LIMIT
            })
        );
    }

    #[test]
    fn cli_invalid_log_level_fails() {
        assert!(Cli::try_parse_from(["memory-auditor", "--log-level", "loud"]).is_err());
    }

    #[test]
    fn daemon_is_unbounded_schedule() {
        assert_eq!(
            Command::daemon(),
            Command::Schedule {
                interval_hours: None,
                max_iterations: None
            }
        );
    }
}
