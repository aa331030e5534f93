//! CLI command definitions for the `flho` binary.
//!
//! `serve` runs the long-lived service. The `identity`, `workflow` and `run`
//! verbs are one-shot operator commands against the same database;
//! countdowns they arm live only for the duration of the command. `serve`
//! picks those runs up at startup and on every sweep.

pub mod identity;
pub mod run;
pub mod workflow;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

/// Workflow run orchestration service.
#[derive(Parser)]
#[command(name = "flho", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, env = "FLHO_CONFIG", default_value = "flho.toml")]
    pub config: PathBuf,

    /// Detailed output (-v for debug, -vv for trace). Ignored when RUST_LOG is set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the service until Ctrl+C or SIGTERM.
    Serve,

    /// Print the effective configuration as JSON.
    Config,

    /// Manage workflow definitions.
    #[command(alias = "wf")]
    Workflow {
        #[command(subcommand)]
        action: WorkflowCommand,
    },

    /// Start, advance and inspect runs.
    Run {
        #[command(subcommand)]
        action: RunCommand,
    },

    /// Register workflow owners without the identity event stream.
    Identity {
        #[command(subcommand)]
        action: IdentityCommand,
    },
}

#[derive(Subcommand)]
pub enum IdentityCommand {
    /// Create an identity or bump it to the next version.
    Upsert {
        #[arg(long)]
        uuid: String,
        /// Store the identity as inactive.
        #[arg(long)]
        inactive: bool,
    },

    /// Show the stored identity.
    Show { uuid: String },
}

#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// Create a workflow from a JSON definition file.
    Create {
        /// Owning identity.
        #[arg(long)]
        owner: String,
        /// JSON file with `name`, `states` and optional `circuitBreaker`.
        #[arg(long)]
        file: PathBuf,
    },

    /// Show one workflow and its breaker state.
    Show { id: Uuid },

    /// List an owner's workflows.
    #[command(alias = "ls")]
    List {
        #[arg(long)]
        owner: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        page_size: u32,
        /// One of id, name, -id, -name.
        #[arg(long, default_value = "id")]
        sort: String,
    },

    /// Rename a workflow.
    #[command(disable_version_flag = true)]
    Rename {
        id: Uuid,
        name: String,
        /// Version the change is based on.
        #[arg(long)]
        version: i64,
    },

    /// Delete a workflow and its runs.
    #[command(alias = "rm")]
    Delete { id: Uuid },
}

#[derive(Subcommand)]
pub enum RunCommand {
    /// Start a run of a workflow.
    Start {
        workflow: Uuid,
        #[arg(long, default_value_t = 0)]
        step: u32,
    },

    /// Move a run to another step.
    Advance {
        workflow: Uuid,
        run: Uuid,
        step: u32,
        /// Reject the advance unless the run is at this version.
        #[arg(long)]
        expected_version: Option<i64>,
    },

    /// Show a run and its phase.
    Show { run: Uuid },

    /// List a run's transitions.
    History { run: Uuid },
}

/// Pretty-print any serializable value to stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_advance_with_expected_version() {
        let run = Uuid::now_v7();
        let wf = Uuid::now_v7();
        let cli = Cli::try_parse_from([
            "flho",
            "-vv",
            "run",
            "advance",
            &wf.to_string(),
            &run.to_string(),
            "2",
            "--expected-version",
            "3",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Run {
                action:
                    RunCommand::Advance {
                        workflow,
                        run: parsed,
                        step,
                        expected_version,
                    },
            } => {
                assert_eq!(workflow, wf);
                assert_eq!(parsed, run);
                assert_eq!(step, 2);
                assert_eq!(expected_version, Some(3));
            }
            _ => panic!("expected run advance"),
        }
    }

    #[test]
    fn parses_identity_upsert() {
        let cli = Cli::try_parse_from(["flho", "identity", "upsert", "--uuid", "owner-1"]).unwrap();
        match cli.command {
            Commands::Identity {
                action: IdentityCommand::Upsert { uuid, inactive },
            } => {
                assert_eq!(uuid, "owner-1");
                assert!(!inactive);
            }
            _ => panic!("expected identity upsert"),
        }

        let cli =
            Cli::try_parse_from(["flho", "identity", "upsert", "--uuid", "owner-1", "--inactive"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Identity {
                action: IdentityCommand::Upsert { inactive: true, .. }
            }
        ));
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(Cli::try_parse_from(["flho", "run", "show", "not-a-uuid"]).is_err());
    }
}
