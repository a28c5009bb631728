//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Configuration-driven HTTP JSON poller
#[derive(Parser, Debug)]
#[command(name = "solidafy-poller")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Override a `config` value used by `{{ config.* }}` placeholders
    #[arg(long = "set", global = true, value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll every source until interrupted
    Run {
        /// Source definition file (YAML)
        config: PathBuf,

        /// Checkpoint file; cursors are kept in memory without it
        #[arg(short, long)]
        state: Option<PathBuf>,
    },

    /// Run a single interval of every source
    Once {
        /// Source definition file (YAML)
        config: PathBuf,

        /// Checkpoint file; cursors are kept in memory without it
        #[arg(short, long)]
        state: Option<PathBuf>,
    },

    /// Load and validate a source file without sending requests
    Validate {
        /// Source definition file (YAML)
        config: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_state() {
        let cli = Cli::parse_from([
            "solidafy-poller",
            "run",
            "sources.yaml",
            "--state",
            "cursor.json",
            "--set",
            "host=api.test",
        ]);
        assert_eq!(cli.set, vec!["host=api.test".to_string()]);
        match cli.command {
            Commands::Run { config, state } => {
                assert_eq!(config, PathBuf::from("sources.yaml"));
                assert_eq!(state, Some(PathBuf::from("cursor.json")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_validate() {
        let cli = Cli::parse_from(["solidafy-poller", "-v", "validate", "sources.yaml"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Validate { .. }));
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
