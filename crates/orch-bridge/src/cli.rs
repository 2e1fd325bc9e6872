//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Drive browser and Karate tools through a chat model
#[derive(Parser, Debug)]
#[command(name = "orch-bridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file (TOML)
    #[arg(short, long, global = true, env = "ORCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Completion rounds allowed per turn
    #[arg(long, global = true)]
    pub max_rounds: Option<usize>,

    /// The command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Interactive chat session
    ///
    /// Type `exit`, `quit` or `q` to leave, `reset` to start over.
    Chat,

    /// Send one message and print the answer
    Ask {
        /// The message for the model
        query: String,
    },

    /// Automate a Jira ticket
    ///
    /// Examples:
    ///   orch-bridge jira QA-42            # Model performs each step
    ///   orch-bridge jira QA-42 --no-llm   # Built-in rules only
    ///   orch-bridge jira QA-42 --agent    # Model drives the whole ticket
    Jira {
        /// Ticket key, e.g. QA-42
        key: String,

        /// Interpret instructions with built-in rules even when a model is configured
        #[arg(long, conflicts_with = "agent")]
        no_llm: bool,

        /// Hand the whole ticket to the model in a single turn
        #[arg(long)]
        agent: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}
