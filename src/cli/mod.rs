//! CLI module for Prodpilot
//!
//! Provides command-line interface parsing for the `prodpilot` binary.
//! Uses clap for argument parsing and owo-colors for colored terminal output.

pub mod init;
pub mod output;

use crate::types::CoordinationMode;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Prodpilot - multi-agent product-management assistant
#[derive(Parser, Debug)]
#[command(
    name = "prodpilot",
    version,
    about = "Prodpilot - multi-agent product-management assistant",
    long_about = "Routes product questions to specialized AI agents and blends their answers\n\
                  using sequential, parallel, collaborative or debate coordination.",
    after_help = "EXAMPLES:\n    \
                  prodpilot init                                  # Write a starter prodpilot.toml\n    \
                  prodpilot ask \"debug this function\"             # Route and answer a query\n    \
                  prodpilot ask --mode debate \"Rust vs Go?\"        # Force a coordination mode\n    \
                  prodpilot route \"what are our churn metrics\"    # Show the routing decision\n    \
                  prodpilot agents list                           # List registered agents"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "prodpilot.toml", global = true)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Routing overrides shared by `ask` and `route`
#[derive(Args, Debug, Clone, Default)]
pub struct RequestArgs {
    /// The query to coordinate
    pub query: String,

    /// Coordination mode (sequential, parallel, collaborative, debate)
    #[arg(short, long)]
    pub mode: Option<CoordinationMode>,

    /// Explicit primary agent id
    #[arg(short, long)]
    pub primary: Option<String>,

    /// Explicit supporting agent ids (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    pub support: Option<Vec<String>>,

    /// Knowledge scope (product or workspace id)
    #[arg(long)]
    pub scope: Option<String>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Coordinate a query across the agents and print the answer
    Ask {
        #[command(flatten)]
        request: RequestArgs,

        /// JSON file with prior conversation turns
        #[arg(long)]
        history: Option<PathBuf>,

        /// JSON file with knowledge documents to search
        #[arg(long)]
        knowledge: Option<PathBuf>,

        /// Stream the final answer as it is generated
        #[arg(long)]
        stream: bool,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,

        /// Append interactions to this JSON Lines file
        #[arg(long)]
        log_file: Option<PathBuf>,
    },

    /// Show how a query would be routed without calling any agent
    Route {
        #[command(flatten)]
        request: RequestArgs,
    },

    /// Inspect registered agents
    #[command(subcommand)]
    Agents(AgentCommands),

    /// Show configuration information
    Config {
        /// Show the full configuration
        #[arg(short = 'f', long)]
        full: bool,

        /// Validate the configuration file
        #[arg(long)]
        validate: bool,
    },

    /// Write a starter prodpilot.toml
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite existing files
        #[arg(short, long)]
        force: bool,
    },
}

/// Agent inspection subcommands
#[derive(Subcommand, Debug)]
pub enum AgentCommands {
    /// List all agents in registration order
    List,

    /// Show details for a specific agent
    Show {
        /// Agent id
        id: String,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
