//! CLI module for Rosebud.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Rosebud - film recommendations from a plain-language request
///
/// Turns a request like "dramas under two hours about pets" into a
/// filtered search over an indexed film catalogue and streams back
/// grounded recommendations.
#[derive(Parser, Debug)]
#[command(name = "rosebud")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "ROSEBUD_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check API keys, store and configuration
    Doctor,

    /// Ask for film recommendations
    Ask {
        /// What you'd like to watch
        query: String,

        /// Print the structured query used for retrieval
        #[arg(long)]
        show_query: bool,

        /// Print the retrieved films the answer was based on
        #[arg(long)]
        show_context: bool,

        /// Skip the thumbs up/down prompt
        #[arg(long)]
        no_feedback: bool,
    },

    /// Show the structured query and native filter for a request
    Query {
        /// The request to translate
        query: String,
    },

    /// Retrieve matching films without generating an answer
    Search {
        /// The request to search for
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// Load films from a JSON file into the local store
    Index {
        /// JSON array of {id?, content, metadata} records
        file: String,

        /// Documents embedded per request
        #[arg(long, default_value = "100")]
        batch_size: usize,
    },

    /// Run the evaluation question set and record every answer
    Eval {
        /// Write JSON lines here instead of stdout
        #[arg(short, long)]
        output: Option<String>,

        /// Requests run at the same time
        #[arg(long, default_value = "3")]
        concurrency: usize,
    },

    /// Start the HTTP API server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Write the current configuration to the config file
    Init,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}
