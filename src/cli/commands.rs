//! CLI command definitions using clap.
//!
//! Subcommands inspect the pure components without a model:
//! - compile: JSON-Schema to constraint nodes
//! - extract: tool calls out of generated text
//! - transcript: chat messages to history plus prompt

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// locallm - tooling for on-device language model integration
#[derive(Parser, Debug)]
#[command(name = "locallm")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a JSON-Schema file and print the constraint nodes
    Compile {
        /// Path to the schema document
        schema: PathBuf,

        /// Single-line JSON output
        #[arg(long)]
        compact: bool,
    },

    /// Extract tool calls from a file of generated text
    Extract {
        /// Path to the generated text
        file: PathBuf,

        /// Tool catalog (YAML or JSON list of tool definitions)
        #[arg(short, long)]
        tools: Option<PathBuf>,
    },

    /// Show how a conversation maps onto runtime history
    Transcript {
        /// JSON array of {role, content} messages
        messages: PathBuf,
    },
}
