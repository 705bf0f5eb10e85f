//! CLI command definitions.

use clap::{Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default benchline.yaml
    Init {
        /// Where to write the configuration
        #[arg(default_value = "benchline.yaml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = "benchline.yaml")]
        config: PathBuf,
    },

    /// Print the JSON schema of benchline.yaml
    Schema,

    /// Show whether events would be admitted, without running anything
    Check {
        /// Path to configuration file
        #[arg(short, long, default_value = "benchline.yaml")]
        config: PathBuf,

        /// Change event JSON file, or `-` for stdin
        #[arg(short, long, default_value = "-")]
        event: String,
    },

    /// Run the full pipeline for each event
    Dispatch {
        /// Path to configuration file
        #[arg(short, long, default_value = "benchline.yaml")]
        config: PathBuf,

        /// Change event JSON file (one object or newline-delimited), or `-` for stdin
        #[arg(short, long, default_value = "-")]
        event: String,

        /// Where run events are written
        #[arg(long, value_enum, default_value_t = EventOutput::Log)]
        events: EventOutput,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EventOutput {
    /// Log each event
    Log,
    /// Write each event as a JSON line on stdout
    Json,
}
