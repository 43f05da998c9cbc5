//! primflow-cli - Command-line interface for primflow
//!
//! Runs and inspects workflows against a graph file or a store directory.

mod commands;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "primflow-cli")]
#[command(about = "Command-line interface for the primflow workflow engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where to read state definitions from.
#[derive(Args, Debug, Clone)]
pub struct GraphSource {
    /// Graph file (JSON or YAML)
    #[arg(short, long, conflicts_with = "store")]
    graph: Option<PathBuf>,

    /// Store directory
    #[arg(short, long, env = "PRIMFLOW_STORE")]
    store: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a workflow from an initial state
    Run {
        #[command(flatten)]
        source: GraphSource,

        /// State to start from
        #[arg(short, long)]
        initial: String,

        /// Initial context JSON (or @file.json to read from file)
        #[arg(short, long)]
        context: Option<String>,

        /// Stop before entering any of these states
        #[arg(long, value_delimiter = ',')]
        halt_on: Vec<String>,

        /// Stop after this many executed states (0 = unbounded)
        #[arg(long)]
        max_steps: Option<usize>,

        /// Print the report and final context as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check a graph for unknown primitives and dangling transitions
    Validate {
        #[command(flatten)]
        source: GraphSource,
    },

    /// List the built-in primitives
    Primitives,

    /// List states in a store
    ListStates {
        /// Store directory
        #[arg(short, long, env = "PRIMFLOW_STORE")]
        store: PathBuf,
    },

    /// Insert or replace a state in a store
    PutState {
        /// Store directory
        #[arg(short, long, env = "PRIMFLOW_STORE")]
        store: PathBuf,

        /// State JSON (or @file.json to read from file)
        definition: String,
    },

    /// Import every state of a graph file into a store
    Import {
        /// Store directory
        #[arg(short, long, env = "PRIMFLOW_STORE")]
        store: PathBuf,

        /// Graph file (JSON or YAML)
        file: PathBuf,
    },

    /// Delete a state from a store
    DeleteState {
        /// Store directory
        #[arg(short, long, env = "PRIMFLOW_STORE")]
        store: PathBuf,

        /// State name
        name: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match commands::execute(cli.command) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }
}
