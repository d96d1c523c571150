// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! mpdict CLI
//!
//! Operator tool and benchmark driver for shared-memory dictionaries.

use clap::{Parser, Subcommand};

mod args;
mod commands;
mod workload;

use args::TableArgs;
use mpdict_core::Backend;

/// mpdict - Multi-process dictionary over shared memory
#[derive(Parser)]
#[command(name = "mpdict")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (overrides the table flags)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the multi-process write benchmark
    Bench {
        /// Dictionary backend (shm or local)
        #[arg(short, long, default_value = "shm")]
        backend: Backend,

        /// Total number of processes, including the foreground one
        #[arg(short, long, default_value_t = 3)]
        processes: usize,

        /// Total number of keys written across all processes
        #[arg(short, long, default_value_t = 100_000)]
        worksize: u64,

        /// Print a JSON summary instead of text
        #[arg(long)]
        json: bool,

        /// Destroy the table when the run ends
        #[arg(long)]
        destroy: bool,

        #[command(flatten)]
        table: TableArgs,
    },

    /// Write a worker's share of keys into an existing table
    #[command(hide = true)]
    Worker {
        /// Worker identifier, used as key prefix and value mark
        #[arg(long)]
        id: String,

        /// Number of keys to write
        #[arg(long)]
        count: u64,

        #[arg(short, long, default_value = "shm")]
        backend: Backend,

        #[command(flatten)]
        table: TableArgs,
    },

    /// Print the value stored under a key
    Get {
        key: String,

        #[command(flatten)]
        table: TableArgs,
    },

    /// Insert or update a key
    Set {
        key: String,
        value: String,

        #[command(flatten)]
        table: TableArgs,
    },

    /// Delete a key
    Del {
        key: String,

        #[command(flatten)]
        table: TableArgs,
    },

    /// Show table statistics
    Inspect {
        /// Also list up to this many entries
        #[arg(short, long, default_value_t = 0)]
        entries: usize,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        table: TableArgs,
    },

    /// Break the mutation lock and repair the table
    Recover {
        #[command(flatten)]
        table: TableArgs,
    },

    /// Remove a table from the system
    Destroy {
        #[command(flatten)]
        table: TableArgs,
    },

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for command output
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();

    // Dispatch to command handlers
    match cli.command {
        Commands::Bench {
            backend,
            processes,
            worksize,
            json,
            destroy,
            table,
        } => {
            let options = commands::bench::BenchOptions {
                backend,
                processes,
                worksize,
                json,
                destroy,
                verbose: cli.verbose,
            };
            commands::bench::execute(config, &table, options).await
        }
        Commands::Worker {
            id,
            count,
            backend,
            table,
        } => commands::worker::execute(config, &table, backend, &id, count).await,
        Commands::Get { key, table } => commands::get::execute(config, &table, &key).await,
        Commands::Set { key, value, table } => {
            commands::set::execute(config, &table, &key, &value).await
        }
        Commands::Del { key, table } => commands::del::execute(config, &table, &key).await,
        Commands::Inspect {
            entries,
            json,
            table,
        } => commands::inspect::execute(config, &table, entries, json).await,
        Commands::Recover { table } => commands::recover::execute(config, &table).await,
        Commands::Destroy { table } => commands::destroy::execute(config, &table).await,
        Commands::Validate { file } => commands::validate::execute(&file).await,
    }
}
