// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parley binary entry point.

use clap::{Parser, Subcommand};
use parley_core::traits::adapter::PluginAdapter;
use parley_core::traits::storage::StorageAdapter;
use parley_storage::SqliteStorage;
use tracing_subscriber::EnvFilter;

/// Parley - conversational context and memory pipeline.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Load and validate configuration, reporting every problem found.
    Check,
    /// Open the configured database, run migrations, and report health.
    Doctor,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = match parley_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            parley_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Check) => {
            println!(
                "parley: config ok (model={}, database={})",
                config.provider.default_model, config.storage.database_path
            );
        }
        Some(Commands::Doctor) => {
            let storage = SqliteStorage::new(config.storage.clone());
            if let Err(e) = storage.initialize().await {
                eprintln!("parley doctor: storage initialization failed: {e}");
                std::process::exit(1);
            }
            match storage.health_check().await {
                Ok(status) => println!("parley doctor: storage {status:?}"),
                Err(e) => {
                    eprintln!("parley doctor: health check failed: {e}");
                    std::process::exit(1);
                }
            }
            if let Err(e) = storage.close().await {
                eprintln!("parley doctor: close failed: {e}");
                std::process::exit(1);
            }
        }
        None => {
            println!("parley: use --help for available commands");
        }
    }
}
