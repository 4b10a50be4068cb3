//! docrel command-line tool.
//!
//! Opens a sled (or in-memory) store over the sample world and runs one
//! command against it.

mod commands;
mod config;
mod error;
mod schema;

use std::process::ExitCode;

use clap::Parser;
use docrel_core::RequestContext;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::{Command, Session};
use config::{Args, CliConfig, StoreConfig};
use error::Error;

fn main() -> ExitCode {
    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docrel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let (config, command) = Args::parse().into_config();

    match run(&config, command) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &CliConfig, command: Command) -> Result<String, Error> {
    match &config.store {
        StoreConfig::Sled(storage) => {
            tracing::info!(data_path = %storage.path.display(), "opening sled store")
        }
        StoreConfig::Memory => tracing::info!("using in-memory store"),
    }

    let session = Session::open(config)?;
    let ctx = match &config.actor {
        Some(actor) => RequestContext::new(actor.clone()),
        None => RequestContext::system(),
    };

    // Writes committed before a failure are kept.
    let result = commands::execute(&session.db, &ctx, command);
    session.flush()?;
    result
}
