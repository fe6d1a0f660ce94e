//! AWS Helper
//!
//! Command line front-end for bulk Parameter Store uploads, parameter
//! search and S3 object management.

mod cli;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; stdout carries command output
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::debug!("Starting aws-helper v{}", env!("CARGO_PKG_VERSION"));

    cli::Cli::parse().run().await
}
