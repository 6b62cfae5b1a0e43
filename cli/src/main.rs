use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use stt_corrector_cli::{Cli, run};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let output = run(Cli::parse()).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
