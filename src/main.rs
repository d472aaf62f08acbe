use anyhow::Context;
use clap::Parser;
use weatherbit_ingest::cli::{run, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run(cli).await.context("weatherbit-ingest failed")
}
