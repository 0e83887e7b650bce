use anyhow::Result;
use clap::Parser;
use multisend::cli::{self, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    cli::run(cli).await
}
