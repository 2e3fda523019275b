use clap::Parser;
use pmp_semantic_cache::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::maintenance::run(Cli::parse()).await
}
