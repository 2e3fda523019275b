//! Maintenance commands - load the snapshot, act on it, save it back

use std::sync::Arc;

use anyhow::Context;
use serde_json::{json, Value};
use tracing::info;

use super::{Cli, Command};
use crate::config::AppConfig;
use crate::infrastructure::embedding::OfflineEmbeddingProvider;
use crate::infrastructure::logging;
use crate::infrastructure::semantic_cache::SnapshotStore;
use crate::infrastructure::services::SemanticCacheEngine;

/// Run a maintenance command and print its JSON report
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => AppConfig::load().context("Failed to load configuration")?,
    };
    logging::init_logging(&config.logging);

    let report = execute(cli.command, &config).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

/// Engine over the configured snapshot pair; never calls a provider
fn open_engine(config: &AppConfig) -> SemanticCacheEngine {
    SemanticCacheEngine::new(config.cache.clone(), Arc::new(OfflineEmbeddingProvider::new()))
        .with_snapshots(SnapshotStore::new(config.persistence.clone()))
}

pub async fn execute(command: Command, config: &AppConfig) -> anyhow::Result<Value> {
    let engine = open_engine(config);
    let loaded = engine.load().await;
    let load = engine.load_report().await;

    let report = match command {
        Command::Stats => {
            return Ok(json!({
                "load": load,
                "stats": engine.stats().await,
            }));
        }
        // Saving after a failed load would replace the snapshot with an empty one
        Command::Expire | Command::Compact if !loaded => {
            anyhow::bail!(
                "Snapshot could not be loaded: {}",
                load.failure.as_deref().unwrap_or("unknown reason")
            );
        }
        Command::Expire => json!({ "removed": engine.expire().await }),
        Command::Compact => serde_json::to_value(engine.compact().await?)?,
    };

    engine.save().await?;
    info!(command = ?command, "Snapshot saved");

    Ok(report)
}
