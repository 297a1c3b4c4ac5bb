// CLI entrypoint for the dynamic embedding ID transformer.

mod backing_store;
mod bitmap;
mod config;
mod error;
mod glue;
mod map;
mod random_bits;
mod record;
mod sharded;
mod strategy;
mod transformer;
mod variant;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use crate::backing_store::InMemoryBackingStore;
use crate::config::{Config, CONFIG_PATH, CONFIG_PATH_LOCAL};
use crate::glue::{GlueConfig, ParamServerGlue};
use crate::transformer::IDTransformer;

/// Dynamic embedding ID transformer: maps unbounded global embedding IDs
/// onto a bounded range of cache slots.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Custom config file path
    #[arg(short, long, value_name = "FILE")]
    cfg: Option<PathBuf>,

    /// Number of embedding slots to allocate
    #[arg(long, default_value_t = 1_000_000)]
    num_embeddings: u32,
}

/// Loads the configuration struct from YAML file.
/// Tries local config first, then falls back to default config.
fn load_cfg(path: Option<PathBuf>) -> Result<Config> {
    if let Some(custom_path) = path {
        return Config::load(&custom_path)
            .with_context(|| format!("failed to load custom config from {custom_path:?}"));
    }

    match Config::load(CONFIG_PATH_LOCAL) {
        Ok(cfg) => Ok(cfg),
        Err(_) => Config::load(CONFIG_PATH)
            .with_context(|| format!("failed to load config from {CONFIG_PATH}")),
    }
}

/// Configures structured logging.
fn configure_logger() {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let is_prod = std::env::var("APP_ENV").map(|v| v == "prod").unwrap_or(false);

    if is_prod {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .init();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    configure_logger();

    tokio::runtime::Runtime::new()
        .context("failed to create tokio runtime")?
        .block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    let cfg = load_cfg(args.cfg)?;
    info!(component = "main", event = "config_loaded", "configuration loaded");

    let mut transformer = IDTransformer::new(args.num_embeddings, &cfg)
        .context("failed to build id transformer from config")?;

    let store = Arc::new(InMemoryBackingStore::new());
    let glue = ParamServerGlue::new(
        Arc::clone(&store),
        GlueConfig {
            prefix: "emb".to_string(),
            table: 0,
            num_columns: 4,
            num_optimizer_states: 1,
            base_chunk_size: 256,
            reinit: true,
            w_min: -0.01,
            w_max: 0.01,
        },
    );

    let globals = vec![(0..256u64).collect::<Vec<u64>>()];
    let mut slots = vec![vec![0u64; 256]];
    let outcome = transformer
        .transform(&globals, &mut slots, 1)
        .context("transform failed")?;

    info!(
        component = "main",
        event = "transform_done",
        ok = outcome.ok,
        admitted = outcome.ids_to_fetch.len(),
        "synthetic batch admitted"
    );

    let fetched = glue
        .fetch(&outcome.ids_to_fetch)
        .await
        .context("fetch from backing store failed")?;
    info!(
        component = "main",
        event = "fetch_done",
        rows = fetched.len(),
        "rows pulled from backing store"
    );

    let evicted = transformer.evict(16);
    info!(
        component = "main",
        event = "evict_done",
        count = evicted.len(),
        "cold entries evicted"
    );

    let evict_rows: Vec<(u64, Vec<Vec<Vec<u8>>>)> = evicted
        .iter()
        .map(|e| (e.global_id, vec![vec![vec![0u8; 4]; 2]; 4]))
        .collect();
    glue.evict(&evict_rows)
        .await
        .context("evict to backing store failed")?;

    info!(component = "main", event = "demo_complete", "demo run finished");
    Ok(())
}
