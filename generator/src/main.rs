// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use fiber_generator::config::GeneratorNodeConfig;
use fiber_generator::node::run_generator_node;
use fiber_generator_config::Config;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[clap(rename_all = "kebab-case")]
#[clap(name = env!("CARGO_BIN_NAME"))]
#[clap(version = VERSION)]
struct Args {
    #[clap(long)]
    pub config_path: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = GeneratorNodeConfig::load(&args.config_path)?;
    let prometheus_registry = prometheus::Registry::new();

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            shutdown.cancel();
        }
    });

    let handle = run_generator_node(config, VERSION, prometheus_registry, cancel.clone()).await?;
    tokio::select! {
        result = handle => result.map_err(|e| anyhow::anyhow!("Task join error: {}", e)),
        _ = cancel.cancelled() => Ok(()),
    }
}
