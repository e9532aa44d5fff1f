// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::backend::BackendClient;
use crate::chain_registry::ChainRegistry;
use crate::events::address_hex;
use crate::pipeline::Pipeline;
use crate::scheduler::PollScheduler;
use crate::{
    config::GeneratorNodeConfig,
    metrics::GeneratorMetrics,
    server::{
        auth::ApiKey, handler::JobRequestHandler, run_server, GeneratorNodePublicMetadata,
    },
};
use anyhow::anyhow;
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Starts the poll scheduler and the HTTP server. The scheduler stops when
/// `cancel` fires; the returned handle is the server task.
pub async fn run_generator_node(
    config: GeneratorNodeConfig,
    version: &'static str,
    prometheus_registry: prometheus::Registry,
    cancel: CancellationToken,
) -> anyhow::Result<JoinHandle<()>> {
    let metrics = Arc::new(GeneratorMetrics::new(&prometheus_registry));
    let start_time = std::time::Instant::now();

    // Start server uptime tracking task
    let uptime_metrics = metrics.clone();
    tokio::spawn(async move {
        loop {
            uptime_metrics
                .server_uptime_seconds
                .set(start_time.elapsed().as_secs() as i64);
            tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        }
    });

    let server_config = config.validate()?;
    let signer = Arc::new(server_config.signer);
    let networks = Arc::new(server_config.networks);
    let chains = Arc::new(ChainRegistry::new(metrics.clone()));
    let backend = Arc::new(
        BackendClient::new(
            server_config.backend,
            server_config.api_key.clone(),
            metrics.clone(),
        )
        .map_err(|e| anyhow!("Failed to create backend client: {:?}", e))?,
    );
    let metadata = GeneratorNodePublicMetadata::new(version, address_hex(&signer.address()));
    info!(
        "Generator {} serving {} network(s)",
        metadata.generator_address,
        networks.networks().len()
    );

    let pipeline = Pipeline::new(
        networks,
        chains.clone(),
        chains,
        signer,
        backend.clone(),
        metrics.clone(),
    )
    .with_domain(server_config.domain)
    .with_retry_policy(server_config.receipt_retry);
    let scheduler = Arc::new(PollScheduler::new(
        backend,
        Arc::new(pipeline),
        metrics.clone(),
        server_config.poll_interval,
    ));
    tokio::spawn(scheduler.clone().run(cancel));

    // Start Server
    let socket_address = SocketAddr::new(
        IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
        server_config.server_listen_port,
    );
    Ok(run_server(
        &socket_address,
        Arc::new(JobRequestHandler::new(scheduler)),
        metrics,
        Arc::new(metadata),
        prometheus_registry,
        ApiKey::new(server_config.api_key),
    ))
}
