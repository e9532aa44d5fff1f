// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::with_metrics;
use crate::{
    error::GeneratorError,
    metrics::GeneratorMetrics,
    server::auth::{require_bearer_token, ApiKey},
    server::handler::JobDispatcherTrait,
    types::PendingTransaction,
};
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, instrument};

pub mod auth;
pub mod handler;

#[cfg(test)]
pub(crate) mod mock_handler;

pub const HEALTH_PATH: &str = "/health";
pub const PING_PATH: &str = "/ping";
pub const METRICS_PATH: &str = "/metrics";
pub const JOBS_PATH: &str = "/jobs";
pub const JOBS_INFLIGHT_PATH: &str = "/jobs/inflight";

// Served on `/ping` without authentication. Be careful with what to put here.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorNodePublicMetadata {
    pub version: &'static str,
    pub generator_address: String,
}

impl GeneratorNodePublicMetadata {
    pub fn new(version: &'static str, generator_address: String) -> Self {
        Self {
            version,
            generator_address,
        }
    }

    pub fn empty_for_testing() -> Self {
        Self {
            version: "testing",
            generator_address: String::new(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub receive_transaction_id: String,
    pub accepted: bool,
}

#[derive(Debug, Serialize)]
pub struct InflightCount {
    pub inflight: usize,
}

type ServerState<H> = (Arc<H>, Arc<GeneratorMetrics>, Arc<GeneratorNodePublicMetadata>);

pub fn run_server(
    socket_address: &SocketAddr,
    handler: Arc<impl JobDispatcherTrait + Sync + Send + 'static>,
    metrics: Arc<GeneratorMetrics>,
    metadata: Arc<GeneratorNodePublicMetadata>,
    registry: Registry,
    api_key: ApiKey,
) -> tokio::task::JoinHandle<()> {
    let socket_address = *socket_address;
    tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(socket_address).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind {}: {}", socket_address, e);
                return;
            }
        };
        info!("Generator server listening on {}", socket_address);
        if let Err(e) = axum::serve(
            listener,
            make_router(handler, metrics, metadata, registry, api_key).into_make_service(),
        )
        .await
        {
            error!("Generator server stopped: {}", e);
        }
    })
}

pub(crate) fn make_router<H>(
    handler: Arc<H>,
    metrics: Arc<GeneratorMetrics>,
    metadata: Arc<GeneratorNodePublicMetadata>,
    registry: Registry,
    api_key: ApiKey,
) -> Router
where
    H: JobDispatcherTrait + Sync + Send + 'static,
{
    let jobs = Router::new()
        .route(JOBS_PATH, post(handle_add_job::<H>))
        .route(JOBS_INFLIGHT_PATH, get(handle_inflight::<H>))
        .route_layer(middleware::from_fn_with_state(api_key, require_bearer_token));

    Router::new()
        .route("/", get(health_check))
        .route(HEALTH_PATH, get(health_check))
        .route(PING_PATH, get(ping::<H>))
        .merge(jobs)
        .with_state((handler, metrics, metadata))
        .merge(
            Router::new()
                .route(METRICS_PATH, get(serve_metrics))
                .with_state(registry),
        )
}

impl IntoResponse for GeneratorError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            GeneratorError::InvalidTxHash(_) | GeneratorError::MalformedDeposit(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, format!("Something went wrong: {:?}", self)).into_response()
    }
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

async fn ping<H>(
    State((_, _, metadata)): State<ServerState<H>>,
) -> Json<Arc<GeneratorNodePublicMetadata>>
where
    H: JobDispatcherTrait + Sync + Send + 'static,
{
    Json(metadata)
}

async fn serve_metrics(State(registry): State<Registry>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    match encoder.encode(&registry.gather(), &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [(CONTENT_TYPE, encoder.format_type().to_string())],
            buffer,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[instrument(level = "error", skip_all, fields(tx_id = %tx.receive_transaction_id))]
async fn handle_add_job<H>(
    State((handler, metrics, _)): State<ServerState<H>>,
    Json(tx): Json<PendingTransaction>,
) -> Result<Json<JobAccepted>, GeneratorError>
where
    H: JobDispatcherTrait + Sync + Send + 'static,
{
    let future = async {
        if tx.receive_transaction_id.trim().is_empty() {
            return Err(GeneratorError::InvalidTxHash(
                "receiveTransactionId is empty".to_string(),
            ));
        }
        let receive_transaction_id = tx.receive_transaction_id.clone();
        let accepted = handler.dispatch(tx);
        Ok(Json(JobAccepted {
            receive_transaction_id,
            accepted,
        }))
    };
    with_metrics!(metrics.clone(), "add_job", future).await
}

async fn handle_inflight<H>(
    State((handler, _, _)): State<ServerState<H>>,
) -> Json<InflightCount>
where
    H: JobDispatcherTrait + Sync + Send + 'static,
{
    Json(InflightCount {
        inflight: handler.inflight_count(),
    })
}

#[macro_export]
macro_rules! with_metrics {
    ($metrics:expr, $type_:expr, $func:expr) => {
        async move {
            info!("Received {} request", $type_);
            $metrics
                .requests_received
                .with_label_values(&[$type_])
                .inc();
            $metrics
                .requests_inflight
                .with_label_values(&[$type_])
                .inc();

            let result = $func.await;

            match &result {
                Ok(_) => {
                    info!("{} request succeeded", $type_);
                    $metrics.requests_ok.with_label_values(&[$type_]).inc();
                }
                Err(e) => {
                    info!("{} request failed: {:?}", $type_, e);
                    $metrics.err_requests.with_label_values(&[$type_]).inc();
                }
            }

            $metrics
                .requests_inflight
                .with_label_values(&[$type_])
                .dec();
            result
        }
    };
}
