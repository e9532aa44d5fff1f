// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_vec_with_registry,
    register_int_gauge_with_registry, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, Registry,
};

const FINE_GRAINED_LATENCY_SEC_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.05, 0.1, 0.15, 0.2, 0.25, 0.3, 0.35, 0.4, 0.45, 0.5, 0.6, 0.7, 0.8, 0.9,
    1.0, 1.2, 1.4, 1.6, 1.8, 2.0, 2.5, 3.0, 3.5, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10., 15., 20., 30.,
    45., 60., 90., 120.,
];

#[derive(Clone, Debug)]
pub struct GeneratorMetrics {
    pub(crate) requests_received: IntCounterVec,
    pub(crate) requests_ok: IntCounterVec,
    pub(crate) err_requests: IntCounterVec,
    pub(crate) requests_inflight: IntGaugeVec,

    pub(crate) polls: IntCounter,
    pub(crate) pending_transactions_fetched: IntCounter,
    pub(crate) pipelines_started: IntCounter,
    pub(crate) pipelines_ok: IntCounter,
    pub(crate) err_pipelines: IntCounterVec,
    pub(crate) inflight_transactions: IntGauge,
    pub(crate) pipeline_latency: HistogramVec,

    pub(crate) signatures_produced: IntCounterVec,
    // Validation failures that may indicate forged requests
    pub(crate) security_alerts: IntCounterVec,

    pub(crate) backend_requests: IntCounterVec,
    pub(crate) err_backend_requests: IntCounterVec,

    pub(crate) eth_rpc_queries: IntCounterVec,
    pub(crate) eth_rpc_queries_latency: HistogramVec,
    pub(crate) cosmos_rpc_queries: IntCounterVec,
    pub(crate) eth_node_connected: IntGauge,
    pub(crate) server_uptime_seconds: IntGauge,
}

impl GeneratorMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            requests_received: register_int_counter_vec_with_registry!(
                "generator_requests_received",
                "Total number of requests received in Server, by request type",
                &["type"],
                registry,
            )
            .unwrap(),
            requests_ok: register_int_counter_vec_with_registry!(
                "generator_requests_ok",
                "Total number of ok requests, by request type",
                &["type"],
                registry,
            )
            .unwrap(),
            err_requests: register_int_counter_vec_with_registry!(
                "generator_err_requests",
                "Total number of erred requests, by request type",
                &["type"],
                registry,
            )
            .unwrap(),
            requests_inflight: register_int_gauge_vec_with_registry!(
                "generator_requests_inflight",
                "Total number of inflight requests, by request type",
                &["type"],
                registry,
            )
            .unwrap(),
            polls: register_int_counter_with_registry!(
                "generator_polls",
                "Total number of backend polls",
                registry,
            )
            .unwrap(),
            pending_transactions_fetched: register_int_counter_with_registry!(
                "generator_pending_transactions_fetched",
                "Total number of pending transactions returned by the backend",
                registry,
            )
            .unwrap(),
            pipelines_started: register_int_counter_with_registry!(
                "generator_pipelines_started",
                "Total number of transaction pipelines started",
                registry,
            )
            .unwrap(),
            pipelines_ok: register_int_counter_with_registry!(
                "generator_pipelines_ok",
                "Total number of transaction pipelines that reported to the backend",
                registry,
            )
            .unwrap(),
            err_pipelines: register_int_counter_vec_with_registry!(
                "generator_err_pipelines",
                "Total number of transaction pipelines released without a report, by error type",
                &["error_type"],
                registry,
            )
            .unwrap(),
            inflight_transactions: register_int_gauge_with_registry!(
                "generator_inflight_transactions",
                "Number of transactions currently being processed",
                registry,
            )
            .unwrap(),
            pipeline_latency: register_histogram_vec_with_registry!(
                "generator_pipeline_latency",
                "Latency of one transaction pipeline, by outcome",
                &["outcome"],
                FINE_GRAINED_LATENCY_SEC_BUCKETS.to_vec(),
                registry,
            )
            .unwrap(),
            signatures_produced: register_int_counter_vec_with_registry!(
                "generator_signatures_produced",
                "Total number of payout signatures produced, by destination family",
                &["family"],
                registry,
            )
            .unwrap(),
            security_alerts: register_int_counter_vec_with_registry!(
                "generator_security_alerts",
                "Total number of payout validation failures, by kind",
                &["kind"],
                registry,
            )
            .unwrap(),
            backend_requests: register_int_counter_vec_with_registry!(
                "generator_backend_requests",
                "Total number of backend requests, by operation",
                &["operation"],
                registry,
            )
            .unwrap(),
            err_backend_requests: register_int_counter_vec_with_registry!(
                "generator_err_backend_requests",
                "Total number of failed backend requests, by operation",
                &["operation"],
                registry,
            )
            .unwrap(),
            eth_rpc_queries: register_int_counter_vec_with_registry!(
                "generator_eth_rpc_queries",
                "Total number of queries issued to eth provider, by request type",
                &["type"],
                registry,
            )
            .unwrap(),
            eth_rpc_queries_latency: register_histogram_vec_with_registry!(
                "generator_eth_rpc_queries_latency",
                "Latency of queries issued to eth provider, by request type",
                &["type"],
                FINE_GRAINED_LATENCY_SEC_BUCKETS.to_vec(),
                registry,
            )
            .unwrap(),
            cosmos_rpc_queries: register_int_counter_vec_with_registry!(
                "generator_cosmos_rpc_queries",
                "Total number of queries issued to Tendermint RPC, by outcome",
                &["outcome"],
                registry,
            )
            .unwrap(),
            eth_node_connected: register_int_gauge_with_registry!(
                "generator_eth_node_connected",
                "Whether the last eth RPC call succeeded (1) or failed (0)",
                registry,
            )
            .unwrap(),
            server_uptime_seconds: register_int_gauge_with_registry!(
                "generator_server_uptime_seconds",
                "Seconds since the generator node started",
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Self {
        let registry = Registry::new();
        Self::new(&registry)
    }
}
