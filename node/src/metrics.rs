//! # Prometheus Metrics
//!
//! Operational metrics for the devnet node, scraped at `/metrics` on the
//! metrics port. Everything lives in a dedicated registry with the
//! `shroud` prefix.
//!
//! No metric carries an amount. Counters track how often things happen,
//! never how much moved.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

use shroud_contracts::ChainStatus;

#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Confirmed faucet mints.
    pub faucet_mints_total: IntCounter,
    /// Confirmed batch distributions.
    pub distributions_total: IntCounter,
    /// Recipients credited by confirmed distributions.
    pub distribution_recipients_total: IntCounter,
    /// Successful user decryptions.
    pub decryptions_total: IntCounter,
    /// User decryptions that ended in the `Error` marker.
    pub decryption_failures_total: IntCounter,
    /// Transactions that executed and reverted.
    pub reverted_transactions_total: IntCounter,
    /// Latest mined block.
    pub block_height: IntGauge,
    /// Recipients per submitted distribution.
    pub batch_size: Histogram,
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let c = IntCounter::new(name, help).expect("metric creation");
    registry
        .register(Box::new(c.clone()))
        .expect("metric registration");
    c
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("shroud".into()), None)
            .expect("failed to create prometheus registry");

        let faucet_mints_total =
            counter(&registry, "faucet_mints_total", "Confirmed faucet mints");
        let distributions_total =
            counter(&registry, "distributions_total", "Confirmed batch distributions");
        let distribution_recipients_total = counter(
            &registry,
            "distribution_recipients_total",
            "Recipients credited by confirmed batch distributions",
        );
        let decryptions_total =
            counter(&registry, "decryptions_total", "Successful user decryptions");
        let decryption_failures_total = counter(
            &registry,
            "decryption_failures_total",
            "User decryptions that could not be completed",
        );
        let reverted_transactions_total = counter(
            &registry,
            "reverted_transactions_total",
            "Transactions that executed and reverted",
        );

        let block_height = IntGauge::new("block_height", "Number of the latest mined block")
            .expect("metric creation");
        registry
            .register(Box::new(block_height.clone()))
            .expect("metric registration");

        let batch_size = Histogram::with_opts(
            HistogramOpts::new("batch_size", "Recipients per submitted distribution")
                .buckets(vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 256.0]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(batch_size.clone()))
            .expect("metric registration");

        Self {
            registry,
            faucet_mints_total,
            distributions_total,
            distribution_recipients_total,
            decryptions_total,
            decryption_failures_total,
            reverted_transactions_total,
            block_height,
            batch_size,
        }
    }

    /// Brings chain-derived metrics up to date with `status`.
    pub fn observe_chain(&self, status: &ChainStatus) {
        self.block_height.set(status.block_number as i64);
        let seen = self.reverted_transactions_total.get();
        if status.reverted > seen {
            self.reverted_transactions_total.inc_by(status.reverted - seen);
        }
    }

    /// Encodes all registered metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// Renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
