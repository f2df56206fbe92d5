//! Prometheus metrics collection for chat-relay
//!
//! This module provides metrics instrumentation for tracking:
//! - Request counts by terminal outcome
//! - Upstream failures by stage (before or during streaming)
//! - Relayed bytes and fragments
//! - End-to-end request duration
//!
//! Metrics are exposed via the `/metrics` endpoint in Prometheus text format.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// Terminal outcome of one chat request
///
/// Restricts the `outcome` label to a fixed set of values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Upstream stream exhausted, outbound stream closed cleanly
    Completed,
    /// Request body could not be decoded; provider never called
    Rejected,
    /// Provider failed, before or during streaming
    UpstreamFailed,
    /// Request deadline fired
    DeadlineExceeded,
    /// Caller went away while the reply was streaming
    ClientDisconnected,
}

impl Outcome {
    /// Convert outcome to Prometheus label string
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Rejected => "rejected",
            Outcome::UpstreamFailed => "upstream_failed",
            Outcome::DeadlineExceeded => "deadline_exceeded",
            Outcome::ClientDisconnected => "client_disconnected",
        }
    }
}

/// Where an upstream failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    /// Provider call failed before the outbound stream was opened
    Open,
    /// Upstream stream raised after bytes may already have been sent
    MidStream,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Open => "open",
            FailureStage::MidStream => "mid_stream",
        }
    }
}

/// Metrics collector for chat-relay
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    requests_total: IntCounterVec,
    upstream_failures: IntCounterVec,
    relayed_bytes: IntCounter,
    relayed_fragments: IntCounter,
    request_duration: Histogram,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Registers all metrics with a new Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Cardinality: 5 outcomes = 5 time series
        let requests_total = IntCounterVec::new(
            Opts::new(
                "chat_relay_requests_total",
                "Total number of chat requests by terminal outcome",
            ),
            &["outcome"],
        )?;

        let upstream_failures = IntCounterVec::new(
            Opts::new(
                "chat_relay_upstream_failures_total",
                "Upstream provider failures by stage (open = before streaming, mid_stream = after)",
            ),
            &["stage"],
        )?;

        let relayed_bytes = IntCounter::with_opts(Opts::new(
            "chat_relay_relayed_bytes_total",
            "Total UTF-8 bytes written to callers",
        ))?;

        let relayed_fragments = IntCounter::with_opts(Opts::new(
            "chat_relay_relayed_fragments_total",
            "Total non-empty text fragments written to callers",
        ))?;

        let request_duration = Histogram::with_opts(
            HistogramOpts::new(
                "chat_relay_request_duration_seconds",
                "Time from request receipt to terminal outcome",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0]),
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(upstream_failures.clone()))?;
        registry.register(Box::new(relayed_bytes.clone()))?;
        registry.register(Box::new(relayed_fragments.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            requests_total,
            upstream_failures,
            relayed_bytes,
            relayed_fragments,
            request_duration,
        })
    }

    /// Record the terminal outcome of a request and its total duration
    pub fn record_outcome(&self, outcome: Outcome, elapsed: Duration) {
        self.requests_total
            .with_label_values(&[outcome.as_str()])
            .inc();
        self.request_duration.observe(elapsed.as_secs_f64());
    }

    /// Record an upstream provider failure
    pub fn upstream_failure(&self, stage: FailureStage) {
        self.upstream_failures
            .with_label_values(&[stage.as_str()])
            .inc();
    }

    /// Record fragments and bytes delivered by one relay
    pub fn record_relayed(&self, fragments: usize, bytes: usize) {
        self.relayed_fragments.inc_by(fragments as u64);
        self.relayed_bytes.inc_by(bytes as u64);
    }

    /// Number of requests that ended with `outcome`
    pub fn requests_count(&self, outcome: Outcome) -> u64 {
        self.requests_total
            .with_label_values(&[outcome.as_str()])
            .get()
    }

    /// Number of upstream failures at `stage`
    pub fn upstream_failures_count(&self, stage: FailureStage) -> u64 {
        self.upstream_failures
            .with_label_values(&[stage.as_str()])
            .get()
    }

    /// Total bytes relayed so far
    pub fn relayed_bytes_count(&self) -> u64 {
        self.relayed_bytes.get()
    }

    /// Encode all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!("metrics output is not valid UTF-8: {}", e))
        })
    }
}
