// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prometheus recorder for the gateway (spec.md §6 ambient note): counters,
//! a duration histogram, and the two state gauges (`vllm_state`,
//! `vllm_is_active`), all registered into a private `prometheus::Registry`
//! so tests can use their own instance instead of the process-wide default
//! registry (spec.md §9: "the metrics registry is accessed through a
//! recorder abstraction so a test can use a private instance").
//!
//! Grounded on the pack's k8s-operator reference
//! (`simple-rack-garage-operator`'s `prometheus::Registry` + `TextEncoder`
//! behind a `/metrics` route).

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

use vgate_core::LifecycleState;

/// Recorder abstraction over the gateway's Prometheus metrics. Cheap to
/// clone (every metric handle is itself an `Arc`-backed prometheus type).
#[derive(Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    scale_operations_total: IntCounterVec,
    requests_total: IntCounterVec,
    request_duration_seconds: HistogramVec,
    request_bytes_total: IntCounter,
    response_bytes_total: IntCounter,
    vllm_state: IntGauge,
    vllm_is_active: IntGauge,
}

impl GatewayMetrics {
    /// Register every metric into a fresh, private registry.
    pub fn new() -> Self {
        Self::with_registry(Registry::new())
    }

    // Allow expect here: metric names/label sets below are compile-time
    // constants, never runtime input, so a failure is a typo caught by the
    // first test that constructs this type.
    #[allow(clippy::expect_used)]
    pub fn with_registry(registry: Registry) -> Self {
        let scale_operations_total = IntCounterVec::new(
            Opts::new("scale_operations_total", "Lifecycle scale transitions attempted"),
            &["direction", "status"],
        )
        .expect("metric definition is static and valid");
        let requests_total = IntCounterVec::new(
            Opts::new("requests_total", "Inbound requests handled, by outcome status"),
            &["status"],
        )
        .expect("metric definition is static and valid");
        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new("request_duration_seconds", "Request handling latency"),
            &["status"],
        )
        .expect("metric definition is static and valid");
        let request_bytes_total = IntCounter::new("request_bytes_total", "Request bytes streamed upstream")
            .expect("metric definition is static and valid");
        let response_bytes_total =
            IntCounter::new("response_bytes_total", "Response bytes streamed to clients")
                .expect("metric definition is static and valid");
        let vllm_state = IntGauge::new(
            "vllm_state",
            "Backend lifecycle state (0=absent,1=starting,2=running,3=stopping,4=failed)",
        )
        .expect("metric definition is static and valid");
        let vllm_is_active = IntGauge::new("vllm_is_active", "1 if the activity clock is within idle_timeout")
            .expect("metric definition is static and valid");

        for collector in [
            Box::new(scale_operations_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(requests_total.clone()),
            Box::new(request_duration_seconds.clone()),
            Box::new(request_bytes_total.clone()),
            Box::new(response_bytes_total.clone()),
            Box::new(vllm_state.clone()),
            Box::new(vllm_is_active.clone()),
        ] {
            let _ = registry.register(collector);
        }

        Self {
            registry,
            scale_operations_total,
            requests_total,
            request_duration_seconds,
            request_bytes_total,
            response_bytes_total,
            vllm_state,
            vllm_is_active,
        }
    }

    pub fn record_scale(&self, direction: &str, status: &str) {
        self.scale_operations_total.with_label_values(&[direction, status]).inc();
    }

    pub fn record_request(&self, status: &str, duration_secs: f64) {
        self.requests_total.with_label_values(&[status]).inc();
        self.request_duration_seconds.with_label_values(&[status]).observe(duration_secs);
    }

    pub fn add_request_bytes(&self, n: u64) {
        self.request_bytes_total.inc_by(n);
    }

    pub fn add_response_bytes(&self, n: u64) {
        self.response_bytes_total.inc_by(n);
    }

    pub fn set_state(&self, state: LifecycleState) {
        self.vllm_state.set(state.gauge_value());
    }

    pub fn set_active(&self, active: bool) {
        self.vllm_is_active.set(i64::from(active));
    }

    /// Render the Prometheus text exposition format (spec.md §6 `/metrics`).
    pub fn encode(&self) -> Vec<u8> {
        let families = self.registry.gather();
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&families, &mut buf).unwrap_or_default();
        buf
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}
