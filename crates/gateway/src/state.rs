// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared state threaded through every axum handler. Constructed once at
//! startup by `vgate-cli` and wrapped in an `Arc` before `Router::with_state`
//! — `Arc<GatewayState<..>>` is `Clone` regardless of whether the inner type
//! is, the same pattern `deltaglider_proxy`'s `Arc<AppState>` uses.

use std::sync::Arc;
use std::time::Duration;

use vgate_cluster::ClusterFacade;
use vgate_core::{Clock, SystemClock};
use vgate_lifecycle::Lifecycle;
use vgate_model::ModelRegistry;

use crate::drift::DriftReconciler;
use crate::metrics::GatewayMetrics;
use crate::scaler::ActivityScaler;

/// All collaborators a request handler or background loop needs. Generic
/// over the cluster facade (production `KubeCluster` vs. tests' `FakeCluster`)
/// and, for the activity clock, over `Clock` (real time vs. `FakeClock`).
pub struct GatewayState<C: ClusterFacade, CL: Clock = SystemClock> {
    pub lifecycle: Lifecycle<C>,
    pub registry: Arc<ModelRegistry<C>>,
    pub scaler: Arc<ActivityScaler<C, CL>>,
    pub drift: Arc<DriftReconciler<C>>,
    pub metrics: Arc<GatewayMetrics>,
    pub http_client: reqwest::Client,
    /// Base URL of the service fronting the backend workload, e.g.
    /// `http://vllm-api`.
    pub upstream_base_url: String,
    pub served_name: String,
    pub cold_start_budget: Duration,
    /// Advertised URL in responses; empty string if unset.
    pub public_endpoint: String,
    /// When true, the proxy captures a bounded preview of response bodies
    /// for structured logging (spec.md §6 `log-output`).
    pub log_output: bool,
}
