// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Drift reconciler (spec.md §4.4 `Run`): periodically compares the running
//! workload's observed launch arguments against the effective arguments of
//! the currently declared model spec, and stops the backend on drift so the
//! next request starts it with the converged spec.
//!
//! Fail-safe by construction (spec.md §4.4): any cluster or registry error
//! just skips the tick rather than tearing down a healthy workload.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vgate_cluster::ClusterFacade;
use vgate_core::{check_drift, DriftOutcome, InfrastructureSpec, LifecycleState, WorkloadIdentity};
use vgate_lifecycle::Lifecycle;
use vgate_model::{effective_args, ModelRegistry};

use crate::metrics::GatewayMetrics;

/// Default drift-check interval (spec.md §4.4).
pub const DEFAULT_DRIFT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

pub struct DriftReconciler<C: ClusterFacade> {
    cluster: Arc<C>,
    lifecycle: Lifecycle<C>,
    registry: Arc<ModelRegistry<C>>,
    served_name: String,
    infra: InfrastructureSpec,
    identity: WorkloadIdentity,
    interval: Duration,
    metrics: Arc<GatewayMetrics>,
}

impl<C: ClusterFacade> DriftReconciler<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cluster: Arc<C>,
        lifecycle: Lifecycle<C>,
        registry: Arc<ModelRegistry<C>>,
        served_name: String,
        infra: InfrastructureSpec,
        identity: WorkloadIdentity,
        interval: Duration,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self { cluster, lifecycle, registry, served_name, infra, identity, interval, metrics }
    }

    /// One reconcile tick, exposed separately from `run` for tests.
    pub async fn tick(&self) {
        if self.lifecycle.state() != LifecycleState::Running {
            return;
        }

        let desired = match self.registry.resolve(&self.served_name).await {
            Ok(spec) => spec,
            Err(e) => {
                warn!(error = %e, "drift check: could not read model registry, skipping tick");
                return;
            }
        };

        let observed = match self.cluster.get_workload(&self.identity.namespace, &self.identity.name).await {
            Ok(Some(obs)) => obs.launch_args,
            Ok(None) => {
                warn!(identity = %self.identity, "drift check: workload vanished mid-check, skipping tick");
                return;
            }
            Err(e) => {
                warn!(error = %e, "drift check: cluster call failed, skipping tick");
                return;
            }
        };

        let desired_args = effective_args(&desired, &self.infra);
        match check_drift(&observed, &desired_args) {
            DriftOutcome::Match => {}
            DriftOutcome::Drift { field } => {
                info!(%field, identity = %self.identity, "model spec drift detected, stopping backend");
                match self.lifecycle.stop().await {
                    Ok(()) => {
                        self.metrics.record_scale("down", "success");
                        self.metrics.set_state(self.lifecycle.state());
                    }
                    Err(e) => {
                        warn!(error = %e, "drift-triggered stop failed, will retry next tick");
                        self.metrics.record_scale("down", "failure");
                    }
                }
            }
        }
    }

    /// Background loop (spec.md §4.4 `Run`).
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("drift reconciler loop cancelled");
                    return;
                }
                _ = interval.tick() => self.tick().await,
            }
        }
    }
}
