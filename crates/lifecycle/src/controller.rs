// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The backend-workload state machine (spec.md §4.1): `EnsureRunning`,
//! `Stop`, `Observe`, serialized through one mutex, with start-token
//! coalescing for concurrent cold-start callers.
//!
//! Grounded on `KubernetesAdapter::k8s_spawn` (oddjobs' `agent/k8s/mod.rs`):
//! create via the cluster API, poll phase/readiness at a fixed interval,
//! clean up on failure. This controller generalizes that per-agent-pod
//! pattern to the one managed backend pod and adds the mutex-serialized
//! state machine and start-token coalescing the original adapter never
//! needed (it was never called concurrently for the same agent).

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, warn};

use vgate_cluster::{ClusterFacade, WorkloadPhase};
use vgate_core::{GatewayError, InfrastructureSpec, LifecycleSnapshot, LifecycleState, WorkloadIdentity};
use vgate_model::{build_workload_spec, ModelRegistry, RegistryError};

/// Default cold-start budget (spec.md §4.1): 120 seconds from `Absent` to a
/// passing health probe, including image pull and model load.
pub const DEFAULT_COLD_START_BUDGET: Duration = Duration::from_secs(120);
/// Default poll interval while a start is in flight.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

type StartOutcome = Option<Result<(), Arc<GatewayError>>>;

struct Inner {
    state: LifecycleState,
    version: u64,
    observed_phase: Option<String>,
    token: Option<watch::Sender<StartOutcome>>,
}

struct Shared<C: ClusterFacade> {
    cluster: Arc<C>,
    registry: Arc<ModelRegistry<C>>,
    served_name: String,
    infra: InfrastructureSpec,
    identity: WorkloadIdentity,
    cold_start_budget: Duration,
    poll_interval: Duration,
    inner: Mutex<Inner>,
}

/// Owns the single managed backend workload's lifecycle state machine.
/// Cheap to clone — every clone shares the same underlying mutex and
/// cluster handle, the way `KubernetesAdapter` shares its `Arc<Mutex<..>>`
/// across calls.
pub struct Lifecycle<C: ClusterFacade> {
    shared: Arc<Shared<C>>,
}

impl<C: ClusterFacade> Clone for Lifecycle<C> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

impl<C: ClusterFacade> Lifecycle<C> {
    pub fn new(
        cluster: Arc<C>,
        registry: Arc<ModelRegistry<C>>,
        served_name: String,
        infra: InfrastructureSpec,
        identity: WorkloadIdentity,
    ) -> Self {
        Self::with_timings(
            cluster,
            registry,
            served_name,
            infra,
            identity,
            DEFAULT_COLD_START_BUDGET,
            DEFAULT_POLL_INTERVAL,
        )
    }

    pub fn with_timings(
        cluster: Arc<C>,
        registry: Arc<ModelRegistry<C>>,
        served_name: String,
        infra: InfrastructureSpec,
        identity: WorkloadIdentity,
        cold_start_budget: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                cluster,
                registry,
                served_name,
                infra,
                identity,
                cold_start_budget,
                poll_interval,
                inner: Mutex::new(Inner {
                    state: LifecycleState::Absent,
                    version: 0,
                    observed_phase: None,
                    token: None,
                }),
            }),
        }
    }

    /// Non-blocking read of current state (spec.md §4.1 `Observe`).
    pub fn observe(&self) -> LifecycleSnapshot {
        let inner = self.shared.inner.lock();
        LifecycleSnapshot {
            state: inner.state,
            version: inner.version,
            observed_phase: inner.observed_phase.clone(),
            replicas_observed: if inner.state == LifecycleState::Running { 1 } else { 0 },
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.shared.inner.lock().state
    }

    /// Block until `Running` with a passing probe, or fail. Exactly one
    /// caller becomes the driver per fresh `Absent → Starting` transition;
    /// every other concurrent caller attaches to the same start token
    /// (spec.md §4.1, §8 invariant 1 and 2).
    pub async fn ensure_running(&self, deadline: Duration) -> Result<(), GatewayError> {
        let start = Instant::now();
        loop {
            let elapsed = start.elapsed();
            if elapsed >= deadline {
                return Err(GatewayError::StartTimeout(deadline));
            }
            let remaining = deadline - elapsed;

            let mut rx = {
                let mut inner = self.shared.inner.lock();
                match inner.state {
                    LifecycleState::Running => return Ok(()),
                    LifecycleState::Starting => match inner.token.as_ref() {
                        Some(tx) => tx.subscribe(),
                        // Invariant: Starting always carries a token. If it's
                        // ever missing, fail this caller rather than panic;
                        // the next tick will observe a consistent state.
                        None => {
                            drop(inner);
                            return Err(GatewayError::StartFailed(
                                "lifecycle in Starting state without a start token".to_string(),
                            ));
                        }
                    },
                    LifecycleState::Stopping => {
                        drop(inner);
                        tokio::time::sleep(Duration::from_millis(20).min(remaining)).await;
                        continue;
                    }
                    LifecycleState::Absent | LifecycleState::Failed => {
                        let (tx, rx) = watch::channel(None);
                        inner.state = LifecycleState::Starting;
                        inner.version += 1;
                        inner.token = Some(tx.clone());
                        drop(inner);
                        let driver = self.clone();
                        tokio::spawn(async move { driver.drive_start(tx).await });
                        rx
                    }
                }
            };

            let wait = wait_for_outcome(&mut rx);
            match tokio::time::timeout(remaining, wait).await {
                Ok(Ok(())) => return Ok(()),
                // Caller release on timeout or driver error never aborts the
                // start itself (spec.md §5): we just propagate and return.
                Ok(Err(e)) => return Err((*e).clone_for_client()),
                Err(_) => return Err(GatewayError::StartTimeout(deadline)),
            }
        }
    }

    /// `Running | Starting → Stopping → Absent` (spec.md §4.1). Idempotent:
    /// `Absent → Absent` returns `Ok`.
    pub async fn stop(&self) -> Result<(), GatewayError> {
        loop {
            enum Action {
                AlreadyAbsent,
                ResetFromFailed,
                WaitForOtherStop,
                Proceed(Option<watch::Sender<StartOutcome>>),
            }
            let action = {
                let mut inner = self.shared.inner.lock();
                match inner.state {
                    LifecycleState::Absent => Action::AlreadyAbsent,
                    LifecycleState::Failed => Action::ResetFromFailed,
                    LifecycleState::Stopping => Action::WaitForOtherStop,
                    LifecycleState::Running => {
                        inner.state = LifecycleState::Stopping;
                        inner.version += 1;
                        Action::Proceed(None)
                    }
                    LifecycleState::Starting => {
                        let token = inner.token.take();
                        inner.state = LifecycleState::Stopping;
                        inner.version += 1;
                        Action::Proceed(token)
                    }
                }
            };

            match action {
                Action::AlreadyAbsent => return Ok(()),
                Action::ResetFromFailed => {
                    let mut inner = self.shared.inner.lock();
                    inner.state = LifecycleState::Absent;
                    inner.version += 1;
                    return Ok(());
                }
                Action::WaitForOtherStop => {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    continue;
                }
                Action::Proceed(token) => {
                    if let Some(tx) = token {
                        let _ = tx.send(Some(Err(Arc::new(GatewayError::StartFailed(
                            "stop requested while starting".to_string(),
                        )))));
                    }
                    let result = self
                        .shared
                        .cluster
                        .delete_workload(&self.shared.identity.namespace, &self.shared.identity.name, 0)
                        .await;
                    let mut inner = self.shared.inner.lock();
                    inner.state = LifecycleState::Absent;
                    inner.version += 1;
                    return result.map_err(|e| GatewayError::ClusterTransient(e.to_string()));
                }
            }
        }
    }

    async fn drive_start(&self, tx: watch::Sender<StartOutcome>) {
        let result = self.run_start_sequence().await;
        // A concurrent Stop() may already have moved state to Stopping and
        // taken the token — it resolves the token itself in that case, so
        // we must neither overwrite its state transition nor clobber the
        // error it already broadcast with our own (possibly later) result.
        let still_own_token = {
            let mut inner = self.shared.inner.lock();
            if inner.token.is_some() {
                inner.state = match &result {
                    Ok(()) => LifecycleState::Running,
                    Err(_) => LifecycleState::Absent,
                };
                inner.version += 1;
                inner.token = None;
                true
            } else {
                false
            }
        };
        if !still_own_token {
            return;
        }
        match &result {
            Ok(()) => info!(identity = %self.shared.identity, "backend start complete"),
            Err(e) => warn!(identity = %self.shared.identity, error = %e, "backend start failed"),
        }
        let _ = tx.send(Some(result.map_err(Arc::new)));
    }

    async fn run_start_sequence(&self) -> Result<(), GatewayError> {
        let identity = self.shared.identity.clone();

        match self.shared.cluster.get_workload(&identity.namespace, &identity.name).await {
            Ok(Some(obs)) if obs.ready => {
                info!(identity = %identity, "adopted an already-ready backend workload");
                return Ok(());
            }
            Ok(Some(_)) => {
                info!(identity = %identity, "adopting a not-ready backend workload by recycling it");
                let _ = self.shared.cluster.delete_workload(&identity.namespace, &identity.name, 0).await;
            }
            Ok(None) => {}
            Err(e) => return Err(GatewayError::ClusterTransient(e.to_string())),
        }

        let model = self.shared.registry.resolve(&self.shared.served_name).await.map_err(|e| match e {
            RegistryError::NotFound(name) => GatewayError::ModelNotFound(name),
            other => GatewayError::ClusterTransient(other.to_string()),
        })?;

        let spec = build_workload_spec(&identity, &model, &self.shared.infra);
        info!(identity = %identity, model = %model.served_name, "creating backend workload");
        self.shared.cluster.create_workload(&spec).await.map_err(|e| GatewayError::StartFailed(e.to_string()))?;

        self.poll_until_ready().await
    }

    async fn poll_until_ready(&self) -> Result<(), GatewayError> {
        let identity = self.shared.identity.clone();
        let deadline = Instant::now() + self.shared.cold_start_budget;
        loop {
            if Instant::now() >= deadline {
                warn!(identity = %identity, "cold-start budget exceeded, deleting workload");
                let _ = self.shared.cluster.delete_workload(&identity.namespace, &identity.name, 0).await;
                return Err(GatewayError::StartTimeout(self.shared.cold_start_budget));
            }

            match self.shared.cluster.get_workload(&identity.namespace, &identity.name).await {
                Ok(Some(obs)) => {
                    {
                        let mut inner = self.shared.inner.lock();
                        inner.observed_phase = Some(format!("{:?}", obs.phase));
                    }
                    if obs.ready {
                        return Ok(());
                    }
                    if obs.phase == WorkloadPhase::Failed {
                        let message =
                            obs.image_pull_error.unwrap_or_else(|| "workload entered Failed phase".to_string());
                        return Err(GatewayError::StartFailed(message));
                    }
                }
                Ok(None) => {
                    warn!(identity = %identity, "workload disappeared while polling for readiness");
                }
                Err(e) => {
                    warn!(identity = %identity, error = %e, "transient error polling workload readiness");
                }
            }

            tokio::time::sleep(self.shared.poll_interval).await;
        }
    }
}

async fn wait_for_outcome(rx: &mut watch::Receiver<StartOutcome>) -> Result<(), Arc<GatewayError>> {
    loop {
        if let Some(outcome) = rx.borrow().clone() {
            return outcome;
        }
        if rx.changed().await.is_err() {
            return Err(Arc::new(GatewayError::StartFailed("start driver dropped unexpectedly".to_string())));
        }
    }
}

/// Clone a `GatewayError` for a client response without requiring `Clone`
/// on every variant's inner I/O types — reconstructed from the display
/// form, since every awaiter needs an independently-ownable error
/// (spec.md §8 invariant 2: "all N observe the same error kind").
trait ClientCloneable {
    fn clone_for_client(&self) -> GatewayError;
}

impl ClientCloneable for GatewayError {
    fn clone_for_client(&self) -> GatewayError {
        match self {
            GatewayError::Cancelled => GatewayError::Cancelled,
            GatewayError::StartTimeout(d) => GatewayError::StartTimeout(*d),
            GatewayError::StartFailed(m) => GatewayError::StartFailed(m.clone()),
            GatewayError::StopFailed(m) => GatewayError::StopFailed(m.clone()),
            GatewayError::ModelNotFound(m) => GatewayError::ModelNotFound(m.clone()),
            GatewayError::ClusterTransient(m) => GatewayError::ClusterTransient(m.clone()),
            GatewayError::Upstream(m) => GatewayError::Upstream(m.clone()),
        }
    }
}
