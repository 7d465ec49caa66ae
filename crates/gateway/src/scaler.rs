// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Activity-driven scaler (spec.md §4.2): `Touch`/`Run`/`IsActive` over the
//! shared activity clock, plus the idle-timeout background loop that asks
//! the lifecycle controller to stop the backend.
//!
//! Grounded on the same "tick on an interval, act on a threshold" shape as
//! `spawn_periodic` in the pack's `deltaglider_proxy::main` (a
//! `tokio::time::interval` loop calling a closure every `interval`),
//! generalized here to race against a `CancellationToken` for prompt
//! shutdown, the way the teacher's listener loop races request handling
//! against disconnect detection (`daemon/src/listener/mod.rs`).

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vgate_cluster::ClusterFacade;
use vgate_core::{ActivityClock, Clock, LifecycleState};
use vgate_lifecycle::Lifecycle;

use crate::metrics::GatewayMetrics;

/// Default idle timeout (spec.md §4.2): 5 minutes of inactivity before the
/// next tick tears the backend down.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Default tick interval.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// The idle-timeout loop and its request-path hook (`Touch`).
pub struct ActivityScaler<C: ClusterFacade, CL: Clock> {
    lifecycle: Lifecycle<C>,
    activity: Arc<ActivityClock>,
    clock: CL,
    idle_timeout: Duration,
    check_interval: Duration,
    metrics: Arc<GatewayMetrics>,
}

impl<C: ClusterFacade, CL: Clock> ActivityScaler<C, CL> {
    pub fn new(
        lifecycle: Lifecycle<C>,
        activity: Arc<ActivityClock>,
        clock: CL,
        idle_timeout: Duration,
        check_interval: Duration,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self { lifecycle, activity, clock, idle_timeout, check_interval, metrics }
    }

    /// `Touch()` (spec.md §4.2): O(1), called on every admitted request and
    /// every explicit start.
    pub fn touch(&self) {
        self.activity.touch(self.clock.now());
        self.metrics.set_active(true);
    }

    /// `IsActive() → bool` (spec.md §4.2): used by health endpoints.
    pub fn is_active(&self) -> bool {
        self.activity.idle_for(self.clock.now()) < self.idle_timeout
    }

    /// One idle-check tick, exposed separately from `run` so tests can drive
    /// it directly against a `FakeClock` without waiting on real time.
    pub async fn tick(&self) {
        let active = self.is_active();
        self.metrics.set_active(active);
        if active {
            return;
        }
        // Never abort a cold start in progress (spec.md §4.2): only a
        // `Running` backend is a stop candidate.
        if self.lifecycle.state() != LifecycleState::Running {
            return;
        }
        info!(idle_for = ?self.activity.idle_for(self.clock.now()), "idle timeout exceeded, stopping backend");
        match self.lifecycle.stop().await {
            Ok(()) => {
                self.metrics.record_scale("down", "success");
                self.metrics.set_state(self.lifecycle.state());
            }
            Err(e) => {
                // No exponential backoff: stop is cheap and idempotent, so
                // the next tick simply retries (spec.md §4.2).
                warn!(error = %e, "idle stop failed, will retry next tick");
                self.metrics.record_scale("down", "failure");
            }
        }
    }

    /// Background loop (spec.md §4.2 `Run`): exits promptly on
    /// cancellation, no clean shutdown of in-flight stops required.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.check_interval);
        interval.tick().await; // first tick fires immediately; skip it
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("activity scaler loop cancelled");
                    return;
                }
                _ = interval.tick() => self.tick().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use vgate_cluster::FakeCluster;
    use vgate_core::{FakeClock, InfrastructureSpec, WorkloadIdentity};
    use vgate_model::{ModelCrdCoordinates, ModelRegistry};

    fn model_json(served_name: &str) -> serde_json::Value {
        serde_json::json!({
            "spec": {
                "model_id": "meta-llama/Llama-3-8B",
                "served_name": served_name,
                "context_length": 4096,
                "memory_utilization": "0.9",
                "batched_tokens": 8192,
                "max_sequences": 256,
                "precision": "bfloat16",
                "prefix_caching": false,
                "tool_call_parser": null,
                "reasoning_parser": null,
            }
        })
    }

    fn infra() -> InfrastructureSpec {
        InfrastructureSpec {
            gpu_count: 1,
            cpu_offload_gb: 0,
            image: "vllm/vllm-openai:v0.6.0".to_string(),
            model_cache_path: "/mnt/model-cache".to_string(),
            compile_cache_path: "/mnt/compile-cache".to_string(),
            shared_memory_size: "8Gi".to_string(),
            api_key_secret_ref: None,
        }
    }

    fn scaler(
        fake: Arc<FakeCluster>,
        activity: Arc<ActivityClock>,
        clock: FakeClock,
        idle_timeout: Duration,
    ) -> ActivityScaler<FakeCluster, FakeClock> {
        fake.set_crd_items(vec![model_json("llama3")]);
        let registry = Arc::new(ModelRegistry::new(fake.clone(), ModelCrdCoordinates::default()));
        let lifecycle = Lifecycle::new(
            fake,
            registry,
            "llama3".to_string(),
            infra(),
            WorkloadIdentity::new("vllm", "vllm"),
        );
        ActivityScaler::new(
            lifecycle,
            activity,
            clock,
            idle_timeout,
            Duration::from_secs(30),
            Arc::new(GatewayMetrics::new()),
        )
    }

    #[tokio::test]
    async fn tick_stops_a_running_backend_past_idle_timeout() {
        let fake = Arc::new(FakeCluster::new());
        fake.mark_ready(Default::default());
        let epoch = Instant::now();
        let activity = Arc::new(ActivityClock::new(epoch));
        let clock = FakeClock::new();
        let s = scaler(fake.clone(), activity.clone(), clock.clone(), Duration::from_secs(5));

        // Adopt the already-ready workload so state becomes Running.
        s.lifecycle.ensure_running(Duration::from_secs(1)).await.unwrap();
        activity.touch(clock.now());
        clock.advance(Duration::from_secs(10));

        s.tick().await;
        assert_eq!(fake.delete_workload_count(), 1);
        assert_eq!(s.lifecycle.state(), LifecycleState::Absent);
    }

    #[tokio::test]
    async fn tick_does_not_stop_while_still_active() {
        let fake = Arc::new(FakeCluster::new());
        fake.mark_ready(Default::default());
        let epoch = Instant::now();
        let activity = Arc::new(ActivityClock::new(epoch));
        let clock = FakeClock::new();
        let s = scaler(fake.clone(), activity.clone(), clock.clone(), Duration::from_secs(300));

        s.lifecycle.ensure_running(Duration::from_secs(1)).await.unwrap();
        activity.touch(clock.now());
        clock.advance(Duration::from_secs(10));

        s.tick().await;
        assert_eq!(fake.delete_workload_count(), 0);
    }

    #[tokio::test]
    async fn tick_never_aborts_a_cold_start_in_progress() {
        let fake = Arc::new(FakeCluster::new());
        // Never mark ready — lifecycle stays in Starting.
        let epoch = Instant::now();
        let activity = Arc::new(ActivityClock::new(epoch));
        let clock = FakeClock::new();
        let s = scaler(fake.clone(), activity.clone(), clock.clone(), Duration::from_millis(1));

        let lc = s.lifecycle.clone();
        let driver = tokio::spawn(async move { lc.ensure_running(Duration::from_secs(2)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        clock.advance(Duration::from_secs(10));

        s.tick().await;
        assert_eq!(fake.delete_workload_count(), 0, "idleness must not abort an in-flight start");
        drop(driver);
    }

    #[test]
    fn is_active_reflects_idle_timeout_boundary() {
        let epoch = Instant::now();
        let activity = Arc::new(ActivityClock::new(epoch));
        let clock = FakeClock::new();
        clock.set(epoch);
        let fake = Arc::new(FakeCluster::new());
        let s = scaler(fake, activity.clone(), clock.clone(), Duration::from_secs(5));
        activity.touch(clock.now());
        assert!(s.is_active());
        clock.advance(Duration::from_secs(10));
        assert!(!s.is_active());
    }
}
