// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The backend lifecycle state machine (data only — no transition logic).
//!
//! `vgate-lifecycle` owns the mutex and the transitions; this module defines
//! the vocabulary both `vgate-lifecycle` and `vgate-gateway` read.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of the single managed backend workload.
///
/// `Failed` is not terminal: the controller re-enters `Absent` on the next
/// request or reconcile tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Absent,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl LifecycleState {
    /// Prometheus gauge value used for `vllm_state`, per spec.md §6.
    pub fn gauge_value(self) -> i64 {
        match self {
            LifecycleState::Absent => 0,
            LifecycleState::Starting => 1,
            LifecycleState::Running => 2,
            LifecycleState::Stopping => 3,
            LifecycleState::Failed => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Absent => "absent",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Failed => "failed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time read of lifecycle state, returned by `Observe()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleSnapshot {
    pub state: LifecycleState,
    /// Monotonically increasing; bumped on every transition.
    pub version: u64,
    /// Cluster phase as last observed (pending/running/failed/unknown), when known.
    pub observed_phase: Option<String>,
    pub replicas_observed: u32,
}

/// Identity of the single managed backend workload: (namespace, name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadIdentity {
    pub namespace: String,
    pub name: String,
}

impl WorkloadIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }
}

impl fmt::Display for WorkloadIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
