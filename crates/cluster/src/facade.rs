// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The capability set the core depends on against the cluster control plane
//! (spec.md §4.6). Production implements it against `kube`; tests against an
//! in-memory fake. Nothing above this trait knows the difference.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors from any cluster call. Transport failures are kept distinct from
/// `NotFound` so callers can tell "doesn't exist yet" from "couldn't reach
/// the API server" (spec.md §4.6).
#[derive(Debug, Error, Clone)]
pub enum ClusterError {
    #[error("{kind} {name:?} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("access denied: {0}")]
    Forbidden(String),

    #[error("cluster transport error: {0}")]
    Transport(String),

    #[error("already exists: {kind} {name:?}")]
    AlreadyExists { kind: &'static str, name: String },
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound { .. })
    }
}

/// Phase as reported by the cluster, independent of our own lifecycle state
/// (spec.md §3: "existence, phase (pending / running / failed / unknown)").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadPhase {
    Pending,
    Running,
    Failed,
    Unknown,
}

/// A non-blocking read of the workload as currently observed in the cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadObservation {
    pub phase: WorkloadPhase,
    /// True once the health probe the spec builder attached is passing.
    pub ready: bool,
    /// Container image of the running workload, if observed.
    pub image: Option<String>,
    /// Launch arguments as observed in the container spec, decoded into the
    /// same flag-name to value shape `EffectiveArgs` uses, so drift
    /// detection never has to re-parse a command line.
    pub launch_args: BTreeMap<String, String>,
    /// Non-zero reason reported by the cluster on a failed pull, if any.
    pub image_pull_error: Option<String>,
}

/// A fully-built, cluster-API-ready workload object (spec.md §4.5's output).
/// Opaque from the core's point of view beyond identity; `vgate-model`
/// builds it, `vgate-cluster` knows how to serialize it.
#[derive(Debug, Clone)]
pub struct WorkloadSpec {
    pub namespace: String,
    pub name: String,
    pub pod: k8s_openapi::api::core::v1::Pod,
}

/// The companion Service fronting the backend workload (spec.md §6).
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub namespace: String,
    pub name: String,
    pub service: k8s_openapi::api::core::v1::Service,
}

/// Coordinates of a CRD instance list: `ListCRDInstances(group,version,resource)`.
#[derive(Debug, Clone)]
pub struct CrdCoordinates {
    pub group: String,
    pub version: String,
    pub resource: String,
}

/// The cluster facade (spec.md §4.6): the ONLY boundary the lifecycle
/// controller, model registry, and bootstrap code depend on.
#[async_trait]
pub trait ClusterFacade: Send + Sync + 'static {
    async fn get_workload(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkloadObservation>, ClusterError>;

    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<(), ClusterError>;

    /// Delete with the given grace period in seconds; `0` for the
    /// zero-grace-period stop sequence of spec.md §4.1.
    async fn delete_workload(
        &self,
        namespace: &str,
        name: &str,
        grace_period_secs: i64,
    ) -> Result<(), ClusterError>;

    async fn get_service(&self, namespace: &str, name: &str) -> Result<bool, ClusterError>;

    async fn create_service(&self, spec: &ServiceSpec) -> Result<(), ClusterError>;

    async fn list_crd_instances(
        &self,
        coords: &CrdCoordinates,
    ) -> Result<Vec<serde_json::Value>, ClusterError>;

    async fn get_crd(&self, name: &str) -> Result<bool, ClusterError>;

    async fn check_access(
        &self,
        verb: &str,
        group: &str,
        resource: &str,
        namespace: &str,
    ) -> Result<bool, ClusterError>;
}
