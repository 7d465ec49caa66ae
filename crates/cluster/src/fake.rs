// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory `ClusterFacade` fake for tests, the same shape as the
//! teacher's `test-support` feature on `oj-adapters`/`oj-core`: no real
//! cluster, every call recorded so property tests (spec.md §8) can assert
//! on call counts.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::facade::{
    ClusterError, ClusterFacade, CrdCoordinates, ServiceSpec, WorkloadObservation, WorkloadPhase,
    WorkloadSpec,
};

/// A recorded call, for assertions like invariant 1 in spec.md §8
/// ("exactly one cluster `CreateWorkload` call is observed").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    GetWorkload { namespace: String, name: String },
    CreateWorkload { namespace: String, name: String },
    DeleteWorkload { namespace: String, name: String, grace_period_secs: i64 },
    GetService { namespace: String, name: String },
    CreateService { namespace: String, name: String },
    ListCrdInstances { resource: String },
    GetCrd { name: String },
    CheckAccess { verb: String, resource: String },
}

struct Inner {
    workload: Option<WorkloadObservation>,
    crd_items: Vec<serde_json::Value>,
    crd_installed: bool,
    access_granted: bool,
    service_exists: bool,
    calls: Vec<RecordedCall>,
    /// When set, `create_workload` fails with this error instead of
    /// succeeding — used to drive StartFailed scenarios.
    fail_create: Option<ClusterError>,
    fail_list_crd: Option<ClusterError>,
}

/// Test double for the cluster control plane. `Clone` is cheap (shared
/// `Arc`); every clone observes the same underlying state.
#[derive(Clone)]
pub struct FakeCluster {
    inner: Arc<Mutex<Inner>>,
    create_count: Arc<AtomicUsize>,
    delete_count: Arc<AtomicUsize>,
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCluster {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                workload: None,
                crd_items: Vec::new(),
                crd_installed: true,
                access_granted: true,
                service_exists: false,
                calls: Vec::new(),
                fail_create: None,
                fail_list_crd: None,
            })),
            create_count: Arc::new(AtomicUsize::new(0)),
            delete_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.inner.lock().calls.clone()
    }

    pub fn create_workload_count(&self) -> usize {
        self.create_count.load(Ordering::SeqCst)
    }

    pub fn delete_workload_count(&self) -> usize {
        self.delete_count.load(Ordering::SeqCst)
    }

    /// Directly mutate the observed workload, simulating the cluster
    /// reaching a new phase without going through `create_workload` (e.g.
    /// a health probe succeeding asynchronously).
    pub fn set_observation(&self, obs: Option<WorkloadObservation>) {
        self.inner.lock().workload = obs;
    }

    pub fn mark_ready(&self, launch_args: BTreeMap<String, String>) {
        let mut inner = self.inner.lock();
        inner.workload = Some(WorkloadObservation {
            phase: WorkloadPhase::Running,
            ready: true,
            image: Some("vllm/vllm-openai:latest".to_string()),
            launch_args,
            image_pull_error: None,
        });
    }

    pub fn mark_failed(&self, reason: impl Into<String>) {
        let mut inner = self.inner.lock();
        inner.workload = Some(WorkloadObservation {
            phase: WorkloadPhase::Failed,
            ready: false,
            image: None,
            launch_args: BTreeMap::new(),
            image_pull_error: Some(reason.into()),
        });
    }

    pub fn set_crd_items(&self, items: Vec<serde_json::Value>) {
        self.inner.lock().crd_items = items;
    }

    pub fn set_crd_installed(&self, installed: bool) {
        self.inner.lock().crd_installed = installed;
    }

    pub fn set_access_granted(&self, granted: bool) {
        self.inner.lock().access_granted = granted;
    }

    pub fn fail_next_create(&self, err: ClusterError) {
        self.inner.lock().fail_create = Some(err);
    }

    pub fn fail_list_crd(&self, err: ClusterError) {
        self.inner.lock().fail_list_crd = Some(err);
    }
}

#[async_trait]
impl ClusterFacade for FakeCluster {
    async fn get_workload(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkloadObservation>, ClusterError> {
        let mut inner = self.inner.lock();
        inner.calls.push(RecordedCall::GetWorkload {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        Ok(inner.workload.clone())
    }

    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<(), ClusterError> {
        let mut inner = self.inner.lock();
        inner.calls.push(RecordedCall::CreateWorkload {
            namespace: spec.namespace.clone(),
            name: spec.name.clone(),
        });
        self.create_count.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = inner.fail_create.take() {
            return Err(err);
        }
        if inner.workload.is_some() {
            return Err(ClusterError::AlreadyExists { kind: "pod", name: spec.name.clone() });
        }
        inner.workload = Some(WorkloadObservation {
            phase: WorkloadPhase::Pending,
            ready: false,
            image: None,
            launch_args: BTreeMap::new(),
            image_pull_error: None,
        });
        Ok(())
    }

    async fn delete_workload(
        &self,
        namespace: &str,
        name: &str,
        grace_period_secs: i64,
    ) -> Result<(), ClusterError> {
        let mut inner = self.inner.lock();
        inner.calls.push(RecordedCall::DeleteWorkload {
            namespace: namespace.to_string(),
            name: name.to_string(),
            grace_period_secs,
        });
        self.delete_count.fetch_add(1, Ordering::SeqCst);
        inner.workload = None;
        Ok(())
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<bool, ClusterError> {
        let mut inner = self.inner.lock();
        inner.calls.push(RecordedCall::GetService {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        Ok(inner.service_exists)
    }

    async fn create_service(&self, spec: &ServiceSpec) -> Result<(), ClusterError> {
        let mut inner = self.inner.lock();
        inner.calls.push(RecordedCall::CreateService {
            namespace: spec.namespace.clone(),
            name: spec.name.clone(),
        });
        inner.service_exists = true;
        Ok(())
    }

    async fn list_crd_instances(
        &self,
        coords: &CrdCoordinates,
    ) -> Result<Vec<serde_json::Value>, ClusterError> {
        let mut inner = self.inner.lock();
        inner.calls.push(RecordedCall::ListCrdInstances { resource: coords.resource.clone() });
        if let Some(err) = inner.fail_list_crd.clone() {
            return Err(err);
        }
        Ok(inner.crd_items.clone())
    }

    async fn get_crd(&self, name: &str) -> Result<bool, ClusterError> {
        let mut inner = self.inner.lock();
        inner.calls.push(RecordedCall::GetCrd { name: name.to_string() });
        Ok(inner.crd_installed)
    }

    async fn check_access(
        &self,
        verb: &str,
        _group: &str,
        resource: &str,
        _namespace: &str,
    ) -> Result<bool, ClusterError> {
        let mut inner = self.inner.lock();
        inner.calls.push(RecordedCall::CheckAccess {
            verb: verb.to_string(),
            resource: resource.to_string(),
        });
        Ok(inner.access_granted)
    }
}
