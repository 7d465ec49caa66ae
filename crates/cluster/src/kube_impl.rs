// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Production `ClusterFacade` backed by `kube`/`k8s-openapi`.
//!
//! Grounded on `KubernetesAdapter` (oddjobs' `agent/k8s/mod.rs`): one
//! `kube::Client`, one `Api::namespaced` per call, `NotFound` kept distinct
//! from transport errors the same way the adapter distinguishes
//! `AgentAdapterError::NotFound` from spawn/transport failures.

use async_trait::async_trait;
use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SelfSubjectAccessReview, SelfSubjectAccessReviewSpec,
};
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{DeleteParams, DynamicObject, GroupVersionKind, ListParams, PostParams};
use kube::core::ApiResource;
use kube::discovery::verbs;
use kube::{Api, Client};
use std::collections::BTreeMap;

use crate::facade::{
    ClusterError, ClusterFacade, CrdCoordinates, ServiceSpec, WorkloadObservation, WorkloadPhase,
    WorkloadSpec,
};

/// Thin wrapper over a `kube::Client`. Holds no other state: identity of the
/// managed workload lives in `vgate-lifecycle`, not here.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub async fn try_default() -> Result<Self, ClusterError> {
        let client = Client::try_default()
            .await
            .map_err(|e| ClusterError::Transport(format!("failed to create kube client: {e}")))?;
        Ok(Self { client })
    }

    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn classify(err: kube::Error) -> ClusterError {
        match &err {
            kube::Error::Api(resp) if resp.code == 404 => {
                ClusterError::NotFound { kind: "resource", name: resp.message.clone() }
            }
            kube::Error::Api(resp) if resp.code == 403 => {
                ClusterError::Forbidden(resp.message.clone())
            }
            kube::Error::Api(resp) if resp.code == 409 => {
                ClusterError::AlreadyExists { kind: "resource", name: resp.message.clone() }
            }
            other => ClusterError::Transport(other.to_string()),
        }
    }
}

/// Decode a Pod's observed phase, readiness, image, and launch arguments
/// into the shape drift detection consumes. Pure function of the `Pod`
/// read back from the API server; exposed so callers building that `Pod`
/// (e.g. `vgate-model`'s workload-spec builder) can round-trip it in tests
/// without a live cluster.
pub fn observe_pod(pod: &Pod) -> WorkloadObservation {
    let phase = pod
        .status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .map(|p| match p {
            "Pending" => WorkloadPhase::Pending,
            "Running" => WorkloadPhase::Running,
            "Failed" => WorkloadPhase::Failed,
            _ => WorkloadPhase::Unknown,
        })
        .unwrap_or(WorkloadPhase::Unknown);

    let ready = pod
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| conds.iter().any(|c| c.type_ == "Ready" && c.status == "True"))
        .unwrap_or(false);

    let container = pod.spec.as_ref().and_then(|s| s.containers.first());
    let image = container.and_then(|c| c.image.clone());

    let mut launch_args = BTreeMap::new();
    if let Some(c) = container {
        if let Some(args) = &c.args {
            parse_flags_into(args, &mut launch_args);
        }
    }

    let image_pull_error = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .and_then(|statuses| statuses.first())
        .and_then(|cs| cs.state.as_ref())
        .and_then(|st| st.waiting.as_ref())
        .filter(|w| w.reason.as_deref() == Some("ImagePullBackOff") || w.reason.as_deref() == Some("ErrImagePull"))
        .and_then(|w| w.message.clone());

    WorkloadObservation { phase, ready, image, launch_args, image_pull_error }
}

/// Parse a `--flag value` / `--flag=value` / bare-flag argument list into
/// the canonical map drift detection compares (spec.md §3's "Effective
/// launch arguments" is equality-by-map, never order-sensitive). Flag names
/// are translated through `canonical_flag_name` since the vLLM CLI spells
/// some of them differently than the canonical drift keys (`--max-model-len`
/// vs. `context-length`).
fn parse_flags_into(args: &[String], out: &mut BTreeMap<String, String>) {
    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        let Some(flag) = arg.strip_prefix("--") else {
            i += 1;
            continue;
        };
        if let Some((name, value)) = flag.split_once('=') {
            out.insert(vgate_core::canonical_flag_name(name), value.to_string());
            i += 1;
        } else if i + 1 < args.len() && !args[i + 1].starts_with("--") {
            out.insert(vgate_core::canonical_flag_name(flag), args[i + 1].clone());
            i += 2;
        } else {
            out.insert(vgate_core::canonical_flag_name(flag), "true".to_string());
            i += 1;
        }
    }
}

#[async_trait]
impl ClusterFacade for KubeCluster {
    async fn get_workload(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkloadObservation>, ClusterError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        match pods.get(name).await {
            Ok(pod) => Ok(Some(observe_pod(&pod))),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(None),
            Err(e) => Err(Self::classify(e)),
        }
    }

    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<(), ClusterError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &spec.namespace);
        tracing::info!(namespace = %spec.namespace, name = %spec.name, "creating backend workload");
        pods.create(&PostParams::default(), &spec.pod).await.map_err(Self::classify)?;
        Ok(())
    }

    async fn delete_workload(
        &self,
        namespace: &str,
        name: &str,
        grace_period_secs: i64,
    ) -> Result<(), ClusterError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let dp = DeleteParams { grace_period_seconds: Some(grace_period_secs as u32), ..Default::default() };
        tracing::info!(%namespace, %name, grace_period_secs, "deleting backend workload");
        match pods.delete(name, &dp).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
            Err(e) => Err(Self::classify(e)),
        }
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<bool, ClusterError> {
        let svcs: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        match svcs.get(name).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(false),
            Err(e) => Err(Self::classify(e)),
        }
    }

    async fn create_service(&self, spec: &ServiceSpec) -> Result<(), ClusterError> {
        let svcs: Api<Service> = Api::namespaced(self.client.clone(), &spec.namespace);
        match svcs.create(&PostParams::default(), &spec.service).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 409 => {
                tracing::debug!(name = %spec.name, "service already exists, leaving in place");
                Ok(())
            }
            Err(e) => Err(Self::classify(e)),
        }
    }

    async fn list_crd_instances(
        &self,
        coords: &CrdCoordinates,
    ) -> Result<Vec<serde_json::Value>, ClusterError> {
        let gvk = GroupVersionKind::gvk(&coords.group, &coords.version, &coords.resource);
        let api_resource = ApiResource::from_gvk(&gvk);
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &api_resource);
        let list = api.list(&ListParams::default()).await.map_err(Self::classify)?;
        Ok(list.items.into_iter().map(|obj| serde_json::to_value(obj).unwrap_or_default()).collect())
    }

    async fn get_crd(&self, name: &str) -> Result<bool, ClusterError> {
        use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
        let crds: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        match crds.get(name).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(false),
            Err(e) => Err(Self::classify(e)),
        }
    }

    async fn check_access(
        &self,
        verb: &str,
        group: &str,
        resource: &str,
        namespace: &str,
    ) -> Result<bool, ClusterError> {
        let review = SelfSubjectAccessReview {
            spec: SelfSubjectAccessReviewSpec {
                resource_attributes: Some(ResourceAttributes {
                    namespace: Some(namespace.to_string()),
                    verb: Some(verb.to_string()),
                    group: Some(group.to_string()),
                    resource: Some(resource.to_string()),
                    ..Default::default()
                }),
                non_resource_attributes: None,
            },
            ..Default::default()
        };
        let api: Api<SelfSubjectAccessReview> = Api::all(self.client.clone());
        let result = api.create(&PostParams::default(), &review).await.map_err(Self::classify)?;
        Ok(result.status.map(|s| s.allowed).unwrap_or(false))
    }
}

/// Verb constants mirrored from `kube::discovery::verbs` for readability at
/// call sites in `vgate-cli`'s bootstrap (e.g. `verbs::CREATE`).
pub use verbs as access_verbs;
