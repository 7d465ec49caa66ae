// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Model registry: `Resolve`/`ListAvailable` over a cluster-scoped CRD
//! (spec.md §4.4). Decodes each CRD instance's `spec` field into a
//! `ModelSpec`; the registry itself never caches across calls — every
//! `Resolve` and the drift reconciler's periodic check re-read the CRD so a
//! CRD update is observed without restarting the gateway.

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use vgate_cluster::{ClusterError, ClusterFacade, CrdCoordinates};
use vgate_core::{ModelSpec, ModelSummary};

/// Group/version/resource coordinates of the model CRD this registry reads.
#[derive(Debug, Clone)]
pub struct ModelCrdCoordinates {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl Default for ModelCrdCoordinates {
    fn default() -> Self {
        Self {
            group: "vgate.dev".to_string(),
            version: "v1".to_string(),
            resource: "modelspecs".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("model {0:?} not found in registry")]
    NotFound(String),

    #[error("cluster call failed: {0}")]
    Cluster(#[from] ClusterError),

    #[error("malformed CRD instance: {0}")]
    Malformed(String),
}

/// The decoded shape of one CRD instance: `{ spec: ModelSpec, ... }`, same
/// convention as any Kubernetes custom resource.
#[derive(Debug, serde::Deserialize)]
struct CrdInstance {
    spec: ModelSpec,
}

/// Reads the declared model CRD and resolves a served-name to a `ModelSpec`
/// (spec.md §4.4's `Resolve`/`ListAvailable`).
pub struct ModelRegistry<C: ClusterFacade> {
    cluster: Arc<C>,
    coords: ModelCrdCoordinates,
}

impl<C: ClusterFacade> ModelRegistry<C> {
    pub fn new(cluster: Arc<C>, coords: ModelCrdCoordinates) -> Self {
        Self { cluster, coords }
    }

    fn crd_coordinates(&self) -> CrdCoordinates {
        CrdCoordinates {
            group: self.coords.group.clone(),
            version: self.coords.version.clone(),
            resource: self.coords.resource.clone(),
        }
    }

    async fn fetch_all(&self) -> Result<Vec<ModelSpec>, RegistryError> {
        let coords = self.crd_coordinates();
        debug!(group = %coords.group, resource = %coords.resource, "reading model registry CRD");
        let items = self.cluster.list_crd_instances(&coords).await?;
        items
            .into_iter()
            .map(|v| {
                serde_json::from_value::<CrdInstance>(v)
                    .map(|inst| inst.spec)
                    .map_err(|e| RegistryError::Malformed(e.to_string()))
            })
            .collect()
    }

    /// `Resolve(servedName) → ModelSpec | NotFound`.
    pub async fn resolve(&self, served_name: &str) -> Result<ModelSpec, RegistryError> {
        let all = self.fetch_all().await?;
        all.into_iter()
            .find(|m| m.served_name == served_name)
            .ok_or_else(|| RegistryError::NotFound(served_name.to_string()))
    }

    /// `ListAvailable() → []ModelSummary`.
    pub async fn list_available(&self) -> Result<Vec<ModelSummary>, RegistryError> {
        let all = self.fetch_all().await?;
        Ok(all.iter().map(ModelSummary::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vgate_cluster::FakeCluster;

    fn model_json(served_name: &str, context_length: u32) -> serde_json::Value {
        serde_json::json!({
            "spec": {
                "model_id": "meta-llama/Llama-3-8B",
                "served_name": served_name,
                "context_length": context_length,
                "memory_utilization": "0.9",
                "batched_tokens": 8192,
                "max_sequences": 256,
                "precision": "bfloat16",
                "prefix_caching": true,
                "tool_call_parser": null,
                "reasoning_parser": null,
            }
        })
    }

    #[tokio::test]
    async fn resolve_finds_matching_served_name() {
        let fake = Arc::new(FakeCluster::new());
        fake.set_crd_items(vec![model_json("llama3", 4096), model_json("mistral", 8192)]);
        let registry = ModelRegistry::new(fake, ModelCrdCoordinates::default());
        let resolved = registry.resolve("mistral").await.unwrap();
        assert_eq!(resolved.context_length, 8192);
    }

    #[tokio::test]
    async fn resolve_missing_served_name_is_not_found() {
        let fake = Arc::new(FakeCluster::new());
        fake.set_crd_items(vec![model_json("llama3", 4096)]);
        let registry = ModelRegistry::new(fake, ModelCrdCoordinates::default());
        let err = registry.resolve("nonexistent").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_available_summarizes_all_entries() {
        let fake = Arc::new(FakeCluster::new());
        fake.set_crd_items(vec![model_json("llama3", 4096), model_json("mistral", 8192)]);
        let registry = ModelRegistry::new(fake, ModelCrdCoordinates::default());
        let summaries = registry.list_available().await.unwrap();
        assert_eq!(summaries.len(), 2);
    }

    #[tokio::test]
    async fn transient_cluster_error_propagates_without_retry() {
        let fake = Arc::new(FakeCluster::new());
        fake.fail_list_crd(ClusterError::Transport("etcd unavailable".to_string()));
        let registry = ModelRegistry::new(fake, ModelCrdCoordinates::default());
        assert!(registry.resolve("llama3").await.is_err());
    }
}
