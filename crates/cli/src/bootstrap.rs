// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup authorization and bootstrap (spec.md §4.7): thin adapters over
//! the cluster facade that run once before the gateway starts serving.
//!
//! Grounded on `simple-rack-garage-operator`'s `src/bin/operator.rs`, which
//! checks the CRD is queryable before starting its controller loop and exits
//! the process immediately if it is not — the same fatal-preflight shape
//! this module generalizes to an access check, a CRD check, and an
//! idempotent Service creation.

use thiserror::Error;
use tracing::{info, warn};

use vgate_cluster::kube_impl::access_verbs;
use vgate_cluster::{ClusterFacade, CrdCoordinates};
use vgate_model::build_service_spec;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("not authorized to manage backend workloads in namespace {namespace:?}: missing {verb} on {resource}")]
    AuthorizationDenied { verb: &'static str, resource: &'static str, namespace: String },

    #[error("model CRD {group}/{version} {resource} is not installed")]
    CrdMissing { group: String, version: String, resource: String },

    #[error("cluster call failed during bootstrap: {0}")]
    Cluster(#[from] vgate_cluster::ClusterError),
}

const MODEL_CRD_GROUP: &str = "vgate.dev";
const MODEL_CRD_VERSION: &str = "v1";
const MODEL_CRD_RESOURCE: &str = "modelspecs";

/// Run every startup check in order, fatally on first failure (spec.md
/// §4.7, §6 exit codes: any failure here is exit code 1).
pub async fn run<C: ClusterFacade>(cluster: &C, config: &Config) -> Result<(), BootstrapError> {
    check_access(cluster, access_verbs::CREATE, "pods", &config.namespace).await?;
    check_access(cluster, access_verbs::DELETE, "pods", &config.namespace).await?;
    check_access(cluster, access_verbs::CREATE, "services", &config.namespace).await?;

    check_crd(cluster).await?;
    ensure_service(cluster, config).await?;

    info!("bootstrap checks passed");
    Ok(())
}

async fn check_access<C: ClusterFacade>(
    cluster: &C,
    verb: &'static str,
    resource: &'static str,
    namespace: &str,
) -> Result<(), BootstrapError> {
    let allowed = cluster.check_access(verb, "", resource, namespace).await?;
    if !allowed {
        return Err(BootstrapError::AuthorizationDenied {
            verb,
            resource,
            namespace: namespace.to_string(),
        });
    }
    Ok(())
}

async fn check_crd<C: ClusterFacade>(cluster: &C) -> Result<(), BootstrapError> {
    let coords = CrdCoordinates {
        group: MODEL_CRD_GROUP.to_string(),
        version: MODEL_CRD_VERSION.to_string(),
        resource: MODEL_CRD_RESOURCE.to_string(),
    };
    let installed = cluster.get_crd(&format!("{}.{}", coords.resource, coords.group)).await?;
    if !installed {
        return Err(BootstrapError::CrdMissing {
            group: coords.group,
            version: coords.version,
            resource: coords.resource,
        });
    }
    Ok(())
}

/// Idempotent: leaves an existing `vllm-api` Service untouched, creates it
/// if absent (spec.md §6 "Cluster objects created").
async fn ensure_service<C: ClusterFacade>(cluster: &C, config: &Config) -> Result<(), BootstrapError> {
    let service_name = "vllm-api";
    if cluster.get_service(&config.namespace, service_name).await? {
        info!(namespace = %config.namespace, name = service_name, "service already present");
        return Ok(());
    }
    warn!(namespace = %config.namespace, name = service_name, "creating missing service");
    let spec = build_service_spec(&config.namespace, service_name);
    cluster.create_service(&spec).await?;
    Ok(())
}
