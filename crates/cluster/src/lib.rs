// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! The cluster facade (spec.md §4.6): the only boundary the core depends on
//! against the cluster control plane.
//!
//! Grounded on `oj-adapters`' `KubernetesAdapter`: a `kube::Client` held
//! behind a small capability trait, one `Api::namespaced` per call, and a
//! `NotFound` error variant kept distinct from transport failures so callers
//! can tell "doesn't exist yet" from "couldn't reach the API server".

pub mod facade;
pub mod kube_impl;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use facade::{
    ClusterError, ClusterFacade, CrdCoordinates, ServiceSpec, WorkloadObservation, WorkloadPhase,
    WorkloadSpec,
};
pub use kube_impl::{observe_pod, KubeCluster};

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeCluster;
