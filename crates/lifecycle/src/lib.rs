// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! vgate-lifecycle: the backend-workload state machine (spec.md §4.1).
//! Single writer to the cluster for workload create/delete; every other
//! collaborator injects this as a capability rather than calling the
//! cluster directly.

mod controller;

pub use controller::{Lifecycle, DEFAULT_COLD_START_BUDGET, DEFAULT_POLL_INTERVAL};
