// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health type shared between the gateway's background loops and `/health`.

use serde::{Deserialize, Serialize};

use crate::state::LifecycleState;

/// Body returned by `GET /health` (spec.md §6): a non-blocking read that
/// never touches the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthBody {
    pub status: &'static str,
    pub is_active: bool,
    pub state: LifecycleState,
}

impl HealthBody {
    pub fn new(state: LifecycleState, is_active: bool) -> Self {
        Self { status: "ok", is_active, state }
    }
}
