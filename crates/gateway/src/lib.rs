// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! vgate-gateway: the activity scaler, drift reconciler, gated proxy, and
//! HTTP routes that sit on top of `vgate-lifecycle`.

pub mod drift;
pub mod error;
pub mod metrics;
pub mod proxy;
pub mod routes;
pub mod scaler;
pub mod state;

pub use drift::{DriftReconciler, DEFAULT_DRIFT_CHECK_INTERVAL};
pub use error::GatewayHttpError;
pub use metrics::GatewayMetrics;
pub use routes::build_router;
pub use scaler::{ActivityScaler, DEFAULT_CHECK_INTERVAL, DEFAULT_IDLE_TIMEOUT};
pub use state::GatewayState;
