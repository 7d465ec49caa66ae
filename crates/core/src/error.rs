// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared across the gateway (spec.md §7).
//!
//! Each variant knows its own `type` string for the `{error: {message,
//! type}}` JSON body and, implicitly, its client-visible disposition; the
//! HTTP mapping itself lives in `vgate-gateway` where axum's `IntoResponse`
//! is in scope.

use serde::Serialize;
use thiserror::Error;

/// The `type` field of the user-visible error body (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    StartFailed,
    StopFailed,
    ModelNotFound,
    BackendUnavailable,
    Timeout,
}

/// Errors raised while starting, stopping, or observing the backend
/// workload. Not the full taxonomy of spec.md §7 — `ConfigInvalid`,
/// `AuthorizationDenied`, and `CRDMissing` are fatal startup errors handled
/// by the thin `vgate-cli` adapter and never flow through this type.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("context cancelled while waiting for backend readiness")]
    Cancelled,

    #[error("cold-start budget exceeded after {0:?}")]
    StartTimeout(std::time::Duration),

    #[error("backend start failed: {0}")]
    StartFailed(String),

    #[error("backend stop failed: {0}")]
    StopFailed(String),

    #[error("model {0:?} not found in registry")]
    ModelNotFound(String),

    #[error("cluster call failed: {0}")]
    ClusterTransient(String),

    #[error("upstream returned an error: {0}")]
    Upstream(String),
}

impl GatewayError {
    pub fn error_type(&self) -> ErrorType {
        match self {
            GatewayError::StartTimeout(_) => ErrorType::Timeout,
            GatewayError::StartFailed(_) | GatewayError::Cancelled => ErrorType::StartFailed,
            GatewayError::StopFailed(_) => ErrorType::StopFailed,
            GatewayError::ModelNotFound(_) => ErrorType::ModelNotFound,
            GatewayError::ClusterTransient(_) | GatewayError::Upstream(_) => {
                ErrorType::BackendUnavailable
            }
        }
    }
}

/// JSON body shape for client-visible failures: `{error: {message, type}}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: ErrorType,
}

impl From<&GatewayError> for ErrorBody {
    fn from(err: &GatewayError) -> Self {
        ErrorBody { error: ErrorDetail { message: err.to_string(), error_type: err.error_type() } }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_serializes_with_type_field() {
        let err = GatewayError::StartFailed("image pull backoff".to_string());
        let body = ErrorBody::from(&err);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"]["type"], "start_failed");
        assert!(json["error"]["message"].as_str().unwrap().contains("image pull"));
    }

    #[test]
    fn timeout_maps_to_timeout_type() {
        let err = GatewayError::StartTimeout(std::time::Duration::from_secs(120));
        assert_eq!(err.error_type(), ErrorType::Timeout);
    }
}
