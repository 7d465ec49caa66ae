// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP mapping for `GatewayError`: the error taxonomy's status-code half,
//! kept here rather than in `vgate-core` since axum's `IntoResponse` is only
//! in scope at this boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use vgate_core::{ErrorBody, GatewayError};

/// Newtype so `IntoResponse` can be implemented here without an orphan-rule
/// conflict (`GatewayError` and `IntoResponse` both live outside this crate).
pub struct GatewayHttpError(pub GatewayError);

impl From<GatewayError> for GatewayHttpError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for GatewayHttpError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GatewayError::ModelNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::StartTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::StartFailed(_) | GatewayError::Cancelled => StatusCode::BAD_GATEWAY,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::StopFailed(_) | GatewayError::ClusterTransient(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn model_not_found_maps_to_404() {
        let resp = GatewayHttpError(GatewayError::ModelNotFound("llama3".to_string())).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["type"], "model_not_found");
    }

    #[tokio::test]
    async fn start_timeout_maps_to_504() {
        let resp = GatewayHttpError(GatewayError::StartTimeout(std::time::Duration::from_secs(120)))
            .into_response();
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn start_failed_maps_to_502() {
        let resp = GatewayHttpError(GatewayError::StartFailed("image pull backoff".to_string()))
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }
}
