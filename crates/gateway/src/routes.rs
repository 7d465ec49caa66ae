// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The inbound HTTP surface (spec.md §6): health, metrics, model registry
//! reads, explicit start/stop, and the gated backend proxy as the fallback.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use vgate_cluster::ClusterFacade;
use vgate_core::{Clock, ErrorBody, GatewayError, HealthBody, LifecycleState, ModelSummary};

use crate::error::GatewayHttpError;
use crate::proxy::proxy;
use crate::state::GatewayState;

/// Build the full router: management endpoints plus the proxy fallback.
///
/// `TraceLayer` wraps every route uniformly, the same way
/// `stonescriptdb-gateway` layers its `axum::Router`; the `log-output`
/// response-body preview (spec.md §6) is a separate, narrower mechanism in
/// `proxy.rs` since it needs access to the streamed bytes themselves, not
/// just span-level request/response metadata.
pub fn build_router<C: ClusterFacade, CL: Clock>(state: Arc<GatewayState<C, CL>>) -> Router {
    Router::new()
        .route("/health", get(health::<C, CL>))
        .route("/metrics", get(metrics::<C, CL>))
        .route("/models/available", get(models_available::<C, CL>))
        .route("/models/running", get(models_running::<C, CL>))
        .route("/operations/start", post(start::<C, CL>))
        .route("/operations/stop", post(stop::<C, CL>))
        .fallback(proxy::<C, CL>)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health<C: ClusterFacade, CL: Clock>(
    State(state): State<Arc<GatewayState<C, CL>>>,
) -> Json<HealthBody> {
    Json(HealthBody::new(state.lifecycle.state(), state.scaler.is_active()))
}

async fn metrics<C: ClusterFacade, CL: Clock>(
    State(state): State<Arc<GatewayState<C, CL>>>,
) -> Response {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}

async fn models_available<C: ClusterFacade, CL: Clock>(
    State(state): State<Arc<GatewayState<C, CL>>>,
) -> Result<Json<Vec<ModelSummary>>, GatewayHttpError> {
    let summaries = state
        .registry
        .list_available()
        .await
        .map_err(|e| GatewayHttpError(vgate_core::GatewayError::ClusterTransient(e.to_string())))?;
    Ok(Json(summaries))
}

#[derive(Debug, Serialize)]
struct RunningModel {
    #[serde(flatten)]
    summary: Option<ModelSummary>,
    state: LifecycleState,
}

async fn models_running<C: ClusterFacade, CL: Clock>(
    State(state): State<Arc<GatewayState<C, CL>>>,
) -> Result<Json<RunningModel>, GatewayHttpError> {
    let lifecycle_state = state.lifecycle.state();
    let summary = if lifecycle_state == LifecycleState::Running {
        state
            .registry
            .resolve(&state.served_name)
            .await
            .map(|spec| ModelSummary::from(&spec))
            .ok()
    } else {
        None
    };
    Ok(Json(RunningModel { summary, state: lifecycle_state }))
}

/// `POST /operations/start` (spec.md §6): explicit wake, also touches
/// activity so an immediately-following idle tick does not race it.
///
/// Unlike the gated proxy path (spec.md §4.3/§7, where `StartTimeout`/
/// `StartFailed` surface as 504/502 to a request waiting on the start
/// token), this management endpoint reports any start failure as a flat
/// 500 (spec.md §6: "returns 200 on `Running`, 500 on start failure"),
/// except `ModelNotFound`, which every management endpoint reports as 404.
async fn start<C: ClusterFacade, CL: Clock>(
    State(state): State<Arc<GatewayState<C, CL>>>,
) -> Response {
    state.scaler.touch();
    match state.lifecycle.ensure_running(state.cold_start_budget).await {
        Ok(()) => {
            state.metrics.record_scale("up", "success");
            state.metrics.set_state(state.lifecycle.state());
            Json(HealthBody::new(LifecycleState::Running, true)).into_response()
        }
        Err(e) => {
            state.metrics.record_scale("up", "failure");
            state.metrics.set_state(state.lifecycle.state());
            let status = match &e {
                GatewayError::ModelNotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(ErrorBody::from(&e))).into_response()
        }
    }
}

/// `POST /operations/stop` (spec.md §6): explicit teardown.
async fn stop<C: ClusterFacade, CL: Clock>(
    State(state): State<Arc<GatewayState<C, CL>>>,
) -> Result<StatusCode, GatewayHttpError> {
    match state.lifecycle.stop().await {
        Ok(()) => {
            state.metrics.record_scale("down", "success");
            state.metrics.set_state(state.lifecycle.state());
            Ok(StatusCode::OK)
        }
        Err(e) => {
            state.metrics.record_scale("down", "failure");
            Err(GatewayHttpError(e))
        }
    }
}
