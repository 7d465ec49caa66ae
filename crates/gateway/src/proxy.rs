// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The gated backend proxy: classify, gate on `EnsureRunning`, stream the
//! request body upstream and the response body back, touching activity at
//! request start and first response byte.
//!
//! Grounded on `deltaglider_proxy`'s axum handlers for the body-streaming
//! shape (request/response bodies never fully buffered) and on
//! `stonescriptdb-gateway`'s single wildcard object route for the
//! catch-all-forward idea, generalized here to a single upstream instead of
//! per-bucket routing.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use parking_lot::Mutex;
use tracing::{debug, warn};

use vgate_cluster::ClusterFacade;
use vgate_core::Clock;

use crate::error::GatewayHttpError;
use crate::state::GatewayState;

const HOP_BY_HOP: &[&str] = &["host", "connection", "keep-alive", "transfer-encoding", "upgrade"];

/// Upper bound on the response-body preview captured when `log-output` is
/// enabled (spec.md §6): never the full body, just enough to see what came
/// back, regardless of how large the actual response is.
const RESPONSE_PREVIEW_CAP: usize = 2048;

/// Accumulates a bounded prefix of response bytes as the stream passes
/// through, then logs it once the stream (and every clone of this handle) is
/// dropped — i.e. once the body has finished forwarding to the client.
struct ResponsePreview {
    path: String,
    buf: Mutex<Vec<u8>>,
}

impl ResponsePreview {
    fn push(&self, bytes: &[u8]) {
        let mut buf = self.buf.lock();
        if buf.len() >= RESPONSE_PREVIEW_CAP {
            return;
        }
        let take = (RESPONSE_PREVIEW_CAP - buf.len()).min(bytes.len());
        buf.extend_from_slice(&bytes[..take]);
    }
}

impl Drop for ResponsePreview {
    fn drop(&mut self) {
        let buf = self.buf.lock();
        if !buf.is_empty() {
            debug!(path = %self.path, preview = %String::from_utf8_lossy(&buf), "response body preview");
        }
    }
}

fn strip_hop_by_hop(mut headers: HeaderMap) -> HeaderMap {
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
    headers
}

/// Classify-gate-forward the inbound request (spec.md §4.3). Registered as
/// the router's `fallback` so every path not claimed by a management route
/// lands here.
pub async fn proxy<C: ClusterFacade, CL: Clock>(
    State(state): State<Arc<GatewayState<C, CL>>>,
    req: Request,
) -> Result<Response, GatewayHttpError> {
    state.scaler.touch();
    let start = Instant::now();

    if let Err(e) = state.lifecycle.ensure_running(state.cold_start_budget).await {
        state.metrics.record_request("gated", start.elapsed().as_secs_f64());
        return Err(GatewayHttpError(e));
    }

    let method = req.method().clone();
    let path_and_query = req.uri().path_and_query().map(|pq| pq.as_str()).unwrap_or("/").to_string();
    let headers = strip_hop_by_hop(req.headers().clone());
    let upstream_url = format!("{}{}", state.upstream_base_url, path_and_query);

    let metrics = state.metrics.clone();
    let body_stream = req.into_body().into_data_stream().map(move |chunk| {
        if let Ok(bytes) = &chunk {
            metrics.add_request_bytes(bytes.len() as u64);
        }
        chunk
    });

    let upstream_result = state
        .http_client
        .request(method, &upstream_url)
        .headers(headers)
        .body(reqwest::Body::wrap_stream(body_stream))
        .send()
        .await;

    let upstream_resp = match upstream_result {
        Ok(resp) => resp,
        Err(e) => {
            warn!(error = %e, url = %upstream_url, "upstream request failed");
            state.metrics.record_request("upstream_error", start.elapsed().as_secs_f64());
            return Err(GatewayHttpError(vgate_core::GatewayError::Upstream(e.to_string())));
        }
    };

    // First byte of response: refresh activity again (spec.md §5 ordering:
    // "response activity-touch happens-before metrics recording").
    state.scaler.touch();

    let status =
        StatusCode::from_u16(upstream_resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let response_headers = strip_hop_by_hop(upstream_resp.headers().clone());

    let preview = state.log_output.then(|| {
        Arc::new(ResponsePreview { path: path_and_query.clone(), buf: Mutex::new(Vec::new()) })
    });

    let metrics = state.metrics.clone();
    let response_stream = upstream_resp.bytes_stream().map(move |chunk| {
        if let Ok(bytes) = &chunk {
            metrics.add_response_bytes(bytes.len() as u64);
            if let Some(preview) = &preview {
                preview.push(bytes);
            }
        }
        chunk
    });

    let mut response = Response::builder()
        .status(status)
        .body(Body::from_stream(response_stream))
        .map_err(|e| GatewayHttpError(vgate_core::GatewayError::Upstream(e.to_string())))?;
    *response.headers_mut() = response_headers;

    state.metrics.record_request("success", start.elapsed().as_secs_f64());
    Ok(response.into_response())
}
