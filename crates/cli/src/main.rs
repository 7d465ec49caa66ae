// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! `vgate`: process entry point. Parses flags, validates configuration,
//! runs the startup bootstrap/authorization sequence, then serves the
//! gateway until a signal asks it to stop (spec.md §1, §4.7, §5, §6).
//!
//! Structure grounded on `deltaglider_proxy`'s `main.rs`: an explicit
//! multi-threaded `tokio::runtime::Builder` (not `#[tokio::main]`, so a
//! config or bootstrap failure can print and exit before any runtime spins
//! up), `tracing_subscriber` with an `EnvFilter`, `Cli::parse()` +
//! `Config::load()`, and `axum::serve(...).with_graceful_shutdown(...)`
//! racing `SIGINT`/`SIGTERM` via `tokio::select!`.

mod bootstrap;
mod config;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vgate_cluster::KubeCluster;
use vgate_core::{ActivityClock, WorkloadIdentity};
use vgate_gateway::{
    build_router, ActivityScaler, DriftReconciler, GatewayMetrics, GatewayState,
};
use vgate_lifecycle::Lifecycle;
use vgate_model::{ModelCrdCoordinates, ModelRegistry};

use crate::config::{Cli, Config};

/// Exit codes (spec.md §6): `0` clean shutdown, `1` any fatal startup
/// failure (`ConfigInvalid`, `AuthorizationDenied`, `CRDMissing`, or an
/// unrecoverable cluster-client construction error).
const EXIT_OK: u8 = 0;
const EXIT_STARTUP_FAILURE: u8 = 1;

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing();

    let config = match Config::load(cli) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start tokio runtime");
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::from(EXIT_OK),
        Err(e) => {
            error!(error = %e, "fatal startup failure");
            ExitCode::from(EXIT_STARTUP_FAILURE)
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!(
        namespace = %config.namespace,
        workload = %config.workload_name,
        model_id = %config.model_id,
        idle_timeout = ?config.idle_timeout,
        "starting vgate"
    );

    let cluster = Arc::new(
        KubeCluster::try_default()
            .await
            .map_err(|e| anyhow::anyhow!("failed to construct cluster client: {e}"))?,
    );

    bootstrap::run(cluster.as_ref(), &config).await?;

    let registry = Arc::new(ModelRegistry::new(cluster.clone(), ModelCrdCoordinates::default()));
    let identity = WorkloadIdentity::new(config.namespace.clone(), config.workload_name.clone());
    let lifecycle = Lifecycle::with_timings(
        cluster.clone(),
        registry.clone(),
        config.model_id.clone(),
        config.infra.clone(),
        identity.clone(),
        config.cold_start_budget,
        vgate_lifecycle::DEFAULT_POLL_INTERVAL,
    );

    let metrics = Arc::new(GatewayMetrics::new());
    let activity = Arc::new(ActivityClock::new(std::time::Instant::now()));

    let scaler = Arc::new(ActivityScaler::new(
        lifecycle.clone(),
        activity.clone(),
        vgate_core::SystemClock,
        config.idle_timeout,
        config.check_interval,
        metrics.clone(),
    ));

    let drift = Arc::new(DriftReconciler::new(
        cluster.clone(),
        lifecycle.clone(),
        registry.clone(),
        config.model_id.clone(),
        config.infra.clone(),
        identity,
        config.drift_check_interval,
        metrics.clone(),
    ));

    let state = Arc::new(GatewayState {
        lifecycle,
        registry,
        scaler: scaler.clone(),
        drift: drift.clone(),
        metrics,
        http_client: reqwest::Client::new(),
        upstream_base_url: config.upstream_base_url.clone(),
        served_name: config.model_id.clone(),
        cold_start_budget: config.cold_start_budget,
        public_endpoint: config.public_endpoint.clone(),
        log_output: config.log_output,
    });

    let router = build_router(state);

    let cancel = CancellationToken::new();
    let scaler_loop = tokio::spawn({
        let scaler = scaler.clone();
        let cancel = cancel.clone();
        async move { scaler.run(cancel).await }
    });
    let drift_loop = tokio::spawn({
        let drift = drift.clone();
        let cancel = cancel.clone();
        async move { drift.run(cancel).await }
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind port {}: {e}", config.port))?;
    info!(port = config.port, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("server error: {e}"))?;

    info!("shutdown signal received, stopping background loops");
    cancel.cancel();
    let _ = scaler_loop.await;
    let _ = drift_loop.await;

    info!("vgate shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler, falling back to ctrl_c only");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
