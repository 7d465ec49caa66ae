// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flag parsing and validated configuration (spec.md §6's configuration
//! surface). Every option is settable via flag or the documented
//! `VGATE_<NAME>` environment variable, following `clap`'s `env` feature the
//! same way the rest of the workspace's dependency stack already pulls it in.
//!
//! `Cli::parse()` produces the raw, unvalidated flags; `Config::load`
//! converts them into the validated shape the rest of the binary consumes,
//! mirroring `deltaglider_proxy`'s `Cli` (clap) + `Config::load()` split.

use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use vgate_core::InfrastructureSpec;

/// `vgate`: a scale-to-zero gateway in front of a single GPU inference
/// backend.
#[derive(Parser, Debug)]
#[command(name = "vgate", version, author, about, long_about = None)]
pub struct Cli {
    /// Cluster namespace for the backend workload.
    #[arg(long, env = "VGATE_NAMESPACE", default_value = "vllm")]
    pub namespace: String,

    /// Backend workload identity (pod name).
    #[arg(long, env = "VGATE_WORKLOAD_NAME", default_value = "vllm")]
    pub workload_name: String,

    /// Served-name to resolve in the model CRD registry.
    #[arg(long, env = "VGATE_MODEL_ID")]
    pub model_id: String,

    /// Duration of inactivity before the backend is scaled to zero, e.g.
    /// `5m`, `30s`, `1h30m`.
    #[arg(long, env = "VGATE_IDLE_TIMEOUT", default_value = "5m")]
    pub idle_timeout: String,

    /// Inbound listen port.
    #[arg(long, env = "VGATE_PORT", default_value_t = 8080)]
    pub port: u16,

    /// GPUs to request and use as tensor-parallel size.
    #[arg(long, env = "VGATE_GPU_COUNT", default_value_t = 2)]
    pub gpu_count: u32,

    /// CPU-offload budget in GiB.
    #[arg(long, env = "VGATE_CPU_OFFLOAD_GB", default_value_t = 0)]
    pub cpu_offload_gb: u32,

    /// Advertised URL in responses; empty disables the field.
    #[arg(long, env = "VGATE_PUBLIC_ENDPOINT", default_value = "")]
    pub public_endpoint: String,

    /// Capture a bounded preview of response bodies for structured logging.
    #[arg(long, env = "VGATE_LOG_OUTPUT", action = clap::ArgAction::SetTrue)]
    pub log_output: bool,

    /// Host-path mount for the model weight cache.
    #[arg(long, env = "VGATE_MODEL_CACHE_PATH", default_value = "/mnt/model-cache")]
    pub model_cache_path: String,

    /// Host-path mount for the compile cache.
    #[arg(long, env = "VGATE_COMPILE_CACHE_PATH", default_value = "/mnt/compile-cache")]
    pub compile_cache_path: String,

    /// Shared-memory volume size, e.g. `16Gi`.
    #[arg(long, env = "VGATE_SHARED_MEMORY_SIZE", default_value = "16Gi")]
    pub shared_memory_size: String,

    /// Container image for the backend workload.
    #[arg(long, env = "VGATE_IMAGE", default_value = "vllm/vllm-openai:latest")]
    pub image: String,

    /// Secret name holding the backend API key (optional).
    #[arg(long, env = "VGATE_API_KEY_SECRET_REF")]
    pub api_key_secret_ref: Option<String>,

    /// Host of the service fronting the backend workload.
    #[arg(long, env = "VGATE_UPSTREAM_HOST", default_value = "vllm-api")]
    pub upstream_host: String,

    /// Port of the service fronting the backend workload.
    #[arg(long, env = "VGATE_UPSTREAM_PORT", default_value_t = 80)]
    pub upstream_port: u16,

    /// Idle-loop check interval (ambient; not in the client-visible spec
    /// table, but still a documented knob so ops can tune tick granularity).
    #[arg(long, env = "VGATE_CHECK_INTERVAL", default_value = "30s")]
    pub check_interval: String,

    /// Drift-reconciler check interval.
    #[arg(long, env = "VGATE_DRIFT_CHECK_INTERVAL", default_value = "60s")]
    pub drift_check_interval: String,

    /// Cold-start budget before a start attempt fails with a timeout.
    #[arg(long, env = "VGATE_COLD_START_BUDGET", default_value = "120s")]
    pub cold_start_budget: String,
}

/// Parse a human-readable duration string (e.g. `"5m"`, `"30s"`, `"1h30m"`).
/// A bare number is interpreted as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let mut total_secs: u64 = 0;
    let mut current_num = String::new();

    for c in s.chars() {
        if c.is_ascii_digit() {
            current_num.push(c);
        } else {
            let n: u64 = current_num
                .parse()
                .map_err(|_| ConfigError::InvalidDuration(s.to_string()))?;
            current_num.clear();
            match c {
                'h' => total_secs += n * 3600,
                'm' => total_secs += n * 60,
                's' => total_secs += n,
                _ => return Err(ConfigError::InvalidDuration(s.to_string())),
            }
        }
    }
    if !current_num.is_empty() {
        let n: u64 = current_num
            .parse()
            .map_err(|_| ConfigError::InvalidDuration(s.to_string()))?;
        total_secs += n;
    }
    if total_secs == 0 {
        return Err(ConfigError::InvalidDuration(s.to_string()));
    }
    Ok(Duration::from_secs(total_secs))
}

/// Fatal configuration problems (spec.md §7: `ConfigInvalid`, exit 1).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid duration {0:?}: expected a form like \"5m\", \"30s\", or \"1h30m\"")]
    InvalidDuration(String),

    #[error("model-id must not be empty")]
    EmptyModelId,

    #[error("gpu-count must be at least 1")]
    ZeroGpuCount,
}

/// Validated configuration, ready to build the gateway's collaborators.
/// Separating this from `Cli` keeps flag-parsing concerns (clap) apart from
/// the invariants this binary actually enforces.
pub struct Config {
    pub namespace: String,
    pub workload_name: String,
    pub model_id: String,
    pub idle_timeout: Duration,
    pub port: u16,
    pub public_endpoint: String,
    pub log_output: bool,
    pub infra: InfrastructureSpec,
    pub upstream_base_url: String,
    pub check_interval: Duration,
    pub drift_check_interval: Duration,
    pub cold_start_budget: Duration,
}

impl Config {
    /// Validate a parsed `Cli` into a `Config`, or fail with `ConfigInvalid`.
    pub fn load(cli: Cli) -> Result<Self, ConfigError> {
        if cli.model_id.trim().is_empty() {
            return Err(ConfigError::EmptyModelId);
        }
        if cli.gpu_count == 0 {
            return Err(ConfigError::ZeroGpuCount);
        }

        let idle_timeout = parse_duration(&cli.idle_timeout)?;
        let check_interval = parse_duration(&cli.check_interval)?;
        let drift_check_interval = parse_duration(&cli.drift_check_interval)?;
        let cold_start_budget = parse_duration(&cli.cold_start_budget)?;

        let infra = InfrastructureSpec {
            gpu_count: cli.gpu_count,
            cpu_offload_gb: cli.cpu_offload_gb,
            image: cli.image,
            model_cache_path: cli.model_cache_path,
            compile_cache_path: cli.compile_cache_path,
            shared_memory_size: cli.shared_memory_size,
            api_key_secret_ref: cli.api_key_secret_ref,
        };

        let upstream_base_url = format!("http://{}:{}", cli.upstream_host, cli.upstream_port);

        Ok(Self {
            namespace: cli.namespace,
            workload_name: cli.workload_name,
            model_id: cli.model_id,
            idle_timeout,
            port: cli.port,
            public_endpoint: cli.public_endpoint,
            log_output: cli.log_output,
            infra,
            upstream_base_url,
            check_interval,
            drift_check_interval,
            cold_start_budget,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli::parse_from(["vgate", "--model-id", "llama3"])
    }

    #[test]
    fn defaults_parse_into_valid_config() {
        let config = Config::load(base_cli()).unwrap();
        assert_eq!(config.idle_timeout, Duration::from_secs(300));
        assert_eq!(config.upstream_base_url, "http://vllm-api:80");
    }

    #[test]
    fn empty_model_id_is_config_invalid() {
        let mut cli = base_cli();
        cli.model_id = "  ".to_string();
        assert!(matches!(Config::load(cli), Err(ConfigError::EmptyModelId)));
    }

    #[test]
    fn zero_gpu_count_is_config_invalid() {
        let mut cli = base_cli();
        cli.gpu_count = 0;
        assert!(matches!(Config::load(cli), Err(ConfigError::ZeroGpuCount)));
    }

    #[test]
    fn parse_duration_accepts_compound_units() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn parse_duration_rejects_zero_and_garbage() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("banana").is_err());
    }
}
