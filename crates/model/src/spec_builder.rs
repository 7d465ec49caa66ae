// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic `(ModelSpec, InfrastructureSpec) -> WorkloadSpec` builder
//! (spec.md §4.5). Pure; no I/O.
//!
//! Grounded on `oj-adapters`' pod-spec builder
//! (`daemon/src/adapters/agent/k8s/pod.rs`): a flat params struct, volumes,
//! env vars (including `EnvVarSource`/`SecretKeySelector` for optional
//! secret-backed values), and three `Probe`s on an `HTTPGetAction`,
//! generalized here to the backend's resource request/limit and
//! shared-memory requirements.

use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EmptyDirVolumeSource, EnvVar, EnvVarSource, HTTPGetAction,
    HostPathVolumeSource, Pod, PodSpec, Probe, ResourceRequirements, SecretKeySelector, Service,
    ServicePort, ServiceSpec as K8sServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

use vgate_cluster::{ServiceSpec, WorkloadSpec};
use vgate_core::{EffectiveArgs, InfrastructureSpec, ModelSpec, WorkloadIdentity};

const CONTAINER_PORT: i32 = 8000;
const LISTEN_HOST: &str = "0.0.0.0";
const HEALTH_PATH: &str = "/health";
const AUTH_HEADER_NAME: &str = "Authorization";

/// Entry point for the model server container (spec.md §4.5: "the model
/// server's OpenAI-compatible entry point").
const LAUNCH_COMMAND: &[&str] = &["python3", "-m", "vllm.entrypoints.openai.api_server"];

/// Compute the canonical flag-name → value map used both to build the
/// command line and to detect drift (spec.md §3's "Effective launch
/// arguments" — equality is a map, never order-sensitive).
pub fn effective_args(model: &ModelSpec, infra: &InfrastructureSpec) -> EffectiveArgs {
    let mut args: EffectiveArgs = BTreeMap::new();
    args.insert("model".to_string(), model.model_id.clone());
    args.insert("served-name".to_string(), model.served_name.clone());
    args.insert("tensor-parallel-size".to_string(), infra.gpu_count.to_string());
    args.insert("context-length".to_string(), model.context_length.to_string());
    args.insert("memory-utilization".to_string(), model.memory_utilization.clone());
    args.insert("batched-tokens".to_string(), model.batched_tokens.to_string());
    args.insert("max-sequences".to_string(), model.max_sequences.to_string());
    args.insert("precision".to_string(), model.precision.clone());
    args.insert("cpu-offload".to_string(), infra.cpu_offload_gb.to_string());
    if let Some(parser) = &model.tool_call_parser {
        args.insert("tool-call-parser".to_string(), parser.clone());
    }
    if let Some(parser) = &model.reasoning_parser {
        args.insert("reasoning-parser".to_string(), parser.clone());
    }
    if model.prefix_caching {
        args.insert("enable-prefix-caching".to_string(), "true".to_string());
    }
    args
}

/// Render `effective_args` into the ordered flag list the container
/// actually receives on its command line.
fn render_flags(model: &ModelSpec, infra: &InfrastructureSpec) -> Vec<String> {
    let mut flags = vec![
        "--model".to_string(),
        model.model_id.clone(),
        "--served-model-name".to_string(),
        model.served_name.clone(),
        "--tensor-parallel-size".to_string(),
        infra.gpu_count.to_string(),
        "--max-model-len".to_string(),
        model.context_length.to_string(),
        "--gpu-memory-utilization".to_string(),
        model.memory_utilization.clone(),
        "--max-num-batched-tokens".to_string(),
        model.batched_tokens.to_string(),
        "--max-num-seqs".to_string(),
        model.max_sequences.to_string(),
        "--dtype".to_string(),
        model.precision.clone(),
        "--enable-chunked-prefill".to_string(),
        "--disable-custom-all-reduce".to_string(),
    ];
    if model.prefix_caching {
        flags.push("--enable-prefix-caching".to_string());
    }
    flags.push("--enable-auto-tool-choice".to_string());
    if infra.cpu_offload_gb > 0 {
        flags.push("--cpu-offload-gb".to_string());
        flags.push(infra.cpu_offload_gb.to_string());
    }
    if let Some(parser) = &model.tool_call_parser {
        flags.push("--tool-call-parser".to_string());
        flags.push(parser.clone());
    }
    if let Some(parser) = &model.reasoning_parser {
        flags.push("--reasoning-parser".to_string());
        flags.push(parser.clone());
    }
    flags.push("--host".to_string());
    flags.push(LISTEN_HOST.to_string());
    flags.push("--port".to_string());
    flags.push(CONTAINER_PORT.to_string());
    flags
}

fn env_var(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar { name: name.to_string(), value: Some(value.into()), ..Default::default() }
}

/// Build the container environment: compile-cache path, HuggingFace-transfer
/// flag, optional API-key token from a secret (optional), OMP thread count.
fn build_env(infra: &InfrastructureSpec) -> Vec<EnvVar> {
    let mut env = vec![
        env_var("VLLM_COMPILE_CACHE_DIR", infra.compile_cache_path.clone()),
        env_var("HF_HUB_ENABLE_HF_TRANSFER", "1"),
        env_var("OMP_NUM_THREADS", "1"),
    ];
    if let Some(secret_ref) = &infra.api_key_secret_ref {
        env.push(EnvVar {
            name: "VLLM_API_KEY".to_string(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: secret_ref.clone(),
                    key: "api-key".to_string(),
                    optional: Some(true),
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
    }
    env
}

fn health_probe(period_seconds: i32, failure_threshold: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(HEALTH_PATH.to_string()),
            port: IntOrString::Int(CONTAINER_PORT),
            http_headers: Some(vec![k8s_openapi::api::core::v1::HTTPHeader {
                name: AUTH_HEADER_NAME.to_string(),
                value: "Bearer $(VLLM_API_KEY)".to_string(),
            }]),
            ..Default::default()
        }),
        period_seconds: Some(period_seconds),
        failure_threshold: Some(failure_threshold),
        ..Default::default()
    }
}

/// Build the cluster-ready `WorkloadSpec` for the single managed backend pod
/// (spec.md §4.5). Two invocations with equal inputs produce byte-equal pods
/// (modulo server-assigned fields) — this function does no I/O and reads no
/// ambient state.
pub fn build_workload_spec(
    identity: &WorkloadIdentity,
    model: &ModelSpec,
    infra: &InfrastructureSpec,
) -> WorkloadSpec {
    let command: Vec<String> = LAUNCH_COMMAND.iter().map(|s| s.to_string()).collect();
    let args = render_flags(model, infra);

    let volumes = vec![
        Volume {
            name: "model-cache".to_string(),
            host_path: Some(HostPathVolumeSource {
                path: infra.model_cache_path.clone(),
                ..Default::default()
            }),
            ..Default::default()
        },
        Volume {
            name: "compile-cache".to_string(),
            host_path: Some(HostPathVolumeSource {
                path: infra.compile_cache_path.clone(),
                ..Default::default()
            }),
            ..Default::default()
        },
        Volume {
            name: "shm".to_string(),
            empty_dir: Some(EmptyDirVolumeSource {
                medium: Some("Memory".to_string()),
                size_limit: Some(Quantity(infra.shared_memory_size.clone())),
            }),
            ..Default::default()
        },
    ];

    let volume_mounts = vec![
        VolumeMount {
            name: "model-cache".to_string(),
            mount_path: "/root/.cache/huggingface".to_string(),
            ..Default::default()
        },
        VolumeMount {
            name: "compile-cache".to_string(),
            mount_path: infra.compile_cache_path.clone(),
            ..Default::default()
        },
        VolumeMount { name: "shm".to_string(), mount_path: "/dev/shm".to_string(), ..Default::default() },
    ];

    let resources = ResourceRequirements {
        requests: Some(resource_map(infra, "32Gi")),
        limits: Some(resource_map(infra, "64Gi")),
        ..Default::default()
    };

    let container = Container {
        name: "backend".to_string(),
        image: Some(infra.image.clone()),
        command: Some(command),
        args: Some(args),
        ports: Some(vec![ContainerPort { container_port: CONTAINER_PORT, ..Default::default() }]),
        env: Some(build_env(infra)),
        volume_mounts: Some(volume_mounts),
        resources: Some(resources),
        startup_probe: Some(health_probe(10, 12)), // 12 * 10s = 120s cold-start tolerance
        readiness_probe: Some(health_probe(5, 3)),
        liveness_probe: Some(health_probe(15, 3)),
        ..Default::default()
    };

    let labels: BTreeMap<String, String> = [
        ("app".to_string(), "vllm".to_string()),
        ("vgate.dev/managed".to_string(), "true".to_string()),
    ]
    .into_iter()
    .collect();

    let pod = Pod {
        metadata: ObjectMeta {
            name: Some(identity.name.clone()),
            namespace: Some(identity.namespace.clone()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![container],
            volumes: Some(volumes),
            restart_policy: Some("Never".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };

    WorkloadSpec { namespace: identity.namespace.clone(), name: identity.name.clone(), pod }
}

fn resource_map(infra: &InfrastructureSpec, memory: &str) -> BTreeMap<String, Quantity> {
    [
        ("memory".to_string(), Quantity(memory.to_string())),
        ("nvidia.com/gpu".to_string(), Quantity(infra.gpu_count.to_string())),
    ]
    .into_iter()
    .collect()
}

/// Build the companion `vllm-api` Service created idempotently at startup
/// (spec.md §6): port 80 → backend port 8000, selector `app=vllm`.
pub fn build_service_spec(namespace: &str, name: &str) -> ServiceSpec {
    let selector: BTreeMap<String, String> = [("app".to_string(), "vllm".to_string())].into_iter().collect();
    let service = Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(K8sServiceSpec {
            selector: Some(selector),
            ports: Some(vec![ServicePort {
                port: 80,
                target_port: Some(IntOrString::Int(CONTAINER_PORT)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };
    ServiceSpec { namespace: namespace.to_string(), name: name.to_string(), service }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_model() -> ModelSpec {
        ModelSpec {
            model_id: "meta-llama/Llama-3-8B".to_string(),
            served_name: "llama3".to_string(),
            context_length: 4096,
            memory_utilization: "0.9".to_string(),
            batched_tokens: 8192,
            max_sequences: 256,
            precision: "bfloat16".to_string(),
            prefix_caching: true,
            tool_call_parser: Some("llama3_json".to_string()),
            reasoning_parser: None,
        }
    }

    fn sample_infra() -> InfrastructureSpec {
        InfrastructureSpec {
            gpu_count: 2,
            cpu_offload_gb: 0,
            image: "vllm/vllm-openai:v0.6.0".to_string(),
            model_cache_path: "/mnt/model-cache".to_string(),
            compile_cache_path: "/mnt/compile-cache".to_string(),
            shared_memory_size: "16Gi".to_string(),
            api_key_secret_ref: Some("vllm-api-key".to_string()),
        }
    }

    #[test]
    fn build_is_deterministic() {
        let identity = WorkloadIdentity::new("vllm", "vllm");
        let a = build_workload_spec(&identity, &sample_model(), &sample_infra());
        let b = build_workload_spec(&identity, &sample_model(), &sample_infra());
        assert_eq!(
            serde_json::to_value(&a.pod).unwrap(),
            serde_json::to_value(&b.pod).unwrap()
        );
    }

    #[test]
    fn effective_args_reflect_context_length() {
        let args = effective_args(&sample_model(), &sample_infra());
        assert_eq!(args.get("context-length").unwrap(), "4096");
        assert_eq!(args.get("tool-call-parser").unwrap(), "llama3_json");
    }

    #[test]
    fn resource_requests_and_limits_match_spec_budget() {
        let identity = WorkloadIdentity::new("vllm", "vllm");
        let spec = build_workload_spec(&identity, &sample_model(), &sample_infra());
        let container = &spec.pod.spec.unwrap().containers[0];
        let resources = container.resources.as_ref().unwrap();
        assert_eq!(resources.requests.as_ref().unwrap()["memory"], Quantity("32Gi".to_string()));
        assert_eq!(resources.limits.as_ref().unwrap()["memory"], Quantity("64Gi".to_string()));
        assert_eq!(resources.requests.as_ref().unwrap()["nvidia.com/gpu"], Quantity("2".to_string()));
    }

    #[test]
    fn shared_memory_volume_is_in_memory_medium() {
        let identity = WorkloadIdentity::new("vllm", "vllm");
        let spec = build_workload_spec(&identity, &sample_model(), &sample_infra());
        let volumes = spec.pod.spec.unwrap().volumes.unwrap();
        let shm = volumes.iter().find(|v| v.name == "shm").unwrap();
        assert_eq!(shm.empty_dir.as_ref().unwrap().medium.as_deref(), Some("Memory"));
    }

    #[test]
    fn service_spec_targets_container_port() {
        let svc = build_service_spec("vllm", "vllm-api");
        let port = &svc.service.spec.unwrap().ports.unwrap()[0];
        assert_eq!(port.port, 80);
        assert_eq!(port.target_port, Some(IntOrString::Int(CONTAINER_PORT)));
    }

    proptest! {
        /// `build_workload_spec` is a pure function of its inputs: any two
        /// calls with the same `context_length`/`gpu_count` must produce
        /// byte-identical pod specs, regardless of what value was tried
        /// before.
        #[test]
        fn build_workload_spec_is_pure(context_length in 1u32..=131072, gpu_count in 1u32..=8) {
            let identity = WorkloadIdentity::new("vllm", "vllm");
            let mut model = sample_model();
            model.context_length = context_length;
            let mut infra = sample_infra();
            infra.gpu_count = gpu_count;

            let a = build_workload_spec(&identity, &model, &infra);
            let b = build_workload_spec(&identity, &model, &infra);
            prop_assert_eq!(
                serde_json::to_value(&a.pod).unwrap(),
                serde_json::to_value(&b.pod).unwrap()
            );

            let args = effective_args(&model, &infra);
            prop_assert_eq!(args.get("context-length").unwrap(), &context_length.to_string());
        }
    }
}
