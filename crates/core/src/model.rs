// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Model spec, infrastructure spec, and the effective-argument representation
//! used for drift detection (spec.md §3).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declarative record identifying the backend model and its launch-time
/// tuning parameters. Fetched from a cluster CRD keyed by served-name;
/// treated as immutable for the duration of one backend lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// The model identifier passed to the server (`--model`).
    pub model_id: String,
    /// Public alias clients use to refer to the model; the CRD lookup key.
    pub served_name: String,
    pub context_length: u32,
    pub memory_utilization: String,
    pub batched_tokens: u32,
    pub max_sequences: u32,
    pub precision: String,
    pub prefix_caching: bool,
    pub tool_call_parser: Option<String>,
    pub reasoning_parser: Option<String>,
}

/// Runtime resource concerns that are NOT part of the model spec. Supplied
/// at gateway startup; never fetched per-request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfrastructureSpec {
    pub gpu_count: u32,
    pub cpu_offload_gb: u32,
    pub image: String,
    pub model_cache_path: String,
    pub compile_cache_path: String,
    pub shared_memory_size: String,
    pub api_key_secret_ref: Option<String>,
}

/// Summary of a declared model entry, as returned by `ListAvailable`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSummary {
    pub served_name: String,
    pub model_id: String,
}

impl From<&ModelSpec> for ModelSummary {
    fn from(spec: &ModelSpec) -> Self {
        Self { served_name: spec.served_name.clone(), model_id: spec.model_id.clone() }
    }
}

/// The canonical flag-name → value representation used for drift detection.
/// A `BTreeMap` so that two specs with the same flags in different order
/// compare and serialize identically — equality is never order-sensitive.
pub type EffectiveArgs = BTreeMap<String, String>;

/// Critical keys compared by `CheckDrift` (spec.md §4.4). Absence on either
/// side counts as a difference.
pub const DRIFT_KEYS: &[&str] = &[
    "model",
    "served-name",
    "context-length",
    "memory-utilization",
    "batched-tokens",
    "max-sequences",
    "precision",
    "cpu-offload",
    "tool-call-parser",
];

/// The vLLM CLI spells some of these differently than `DRIFT_KEYS`'
/// canonical names (`--max-model-len` vs. `context-length`, etc.). A pod's
/// command line is parsed back into `DRIFT_KEYS`' spelling through this
/// table so an observed launch-argument map compares equal to
/// `effective_args`'s output for the same spec.
pub const CLI_FLAG_CANONICAL_NAMES: &[(&str, &str)] = &[
    ("served-model-name", "served-name"),
    ("max-model-len", "context-length"),
    ("gpu-memory-utilization", "memory-utilization"),
    ("max-num-batched-tokens", "batched-tokens"),
    ("max-num-seqs", "max-sequences"),
    ("dtype", "precision"),
    ("cpu-offload-gb", "cpu-offload"),
];

/// Translate a raw CLI flag name (no leading `--`) into the canonical key
/// `CheckDrift` compares, passing it through unchanged if it has no entry
/// in `CLI_FLAG_CANONICAL_NAMES` (e.g. `tool-call-parser`, already canonical).
pub fn canonical_flag_name(flag: &str) -> String {
    CLI_FLAG_CANONICAL_NAMES
        .iter()
        .find(|(raw, _)| *raw == flag)
        .map(|(_, canonical)| (*canonical).to_string())
        .unwrap_or_else(|| flag.to_string())
}

/// Result of comparing an observed argument map against a desired one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriftOutcome {
    Match,
    Drift { field: String },
}

/// Compare `observed` against `desired` over `DRIFT_KEYS`, returning the
/// first differing field. Order of `DRIFT_KEYS` is the tie-break when more
/// than one field differs, so the result is deterministic.
pub fn check_drift(observed: &EffectiveArgs, desired: &EffectiveArgs) -> DriftOutcome {
    for key in DRIFT_KEYS {
        if observed.get(*key) != desired.get(*key) {
            return DriftOutcome::Drift { field: (*key).to_string() };
        }
    }
    DriftOutcome::Match
}
