//! Configuration sections shared across crates

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Path configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathConfig {
    pub db_path: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

/// Host dispatch timeouts and retry backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

impl DispatchConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

/// Worker pool sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub max_concurrent_hosts: usize, // 0 = auto-detect
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_hosts: 0,
        }
    }
}

/// External configuration-management agent invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_program")]
    pub program: String,
    /// Arguments; `{host}`, `{action}` and `{roles}` are substituted per call
    #[serde(default = "default_agent_args")]
    pub args: Vec<String>,
    #[serde(default = "default_success_exit_codes")]
    pub success_exit_codes: Vec<i32>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: default_agent_program(),
            args: default_agent_args(),
            success_exit_codes: default_success_exit_codes(),
        }
    }
}

/// State management configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
        }
    }
}

// Default value functions for serde
fn default_timeout_secs() -> u64 {
    600 // 10 minutes, a full catalog run can be slow
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter_factor() -> f64 {
    0.1
}

fn default_agent_program() -> String {
    "puppet".to_string()
}

fn default_agent_args() -> Vec<String> {
    ["kick", "--host", "{host}", "--tag", "{action}", "--detailed-exitcodes"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_success_exit_codes() -> Vec<i32> {
    // 2 = run succeeded and applied changes under --detailed-exitcodes
    vec![0, 2]
}

fn default_retention_days() -> u32 {
    30
}
