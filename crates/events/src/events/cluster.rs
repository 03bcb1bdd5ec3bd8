use hmc_types::ClusterState;
use serde::{Deserialize, Serialize};

/// Cluster registry events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClusterEvent {
    Registered { cluster: String, hosts: usize },

    StateChanged {
        cluster: String,
        state: ClusterState,
    },
}
