//! Cluster and host definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TxnId;

/// Host identifier (fully qualified host name as known to the agent)
pub type HostId = String;

/// A member host of a cluster and the roles/services it runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub name: HostId,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Host {
    pub fn new(name: impl Into<String>, roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse `host` or `host:role1,role2`
    ///
    /// # Errors
    ///
    /// Returns an error if the host name is empty.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let (name, roles) = match raw.split_once(':') {
            Some((name, roles)) => (name.trim(), roles),
            None => (raw.trim(), ""),
        };
        if name.is_empty() {
            return Err(format!("empty host name in '{raw}'"));
        }
        let roles = roles
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(ToString::to_string)
            .collect();
        Ok(Self {
            name: name.to_string(),
            roles,
        })
    }
}

/// Lifecycle state of a registered cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterState {
    /// Defined but software not (or no longer) installed
    #[default]
    Registered,
    Installed,
    /// Software and data removed; kept for audit
    Decommissioned,
}

impl ClusterState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registered => "REGISTERED",
            Self::Installed => "INSTALLED",
            Self::Decommissioned => "DECOMMISSIONED",
        }
    }
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusterState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REGISTERED" => Ok(Self::Registered),
            "INSTALLED" => Ok(Self::Installed),
            "DECOMMISSIONED" => Ok(Self::Decommissioned),
            other => Err(format!("unknown cluster state: {other}")),
        }
    }
}

/// A named cluster with its resolved host set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub name: String,
    pub hosts: Vec<Host>,
    pub state: ClusterState,
    /// The single non-terminal transaction currently owning this cluster
    pub active_txn_id: Option<TxnId>,
}

impl Cluster {
    #[must_use]
    pub fn new(name: impl Into<String>, hosts: Vec<Host>) -> Self {
        Self {
            name: name.into(),
            hosts,
            state: ClusterState::Registered,
            active_txn_id: None,
        }
    }
}
