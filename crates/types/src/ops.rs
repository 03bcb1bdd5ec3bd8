//! Lifecycle operations and per-host actions

use hmc_errors::OrchestratorError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Cluster-level lifecycle operation requested by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Install,
    Uninstall,
    Upgrade,
    Reconfigure,
}

impl OpKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::Upgrade => "upgrade",
            Self::Reconfigure => "reconfigure",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpKind {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "install" => Ok(Self::Install),
            "uninstall" => Ok(Self::Uninstall),
            "upgrade" => Ok(Self::Upgrade),
            "reconfigure" => Ok(Self::Reconfigure),
            _ => Err(OrchestratorError::UnknownOperation {
                operation: s.to_string(),
            }),
        }
    }
}

/// Single idempotent action issued to one host's agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Install,
    Uninstall,
    Upgrade,
    Reconfigure,
    /// Remove data directories left behind by an uninstall
    PurgeData,
}

impl ActionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::Upgrade => "upgrade",
            Self::Reconfigure => "reconfigure",
            Self::PurgeData => "purge_data",
        }
    }
}

impl From<OpKind> for ActionKind {
    fn from(op: OpKind) -> Self {
        match op {
            OpKind::Install => Self::Install,
            OpKind::Uninstall => Self::Uninstall,
            OpKind::Upgrade => Self::Upgrade,
            OpKind::Reconfigure => Self::Reconfigure,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a host's action plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostAction {
    pub kind: ActionKind,
    /// Roles/services on the host the action applies to
    #[serde(default)]
    pub roles: Vec<String>,
}

impl HostAction {
    #[must_use]
    pub fn new(kind: ActionKind, roles: Vec<String>) -> Self {
        Self { kind, roles }
    }
}

/// Operation-specific flags accepted alongside a lifecycle request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LifecycleOptions {
    /// Remove data as well as software (uninstall only)
    #[serde(default)]
    pub wipeout: bool,
}

impl LifecycleOptions {
    #[must_use]
    pub fn wipeout(wipeout: bool) -> Self {
        Self { wipeout }
    }

    /// Validate a loosely-typed option map for the given operation.
    ///
    /// Booleans may be given as JSON booleans or as the strings
    /// `"true"`/`"false"`/`"1"`/`"0"`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOptions` for unknown keys, keys not valid for `op`,
    /// or values of the wrong type.
    pub fn from_map(op: OpKind, map: &BTreeMap<String, Value>) -> Result<Self, OrchestratorError> {
        let mut options = Self::default();
        for (key, value) in map {
            match key.as_str() {
                "wipeout" if op == OpKind::Uninstall => {
                    options.wipeout = parse_bool(key, value)?;
                }
                "wipeout" => {
                    return Err(OrchestratorError::InvalidOptions {
                        key: key.clone(),
                        reason: format!("not applicable to {op}"),
                    })
                }
                _ => {
                    return Err(OrchestratorError::InvalidOptions {
                        key: key.clone(),
                        reason: "unknown option".to_string(),
                    })
                }
            }
        }
        Ok(options)
    }
}

fn parse_bool(key: &str, value: &Value) -> Result<bool, OrchestratorError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(OrchestratorError::InvalidOptions {
                key: key.to_string(),
                reason: format!("expected boolean, got '{s}'"),
            }),
        },
        other => Err(OrchestratorError::InvalidOptions {
            key: key.to_string(),
            reason: format!("expected boolean, got {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn op_kind_parsing_is_case_insensitive() {
        assert_eq!("Uninstall".parse::<OpKind>().unwrap(), OpKind::Uninstall);
        assert!(matches!(
            "wipe".parse::<OpKind>(),
            Err(OrchestratorError::UnknownOperation { .. })
        ));
    }

    #[test]
    fn wipeout_option_accepts_strings_and_bools() {
        let mut map = BTreeMap::new();
        map.insert("wipeout".to_string(), json!("true"));
        assert!(LifecycleOptions::from_map(OpKind::Uninstall, &map).unwrap().wipeout);

        map.insert("wipeout".to_string(), json!(false));
        assert!(!LifecycleOptions::from_map(OpKind::Uninstall, &map).unwrap().wipeout);
    }

    #[test]
    fn malformed_options_are_rejected() {
        let mut map = BTreeMap::new();
        map.insert("wipeout".to_string(), json!(3));
        assert!(LifecycleOptions::from_map(OpKind::Uninstall, &map).is_err());

        let mut map = BTreeMap::new();
        map.insert("wipeout".to_string(), json!(true));
        assert!(LifecycleOptions::from_map(OpKind::Install, &map).is_err());

        let mut map = BTreeMap::new();
        map.insert("force".to_string(), json!(true));
        assert!(LifecycleOptions::from_map(OpKind::Uninstall, &map).is_err());
    }
}
