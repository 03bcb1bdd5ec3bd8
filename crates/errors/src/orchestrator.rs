//! Lifecycle request validation error types

use std::borrow::Cow;

use crate::{ErrorCode, UserFacingError};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OrchestratorError {
    #[error("cluster not found: {cluster}")]
    ClusterNotFound { cluster: String },

    #[error("unsupported operation: {operation}")]
    UnknownOperation { operation: String },

    #[error("invalid option {key}: {reason}")]
    InvalidOptions { key: String, reason: String },

    #[error("invalid cluster definition: {message}")]
    InvalidCluster { message: String },

    #[error("transaction {txn_id} cannot be {action} while {status}")]
    NotAllowed {
        txn_id: String,
        action: String,
        status: String,
    },

    #[error("missing component: {component}")]
    MissingComponent { component: String },
}

impl OrchestratorError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ClusterNotFound { .. } => ErrorCode::ClusterNotFound,
            Self::UnknownOperation { .. } => ErrorCode::UnknownOperation,
            Self::InvalidOptions { .. } | Self::InvalidCluster { .. } => ErrorCode::InvalidOptions,
            Self::NotAllowed { .. } => ErrorCode::InvalidTransition,
            Self::MissingComponent { .. } => ErrorCode::Internal,
        }
    }
}

impl UserFacingError for OrchestratorError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::ClusterNotFound { .. } => Some("Register the cluster with `hmc cluster add` first."),
            Self::UnknownOperation { .. } => {
                Some("Use one of: install, uninstall, upgrade, reconfigure.")
            }
            Self::InvalidOptions { .. } => Some("Only `wipeout=true|false` is accepted for uninstall."),
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::ClusterNotFound { .. } => "orchestrator.cluster_not_found",
            Self::UnknownOperation { .. } => "orchestrator.unknown_operation",
            Self::InvalidOptions { .. } => "orchestrator.invalid_options",
            Self::InvalidCluster { .. } => "orchestrator.invalid_cluster",
            Self::NotAllowed { .. } => "orchestrator.not_allowed",
            Self::MissingComponent { .. } => "orchestrator.missing_component",
        };
        Some(code)
    }
}
