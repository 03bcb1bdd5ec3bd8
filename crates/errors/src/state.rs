//! Transaction store error types

use std::borrow::Cow;

use crate::{ErrorCode, UserFacingError};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StateError {
    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("cluster {cluster} already has an active transaction {active_txn_id}")]
    Conflict {
        cluster: String,
        active_txn_id: String,
    },

    #[error("transaction not found: {id}")]
    TransactionNotFound { id: String },

    #[error("host task not found: {host} in transaction {txn_id}")]
    HostTaskNotFound { txn_id: String, host: String },

    #[error("cluster not found: {name}")]
    ClusterNotFound { name: String },

    #[error("database error: {message}")]
    DatabaseError { message: String },

    #[error("state corrupted: {message}")]
    StateCorrupted { message: String },

    #[error("migration failed: {message}")]
    MigrationFailed { message: String },
}

impl StateError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::Conflict { .. } => ErrorCode::Conflict,
            Self::TransactionNotFound { .. } | Self::HostTaskNotFound { .. } => {
                ErrorCode::TransactionNotFound
            }
            Self::ClusterNotFound { .. } => ErrorCode::ClusterNotFound,
            Self::DatabaseError { .. }
            | Self::StateCorrupted { .. }
            | Self::MigrationFailed { .. } => ErrorCode::Storage,
        }
    }
}

impl UserFacingError for StateError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Conflict { .. } => {
                Some("Wait for the active transaction to finish or cancel it, then resubmit.")
            }
            Self::DatabaseError { .. } => Some("Check that the state database is reachable and writable."),
            Self::MigrationFailed { .. } => {
                Some("The state database schema could not be upgraded; restore from backup.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::DatabaseError { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::InvalidTransition { .. } => "state.invalid_transition",
            Self::Conflict { .. } => "state.conflict",
            Self::TransactionNotFound { .. } => "state.transaction_not_found",
            Self::HostTaskNotFound { .. } => "state.host_task_not_found",
            Self::ClusterNotFound { .. } => "state.cluster_not_found",
            Self::DatabaseError { .. } => "state.database_error",
            Self::StateCorrupted { .. } => "state.corrupted",
            Self::MigrationFailed { .. } => "state.migration_failed",
        };
        Some(code)
    }
}
