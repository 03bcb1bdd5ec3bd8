//! Request/response shapes exchanged with request handlers

use chrono::{DateTime, Utc};
use hmc_errors::{Error, UserFacingError};
use serde::{Deserialize, Serialize};

use crate::{HostTask, HostTaskStatus, OpKind, Transaction, TransactionStatus, TxnId};

/// Result of an accept call: `{result, txnId?, error?}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptResponse {
    pub result: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txn_id: Option<TxnId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AcceptResponse {
    #[must_use]
    pub fn accepted(txn_id: TxnId) -> Self {
        Self {
            result: 0,
            txn_id: Some(txn_id),
            error: None,
        }
    }

    /// Nothing to track: the request was valid but resolved to no hosts
    #[must_use]
    pub fn no_op() -> Self {
        Self {
            result: 0,
            txn_id: None,
            error: None,
        }
    }

    #[must_use]
    pub fn from_error(err: &Error) -> Self {
        Self {
            result: err.code().as_i32(),
            txn_id: None,
            error: Some(err.user_message().into_owned()),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.result == 0
    }
}

/// Per-host entry in a poll response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostTaskView {
    pub host: String,
    pub status: HostTaskStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&HostTask> for HostTaskView {
    fn from(task: &HostTask) -> Self {
        Self {
            host: task.host.clone(),
            status: task.status,
            attempts: task.attempts,
            error: task.error.clone(),
            updated_at: task.updated_at,
        }
    }
}

/// Read-only snapshot returned by a poll
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub txn_id: TxnId,
    pub cluster_name: String,
    pub op_kind: OpKind,
    pub wipeout: bool,
    pub status: TransactionStatus,
    pub host_tasks: Vec<HostTaskView>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<TxnId>,
}

impl TransactionView {
    /// Number of host tasks that reached a terminal status
    #[must_use]
    pub fn resolved(&self) -> usize {
        self.host_tasks
            .iter()
            .filter(|t| t.status.is_terminal())
            .count()
    }
}

impl From<&Transaction> for TransactionView {
    fn from(txn: &Transaction) -> Self {
        Self {
            txn_id: txn.id,
            cluster_name: txn.cluster.clone(),
            op_kind: txn.op,
            wipeout: txn.wipeout,
            status: txn.status,
            host_tasks: txn.tasks.iter().map(HostTaskView::from).collect(),
            started_at: txn.started_at.unwrap_or(txn.created_at),
            completed_at: txn.completed_at,
            retry_of: txn.retry_of,
        }
    }
}

/// Envelope printed by the uninstall endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UninstallResponse {
    pub start_time: i64,
    pub cluster_name: String,
    pub deploy_user: String,
    pub txn_id: TxnId,
}
