//! Database rows and their conversion into domain types

use chrono::{DateTime, Utc};
use hmc_errors::{Error, StateError};
use hmc_types::{
    ClusterState, HostAction, HostTask, HostTaskStatus, OpKind, Transaction, TransactionStatus,
    TxnId,
};
use sqlx::FromRow;

/// A registered cluster row
#[derive(Debug, Clone, FromRow)]
pub struct ClusterRow {
    pub name: String,
    pub state: String,
    pub active_txn_id: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ClusterRow {
    /// Parse the lifecycle state column
    ///
    /// # Errors
    ///
    /// Returns `StateCorrupted` if the column holds an unknown value.
    pub fn cluster_state(&self) -> Result<ClusterState, Error> {
        self.state.parse().map_err(|e: String| corrupted(e))
    }
}

/// A cluster member row
#[derive(Debug, Clone, FromRow)]
pub struct ClusterHostRow {
    pub host: String,
    pub roles: String,
}

/// A transaction row without its host tasks
#[derive(Debug, Clone, FromRow)]
pub struct TransactionRow {
    pub id: i64,
    pub cluster_name: String,
    pub op_kind: String,
    pub wipeout: bool,
    pub status: String,
    pub retry_of: Option<i64>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl TransactionRow {
    /// Parse the status column
    ///
    /// # Errors
    ///
    /// Returns `StateCorrupted` if the column holds an unknown value.
    pub fn status(&self) -> Result<TransactionStatus, Error> {
        self.status.parse().map_err(|e: String| corrupted(e))
    }

    /// Combine with the transaction's host tasks
    ///
    /// # Errors
    ///
    /// Returns `StateCorrupted` if any column cannot be decoded.
    pub fn into_transaction(self, tasks: Vec<HostTask>) -> Result<Transaction, Error> {
        let status = self.status()?;
        let op: OpKind = self
            .op_kind
            .parse()
            .map_err(|_| corrupted(format!("unknown op kind '{}'", self.op_kind)))?;

        Ok(Transaction {
            id: TxnId(self.id),
            cluster: self.cluster_name,
            op,
            wipeout: self.wipeout,
            status,
            retry_of: self.retry_of.map(TxnId),
            created_at: timestamp(self.created_at)?,
            started_at: self.started_at.map(timestamp).transpose()?,
            completed_at: self.completed_at.map(timestamp).transpose()?,
            tasks,
        })
    }
}

/// A host task row
#[derive(Debug, Clone, FromRow)]
pub struct HostTaskRow {
    pub txn_id: i64,
    pub host: String,
    pub plan: String,
    pub status: String,
    pub attempts: i64,
    pub steps_completed: i64,
    pub step_attempts: i64,
    pub error: Option<String>,
    pub updated_at: i64,
}

impl TryFrom<HostTaskRow> for HostTask {
    type Error = Error;

    fn try_from(row: HostTaskRow) -> Result<Self, Self::Error> {
        let plan: Vec<HostAction> = serde_json::from_str(&row.plan)
            .map_err(|e| corrupted(format!("bad plan for host {}: {e}", row.host)))?;
        let status: HostTaskStatus = row.status.parse().map_err(|e: String| corrupted(e))?;

        Ok(HostTask {
            txn_id: TxnId(row.txn_id),
            host: row.host,
            plan,
            status,
            attempts: row.attempts.max(0) as u32,
            steps_completed: row.steps_completed.max(0) as u32,
            step_attempts: row.step_attempts.max(0) as u32,
            error: row.error,
            updated_at: timestamp(row.updated_at)?,
        })
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, Error> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| corrupted(format!("invalid timestamp {secs}")))
}

fn corrupted(message: impl Into<String>) -> Error {
    StateError::StateCorrupted {
        message: message.into(),
    }
    .into()
}
