//! Transaction and host-task records and their status machines

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::{HostAction, HostId, LifecycleOptions, OpKind};

/// Transaction identifier, assigned monotonically by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxnId(pub i64);

impl TxnId {
    #[must_use]
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TxnId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

// Clients see txn ids as strings
impl Serialize for TxnId {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TxnId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Overall status of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    InProgress,
    /// Cancellation recorded; in-flight host tasks are draining
    Cancelling,
    Success,
    Failed,
    PartialFailure,
    Cancelled,
}

impl TransactionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Cancelling => "CANCELLING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::PartialFailure => "PARTIAL_FAILURE",
            Self::Cancelled => "CANCELLED",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failed | Self::PartialFailure | Self::Cancelled
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "CANCELLING" => Ok(Self::Cancelling),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            "PARTIAL_FAILURE" => Ok(Self::PartialFailure),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(format!("unknown transaction status: {other}")),
        }
    }
}

/// Status of a single host task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostTaskStatus {
    Queued,
    Dispatched,
    Succeeded,
    Failed,
    TimedOut,
    /// Never dispatched because the transaction was cancelled first
    Cancelled,
}

impl HostTaskStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Dispatched => "DISPATCHED",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::TimedOut => "TIMED_OUT",
            Self::Cancelled => "CANCELLED",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Queued | Self::Dispatched)
    }
}

impl fmt::Display for HostTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostTaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEUED" => Ok(Self::Queued),
            "DISPATCHED" => Ok(Self::Dispatched),
            "SUCCEEDED" => Ok(Self::Succeeded),
            "FAILED" => Ok(Self::Failed),
            "TIMED_OUT" => Ok(Self::TimedOut),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(format!("unknown host task status: {other}")),
        }
    }
}

/// Compute the terminal status of a transaction from its host tasks.
///
/// Returns `None` while any task is unresolved.
pub fn aggregate_status<I>(statuses: I) -> Option<TransactionStatus>
where
    I: IntoIterator<Item = HostTaskStatus>,
{
    let mut total = 0usize;
    let mut succeeded = 0usize;
    let mut cancelled = false;

    for status in statuses {
        if !status.is_terminal() {
            return None;
        }
        total += 1;
        match status {
            HostTaskStatus::Succeeded => succeeded += 1,
            HostTaskStatus::Cancelled => cancelled = true,
            _ => {}
        }
    }

    Some(if cancelled {
        TransactionStatus::Cancelled
    } else if succeeded == total {
        TransactionStatus::Success
    } else if succeeded == 0 {
        TransactionStatus::Failed
    } else {
        TransactionStatus::PartialFailure
    })
}

/// Persisted host task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostTask {
    pub txn_id: TxnId,
    pub host: HostId,
    pub plan: Vec<HostAction>,
    pub status: HostTaskStatus,
    /// Agent calls made for this task across all steps, including retries
    pub attempts: u32,
    pub steps_completed: u32,
    /// Agent calls made for the current step; reset when a step completes
    pub step_attempts: u32,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl HostTask {
    /// Remaining steps, starting at the persisted cursor
    #[must_use]
    pub fn remaining_steps(&self) -> &[HostAction] {
        let done = usize::try_from(self.steps_completed).unwrap_or(usize::MAX);
        self.plan.get(done..).unwrap_or(&[])
    }
}

/// Persisted transaction with its host tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxnId,
    pub cluster: String,
    pub op: OpKind,
    pub wipeout: bool,
    pub status: TransactionStatus,
    pub retry_of: Option<TxnId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub tasks: Vec<HostTask>,
}

/// Host task to be created alongside a new transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTaskDraft {
    pub host: HostId,
    pub plan: Vec<HostAction>,
}

/// Everything needed to persist a new transaction
#[derive(Debug, Clone)]
pub struct TransactionDraft {
    pub cluster: String,
    pub op: OpKind,
    pub options: LifecycleOptions,
    pub retry_of: Option<TxnId>,
    pub tasks: Vec<HostTaskDraft>,
}

impl TransactionDraft {
    #[must_use]
    pub fn new(cluster: impl Into<String>, op: OpKind, options: LifecycleOptions) -> Self {
        Self {
            cluster: cluster.into(),
            op,
            options,
            retry_of: None,
            tasks: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_task(mut self, host: impl Into<String>, plan: Vec<HostAction>) -> Self {
        self.tasks.push(HostTaskDraft {
            host: host.into(),
            plan,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txn_id_serializes_as_string() {
        let json = serde_json::to_string(&TxnId(42)).unwrap();
        assert_eq!(json, r#""42""#);
        let back: TxnId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TxnId(42));
    }

    #[test]
    fn unresolved_tasks_keep_transaction_open() {
        let statuses = [HostTaskStatus::Succeeded, HostTaskStatus::Dispatched];
        assert_eq!(aggregate_status(statuses), None);
    }

    #[test]
    fn cancelled_tasks_win_over_mixed_outcomes() {
        let statuses = [
            HostTaskStatus::Succeeded,
            HostTaskStatus::Failed,
            HostTaskStatus::Cancelled,
        ];
        assert_eq!(aggregate_status(statuses), Some(TransactionStatus::Cancelled));
    }

    #[test]
    fn timed_out_counts_as_failure() {
        let statuses = [HostTaskStatus::TimedOut, HostTaskStatus::Failed];
        assert_eq!(aggregate_status(statuses), Some(TransactionStatus::Failed));
    }
}
