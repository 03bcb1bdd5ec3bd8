use hmc_types::{OpKind, TransactionStatus, TxnId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Transaction lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TransactionEvent {
    /// Transaction durably recorded as PENDING
    Accepted {
        txn_id: TxnId,
        cluster: String,
        op: OpKind,
        wipeout: bool,
        hosts: usize,
    },

    /// Request resolved to an empty host set; nothing recorded
    NoOp { cluster: String, op: OpKind },

    /// Background run moved the transaction to IN_PROGRESS
    Started { txn_id: TxnId },

    /// A non-terminal transaction found at startup is being driven again
    Resumed { txn_id: TxnId, unresolved: usize },

    CancelRequested { txn_id: TxnId },

    /// New transaction created over the unsucceeded hosts of a finished one
    RetryCreated { txn_id: TxnId, retry_of: TxnId, hosts: usize },

    Completed {
        txn_id: TxnId,
        status: TransactionStatus,
        duration: Duration,
    },

    /// Terminal transactions removed by retention
    Pruned { removed: u64 },
}
