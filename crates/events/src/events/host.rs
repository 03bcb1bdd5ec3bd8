use hmc_types::{ActionKind, TxnId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-host dispatch events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostTaskEvent {
    Dispatched {
        txn_id: TxnId,
        host: String,
        action: ActionKind,
        attempt: u32,
    },

    StepCompleted {
        txn_id: TxnId,
        host: String,
        action: ActionKind,
    },

    /// The agent call timed out and will be retried after `delay`
    RetryScheduled {
        txn_id: TxnId,
        host: String,
        attempt: u32,
        delay: Duration,
    },

    Succeeded { txn_id: TxnId, host: String },

    Failed {
        txn_id: TxnId,
        host: String,
        error: String,
    },

    /// Stopped by a cancellation before its remaining work was dispatched
    Cancelled {
        txn_id: TxnId,
        host: String,
        reason: String,
    },

    /// Retries exhausted
    TimedOut {
        txn_id: TxnId,
        host: String,
        attempts: u32,
    },
}
