//! Structured logging integration for events
//!
//! Library crates report progress as [`AppEvent`]s; this module turns each
//! one into a tracing record with structured fields, at the level the
//! event declares for itself.

use hmc_events::{AppEvent, ClusterEvent, GeneralEvent, HostTaskEvent, TransactionEvent};
use tracing::Level;

/// Emit a tracing event at a level only known at runtime
macro_rules! event_at {
    ($level:expr, target: $target:literal, $($rest:tt)+) => {{
        let level = $level;
        if level == Level::ERROR {
            tracing::error!(target: $target, $($rest)+);
        } else if level == Level::WARN {
            tracing::warn!(target: $target, $($rest)+);
        } else if level == Level::INFO {
            tracing::info!(target: $target, $($rest)+);
        } else if level == Level::DEBUG {
            tracing::debug!(target: $target, $($rest)+);
        } else {
            tracing::trace!(target: $target, $($rest)+);
        }
    }};
}

/// Log an `AppEvent` using the tracing infrastructure with structured fields
pub fn log_event_with_tracing(event: &AppEvent) {
    let level = event.log_level();
    match event {
        AppEvent::General(general) => log_general(level, general),
        AppEvent::Transaction(txn) => log_transaction(level, txn),
        AppEvent::HostTask(task) => log_host_task(level, task),
        AppEvent::Cluster(cluster) => log_cluster(level, cluster),
    }
}

fn log_general(level: Level, event: &GeneralEvent) {
    match event {
        GeneralEvent::Warning { message, context } => {
            event_at!(level, target: "hmc::events::general", context = ?context, "{message}");
        }
        GeneralEvent::Error { message, details } => {
            event_at!(level, target: "hmc::events::general", details = ?details, "{message}");
        }
        GeneralEvent::DebugLog { message, context } => {
            event_at!(level, target: "hmc::events::general", context = ?context, "{message}");
        }
    }
}

fn log_transaction(level: Level, event: &TransactionEvent) {
    match event {
        TransactionEvent::Accepted {
            txn_id,
            cluster,
            op,
            wipeout,
            hosts,
        } => {
            event_at!(
                level,
                target: "hmc::events::transaction",
                txn_id = %txn_id,
                cluster = %cluster,
                op = %op,
                wipeout = wipeout,
                hosts = hosts,
                "Transaction accepted"
            );
        }
        TransactionEvent::NoOp { cluster, op } => {
            event_at!(
                level,
                target: "hmc::events::transaction",
                cluster = %cluster,
                op = %op,
                "No hosts to act on; nothing to track"
            );
        }
        TransactionEvent::Started { txn_id } => {
            event_at!(level, target: "hmc::events::transaction", txn_id = %txn_id, "Transaction started");
        }
        TransactionEvent::Resumed { txn_id, unresolved } => {
            event_at!(
                level,
                target: "hmc::events::transaction",
                txn_id = %txn_id,
                unresolved = unresolved,
                "Resuming interrupted transaction"
            );
        }
        TransactionEvent::CancelRequested { txn_id } => {
            event_at!(level, target: "hmc::events::transaction", txn_id = %txn_id, "Cancellation requested");
        }
        TransactionEvent::RetryCreated {
            txn_id,
            retry_of,
            hosts,
        } => {
            event_at!(
                level,
                target: "hmc::events::transaction",
                txn_id = %txn_id,
                retry_of = %retry_of,
                hosts = hosts,
                "Retry transaction created"
            );
        }
        TransactionEvent::Completed {
            txn_id,
            status,
            duration,
        } => {
            event_at!(
                level,
                target: "hmc::events::transaction",
                txn_id = %txn_id,
                status = %status,
                duration = ?duration,
                "Transaction completed"
            );
        }
        TransactionEvent::Pruned { removed } => {
            event_at!(level, target: "hmc::events::transaction", removed = removed, "Pruned old transactions");
        }
    }
}

fn log_host_task(level: Level, event: &HostTaskEvent) {
    match event {
        HostTaskEvent::Dispatched {
            txn_id,
            host,
            action,
            attempt,
        } => {
            event_at!(
                level,
                target: "hmc::events::host_task",
                txn_id = %txn_id,
                host = %host,
                action = %action,
                attempt = attempt,
                "Action dispatched"
            );
        }
        HostTaskEvent::StepCompleted {
            txn_id,
            host,
            action,
        } => {
            event_at!(
                level,
                target: "hmc::events::host_task",
                txn_id = %txn_id,
                host = %host,
                action = %action,
                "Step completed"
            );
        }
        HostTaskEvent::RetryScheduled {
            txn_id,
            host,
            attempt,
            delay,
        } => {
            event_at!(
                level,
                target: "hmc::events::host_task",
                txn_id = %txn_id,
                host = %host,
                attempt = attempt,
                delay = ?delay,
                "Dispatch timed out; retrying"
            );
        }
        HostTaskEvent::Succeeded { txn_id, host } => {
            event_at!(
                level,
                target: "hmc::events::host_task",
                txn_id = %txn_id,
                host = %host,
                "Host task succeeded"
            );
        }
        HostTaskEvent::Failed {
            txn_id,
            host,
            error,
        } => {
            event_at!(
                level,
                target: "hmc::events::host_task",
                txn_id = %txn_id,
                host = %host,
                error = %error,
                "Host task failed"
            );
        }
        HostTaskEvent::Cancelled {
            txn_id,
            host,
            reason,
        } => {
            event_at!(
                level,
                target: "hmc::events::host_task",
                txn_id = %txn_id,
                host = %host,
                reason = %reason,
                "Host task cancelled"
            );
        }
        HostTaskEvent::TimedOut {
            txn_id,
            host,
            attempts,
        } => {
            event_at!(
                level,
                target: "hmc::events::host_task",
                txn_id = %txn_id,
                host = %host,
                attempts = attempts,
                "Host task timed out"
            );
        }
    }
}

fn log_cluster(level: Level, event: &ClusterEvent) {
    match event {
        ClusterEvent::Registered { cluster, hosts } => {
            event_at!(
                level,
                target: "hmc::events::cluster",
                cluster = %cluster,
                hosts = hosts,
                "Cluster registered"
            );
        }
        ClusterEvent::StateChanged { cluster, state } => {
            event_at!(
                level,
                target: "hmc::events::cluster",
                cluster = %cluster,
                state = %state,
                "Cluster state changed"
            );
        }
    }
}
