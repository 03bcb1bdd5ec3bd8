//! State manager implementation

use crate::{models::ClusterHostRow, queries};
use hmc_errors::{Error, StateError};
use hmc_types::{
    aggregate_status, Cluster, ClusterState, Host, HostTask, HostTaskStatus, OpKind, Transaction,
    TransactionDraft, TransactionStatus, TxnId,
};
use sqlx::{Pool, Sqlite};
use std::path::Path;

const OPEN_STATUSES: [TransactionStatus; 3] = [
    TransactionStatus::Pending,
    TransactionStatus::InProgress,
    TransactionStatus::Cancelling,
];

/// Durable store for clusters, transactions and host tasks
#[derive(Clone)]
pub struct StateManager {
    pool: Pool<Sqlite>,
}

impl StateManager {
    /// Open (or create) the database at `db_path` and run migrations
    ///
    /// # Errors
    ///
    /// Returns an error if database setup or migrations fail.
    pub async fn new(db_path: &Path) -> Result<Self, Error> {
        let pool = crate::create_pool(db_path).await?;
        crate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Create a state manager over an already migrated pool
    #[must_use]
    pub fn with_pool(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Register a cluster or replace the host set of an idle one
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the cluster has an active transaction, or a
    /// database error.
    pub async fn register_cluster(&self, name: &str, hosts: &[Host]) -> Result<Cluster, Error> {
        let now = now();
        let mut tx = self.pool.begin().await?;

        queries::upsert_cluster(&mut tx, name, now).await?;
        let row = queries::get_cluster(&mut tx, name)
            .await?
            .ok_or_else(|| StateError::ClusterNotFound {
                name: name.to_string(),
            })?;
        if let Some(active) = row.active_txn_id {
            return Err(StateError::Conflict {
                cluster: name.to_string(),
                active_txn_id: active.to_string(),
            }
            .into());
        }

        queries::replace_cluster_hosts(&mut tx, name, hosts).await?;
        tx.commit().await?;

        Ok(Cluster {
            name: name.to_string(),
            hosts: hosts.to_vec(),
            state: row.cluster_state()?,
            active_txn_id: None,
        })
    }

    /// Look up a cluster with its hosts
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_cluster(&self, name: &str) -> Result<Option<Cluster>, Error> {
        let mut tx = self.pool.begin().await?;
        let cluster = load_cluster(&mut tx, name).await?;
        tx.commit().await?;
        Ok(cluster)
    }

    /// List every registered cluster
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_clusters(&self) -> Result<Vec<Cluster>, Error> {
        let mut tx = self.pool.begin().await?;
        let mut clusters = Vec::new();
        for name in queries::list_cluster_names(&mut tx).await? {
            if let Some(cluster) = load_cluster(&mut tx, &name).await? {
                clusters.push(cluster);
            }
        }
        tx.commit().await?;
        Ok(clusters)
    }

    /// The cluster's non-terminal transaction, if any
    ///
    /// # Errors
    ///
    /// Returns `ClusterNotFound` for an unknown cluster.
    pub async fn active_transaction(&self, cluster: &str) -> Result<Option<TxnId>, Error> {
        let mut tx = self.pool.begin().await?;
        let row = queries::get_cluster(&mut tx, cluster).await?;
        tx.commit().await?;

        row.map(|r| r.active_txn_id.map(TxnId))
            .ok_or_else(|| {
                StateError::ClusterNotFound {
                    name: cluster.to_string(),
                }
                .into()
            })
    }

    /// Persist a PENDING transaction with QUEUED host tasks.
    ///
    /// The cluster's active-transaction guard is set in the same database
    /// transaction, so of two concurrent creates for one cluster exactly one
    /// commits and the other sees `Conflict`.
    ///
    /// # Errors
    ///
    /// Returns `ClusterNotFound`, `Conflict`, or a database error. Nothing
    /// is persisted on error.
    pub async fn create_transaction(&self, draft: &TransactionDraft) -> Result<TxnId, Error> {
        let now = now();
        let mut tx = self.pool.begin().await?;

        // Write first so the connection takes the write lock before reading
        let Some(id) = queries::insert_transaction(
            &mut tx,
            &draft.cluster,
            draft.op,
            draft.options.wipeout,
            draft.retry_of,
            now,
        )
        .await?
        else {
            return Err(StateError::ClusterNotFound {
                name: draft.cluster.clone(),
            }
            .into());
        };

        if !queries::claim_cluster(&mut tx, &draft.cluster, id, now).await? {
            let active = queries::get_cluster(&mut tx, &draft.cluster)
                .await?
                .and_then(|row| row.active_txn_id)
                .map_or_else(|| "unknown".to_string(), |id| id.to_string());
            return Err(StateError::Conflict {
                cluster: draft.cluster.clone(),
                active_txn_id: active,
            }
            .into());
        }

        for (position, task) in draft.tasks.iter().enumerate() {
            queries::insert_host_task(&mut tx, id, position, &task.host, &task.plan, now).await?;
        }

        tx.commit().await?;
        Ok(TxnId(id))
    }

    /// Read a consistent snapshot of a transaction and its host tasks
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotFound` for an unknown id.
    pub async fn get_transaction(&self, id: TxnId) -> Result<Transaction, Error> {
        let mut tx = self.pool.begin().await?;
        let transaction = load_transaction(&mut tx, id.get()).await?;
        tx.commit().await?;
        transaction.ok_or_else(|| not_found(id))
    }

    /// List transactions newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_transactions(
        &self,
        cluster: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Transaction>, Error> {
        let mut tx = self.pool.begin().await?;
        let rows = queries::list_transactions(&mut tx, cluster, limit).await?;
        let mut transactions = Vec::with_capacity(rows.len());
        for row in rows {
            let tasks = load_tasks(&mut tx, row.id).await?;
            transactions.push(row.into_transaction(tasks)?);
        }
        tx.commit().await?;
        Ok(transactions)
    }

    /// Ids of transactions that still need driving
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn non_terminal_transactions(&self) -> Result<Vec<TxnId>, Error> {
        let mut tx = self.pool.begin().await?;
        let ids = queries::non_terminal_transaction_ids(&mut tx).await?;
        tx.commit().await?;
        Ok(ids.into_iter().map(TxnId).collect())
    }

    /// PENDING → IN_PROGRESS. Returns `false` if the transaction was not PENDING.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn mark_in_progress(&self, id: TxnId) -> Result<bool, Error> {
        let mut tx = self.pool.begin().await?;
        let changed = queries::transition_transaction(
            &mut tx,
            id.get(),
            &[TransactionStatus::Pending],
            TransactionStatus::InProgress,
            now(),
        )
        .await?;
        tx.commit().await?;
        Ok(changed)
    }

    /// Claim a QUEUED task for its first dispatch.
    ///
    /// Returns the attempt number, or `None` if the task is no longer
    /// queued or the transaction is not IN_PROGRESS (e.g. cancelled).
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn claim_host_task(&self, id: TxnId, host: &str) -> Result<Option<u32>, Error> {
        let mut tx = self.pool.begin().await?;
        let attempts = queries::claim_host_task(&mut tx, id.get(), host, now()).await?;
        tx.commit().await?;
        Ok(attempts.map(|n| n as u32))
    }

    /// Count a further agent call (retry or re-dispatch) on a DISPATCHED task.
    ///
    /// Returns `None` if the transaction stopped accepting new dispatches.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn record_attempt(&self, id: TxnId, host: &str) -> Result<Option<u32>, Error> {
        let mut tx = self.pool.begin().await?;
        let attempts = queries::bump_attempt(&mut tx, id.get(), host, now()).await?;
        tx.commit().await?;
        Ok(attempts.map(|n| n as u32))
    }

    /// Persist completion of one plan step of a DISPATCHED task
    ///
    /// # Errors
    ///
    /// Returns `HostTaskNotFound` if the task is not DISPATCHED.
    pub async fn advance_step(&self, id: TxnId, host: &str) -> Result<u32, Error> {
        let mut tx = self.pool.begin().await?;
        let steps = queries::advance_step(&mut tx, id.get(), host, now()).await?;
        tx.commit().await?;
        steps.map(|n| n as u32).ok_or_else(|| {
            StateError::HostTaskNotFound {
                txn_id: id.to_string(),
                host: host.to_string(),
            }
            .into()
        })
    }

    /// Record a DISPATCHED task's terminal outcome and, if it was the last
    /// unresolved task, the transaction's terminal status.
    ///
    /// Returns the terminal transaction status when this call finalized it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if `status` is not terminal, or a
    /// database error.
    pub async fn complete_host_task(
        &self,
        id: TxnId,
        host: &str,
        status: HostTaskStatus,
        error: Option<&str>,
    ) -> Result<Option<TransactionStatus>, Error> {
        if !status.is_terminal() {
            return Err(StateError::InvalidTransition {
                from: HostTaskStatus::Dispatched.to_string(),
                to: status.to_string(),
            }
            .into());
        }

        let now = now();
        let mut tx = self.pool.begin().await?;
        if !queries::resolve_host_task(&mut tx, id.get(), host, status, error, now).await? {
            // Already resolved (e.g. interrupted during cancellation)
            tx.commit().await?;
            return Ok(None);
        }
        let terminal = finalize_if_resolved(&mut tx, id.get(), now).await?;
        tx.commit().await?;
        Ok(terminal)
    }

    /// Record a cancellation request.
    ///
    /// QUEUED tasks become CANCELLED immediately; DISPATCHED tasks are left
    /// to finish. Returns the transaction status after the request, which is
    /// terminal if nothing was in flight.
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotFound`, or `InvalidTransition` for a terminal
    /// transaction.
    pub async fn request_cancel(&self, id: TxnId) -> Result<TransactionStatus, Error> {
        let now = now();
        let mut tx = self.pool.begin().await?;

        let changed = queries::transition_transaction(
            &mut tx,
            id.get(),
            &[TransactionStatus::Pending, TransactionStatus::InProgress],
            TransactionStatus::Cancelling,
            now,
        )
        .await?;

        if !changed {
            let row = queries::get_transaction(&mut tx, id.get())
                .await?
                .ok_or_else(|| not_found(id))?;
            let status = row.status()?;
            tx.commit().await?;
            return if status == TransactionStatus::Cancelling {
                Ok(status)
            } else {
                Err(StateError::InvalidTransition {
                    from: status.to_string(),
                    to: TransactionStatus::Cancelling.to_string(),
                }
                .into())
            };
        }

        queries::resolve_tasks_in_status(
            &mut tx,
            id.get(),
            HostTaskStatus::Queued,
            HostTaskStatus::Cancelled,
            Some("cancelled before dispatch"),
            now,
        )
        .await?;
        let terminal = finalize_if_resolved(&mut tx, id.get(), now).await?;
        tx.commit().await?;

        Ok(terminal.unwrap_or(TransactionStatus::Cancelling))
    }

    /// Fail every DISPATCHED task of a transaction with `reason` and
    /// finalize it if nothing else is unresolved.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn fail_in_flight(
        &self,
        id: TxnId,
        reason: &str,
    ) -> Result<Option<TransactionStatus>, Error> {
        let now = now();
        let mut tx = self.pool.begin().await?;
        queries::resolve_tasks_in_status(
            &mut tx,
            id.get(),
            HostTaskStatus::Dispatched,
            HostTaskStatus::Failed,
            Some(reason),
            now,
        )
        .await?;
        let terminal = finalize_if_resolved(&mut tx, id.get(), now).await?;
        tx.commit().await?;
        Ok(terminal)
    }

    /// Fail a task the worker could no longer drive, whether QUEUED or
    /// DISPATCHED, and finalize the transaction if it was the last one.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn abandon_host_task(
        &self,
        id: TxnId,
        host: &str,
        reason: &str,
    ) -> Result<Option<TransactionStatus>, Error> {
        let now = now();
        let mut tx = self.pool.begin().await?;
        if !queries::fail_unresolved_host_task(&mut tx, id.get(), host, reason, now).await? {
            tx.commit().await?;
            return Ok(None);
        }
        let terminal = finalize_if_resolved(&mut tx, id.get(), now).await?;
        tx.commit().await?;
        Ok(terminal)
    }

    /// Fail every unresolved task of a transaction and finalize it
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn abandon_transaction(
        &self,
        id: TxnId,
        reason: &str,
    ) -> Result<Option<TransactionStatus>, Error> {
        let now = now();
        let mut tx = self.pool.begin().await?;
        for from in [HostTaskStatus::Queued, HostTaskStatus::Dispatched] {
            queries::resolve_tasks_in_status(
                &mut tx,
                id.get(),
                from,
                HostTaskStatus::Failed,
                Some(reason),
                now,
            )
            .await?;
        }
        let terminal = finalize_if_resolved(&mut tx, id.get(), now).await?;
        tx.commit().await?;
        Ok(terminal)
    }

    /// Finalize a transaction whose tasks are all resolved
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotFound` or a database error.
    pub async fn finalize(&self, id: TxnId) -> Result<Option<TransactionStatus>, Error> {
        let now = now();
        let mut tx = self.pool.begin().await?;
        let terminal = finalize_if_resolved(&mut tx, id.get(), now).await?;
        tx.commit().await?;
        Ok(terminal)
    }

    /// Delete terminal transactions completed more than `retention_days` ago.
    ///
    /// Returns the number of transactions removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn prune(&self, retention_days: u32) -> Result<u64, Error> {
        let cutoff = now() - i64::from(retention_days) * 86_400;
        let mut tx = self.pool.begin().await?;
        let removed = queries::delete_terminal_before(&mut tx, cutoff).await?;
        tx.commit().await?;
        Ok(removed)
    }
}

/// Compute and persist the terminal status if no task is unresolved.
///
/// A CANCELLING transaction always ends CANCELLED.
/// Clears the cluster's active-transaction guard and applies the cluster
/// state change of a successful lifecycle operation.
async fn finalize_if_resolved(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    id: i64,
    now: i64,
) -> Result<Option<TransactionStatus>, Error> {
    let row = queries::get_transaction(tx, id)
        .await?
        .ok_or_else(|| not_found(TxnId(id)))?;
    let current = row.status()?;
    if current.is_terminal() {
        return Ok(None);
    }

    let statuses = queries::get_host_task_statuses(tx, id)
        .await?
        .into_iter()
        .map(|s| {
            s.parse::<HostTaskStatus>()
                .map_err(|message| Error::from(StateError::StateCorrupted { message }))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let Some(aggregate) = aggregate_status(statuses) else {
        return Ok(None);
    };
    // A recorded cancellation always ends CANCELLED; the tasks keep what completed
    let terminal = if current == TransactionStatus::Cancelling {
        TransactionStatus::Cancelled
    } else {
        aggregate
    };

    queries::transition_transaction(tx, id, &OPEN_STATUSES, terminal, now).await?;
    queries::release_cluster(tx, &row.cluster_name, id, now).await?;

    if terminal == TransactionStatus::Success {
        let op: Option<OpKind> = row.op_kind.parse().ok();
        let state = match op {
            Some(OpKind::Install) => Some(ClusterState::Installed),
            Some(OpKind::Uninstall) if row.wipeout => Some(ClusterState::Decommissioned),
            Some(OpKind::Uninstall) => Some(ClusterState::Registered),
            _ => None,
        };
        if let Some(state) = state {
            queries::set_cluster_state(tx, &row.cluster_name, state, now).await?;
        }
    }

    Ok(Some(terminal))
}

async fn load_cluster(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    name: &str,
) -> Result<Option<Cluster>, Error> {
    let Some(row) = queries::get_cluster(tx, name).await? else {
        return Ok(None);
    };
    let hosts = queries::get_cluster_hosts(tx, name)
        .await?
        .into_iter()
        .map(host_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(Cluster {
        state: row.cluster_state()?,
        active_txn_id: row.active_txn_id.map(TxnId),
        name: row.name,
        hosts,
    }))
}

async fn load_transaction(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    id: i64,
) -> Result<Option<Transaction>, Error> {
    let Some(row) = queries::get_transaction(tx, id).await? else {
        return Ok(None);
    };
    let tasks = load_tasks(tx, id).await?;
    row.into_transaction(tasks).map(Some)
}

async fn load_tasks(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    id: i64,
) -> Result<Vec<HostTask>, Error> {
    queries::get_host_tasks(tx, id)
        .await?
        .into_iter()
        .map(HostTask::try_from)
        .collect()
}

fn host_from_row(row: ClusterHostRow) -> Result<Host, Error> {
    let roles: Vec<String> = serde_json::from_str(&row.roles)?;
    Ok(Host {
        name: row.host,
        roles,
    })
}

fn not_found(id: TxnId) -> Error {
    StateError::TransactionNotFound { id: id.to_string() }.into()
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
