//! Runtime SQL queries for the transaction store

use crate::models::{ClusterHostRow, ClusterRow, HostTaskRow, TransactionRow};
use hmc_errors::Error;
use hmc_types::{
    ClusterState, Host, HostAction, HostTaskStatus, OpKind, TransactionStatus, TxnId,
};
use sqlx::{query, query_as, query_scalar, Sqlite, Transaction};

const TRANSACTION_COLUMNS: &str = "id, cluster_name, op_kind, wipeout, status, retry_of, \
     created_at, started_at, completed_at";

const HOST_TASK_COLUMNS: &str =
    "txn_id, host, plan, status, attempts, steps_completed, step_attempts, error, updated_at";

/// Insert a cluster or refresh its timestamp if it already exists
pub async fn upsert_cluster(
    tx: &mut Transaction<'_, Sqlite>,
    name: &str,
    now: i64,
) -> Result<(), Error> {
    query(
        "INSERT INTO clusters (name, state, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)
         ON CONFLICT(name) DO UPDATE SET updated_at = excluded.updated_at",
    )
    .bind(name)
    .bind(ClusterState::Registered.as_str())
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Replace the member hosts of a cluster
pub async fn replace_cluster_hosts(
    tx: &mut Transaction<'_, Sqlite>,
    name: &str,
    hosts: &[Host],
) -> Result<(), Error> {
    query("DELETE FROM cluster_hosts WHERE cluster_name = ?1")
        .bind(name)
        .execute(&mut **tx)
        .await?;

    for (position, host) in hosts.iter().enumerate() {
        let roles = serde_json::to_string(&host.roles)?;
        query(
            "INSERT INTO cluster_hosts (cluster_name, host, roles, position)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(name)
        .bind(&host.name)
        .bind(roles)
        .bind(position as i64)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Get a cluster row by name
pub async fn get_cluster(
    tx: &mut Transaction<'_, Sqlite>,
    name: &str,
) -> Result<Option<ClusterRow>, Error> {
    let row = query_as::<_, ClusterRow>(
        "SELECT name, state, active_txn_id, created_at, updated_at FROM clusters WHERE name = ?1",
    )
    .bind(name)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row)
}

/// Get the member hosts of a cluster in registration order
pub async fn get_cluster_hosts(
    tx: &mut Transaction<'_, Sqlite>,
    name: &str,
) -> Result<Vec<ClusterHostRow>, Error> {
    let rows = query_as::<_, ClusterHostRow>(
        "SELECT host, roles FROM cluster_hosts WHERE cluster_name = ?1 ORDER BY position",
    )
    .bind(name)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows)
}

/// List all cluster names
pub async fn list_cluster_names(tx: &mut Transaction<'_, Sqlite>) -> Result<Vec<String>, Error> {
    let names = query_scalar::<_, String>("SELECT name FROM clusters ORDER BY name")
        .fetch_all(&mut **tx)
        .await?;
    Ok(names)
}

/// Set a cluster's lifecycle state
pub async fn set_cluster_state(
    tx: &mut Transaction<'_, Sqlite>,
    name: &str,
    state: ClusterState,
    now: i64,
) -> Result<(), Error> {
    query("UPDATE clusters SET state = ?1, updated_at = ?2 WHERE name = ?3")
        .bind(state.as_str())
        .bind(now)
        .bind(name)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Insert a PENDING transaction for an existing cluster.
///
/// Returns `None` when the cluster does not exist.
pub async fn insert_transaction(
    tx: &mut Transaction<'_, Sqlite>,
    cluster: &str,
    op: OpKind,
    wipeout: bool,
    retry_of: Option<TxnId>,
    now: i64,
) -> Result<Option<i64>, Error> {
    let result = query(
        "INSERT INTO transactions (cluster_name, op_kind, wipeout, status, retry_of, created_at)
         SELECT name, ?1, ?2, ?3, ?4, ?5 FROM clusters WHERE name = ?6",
    )
    .bind(op.as_str())
    .bind(wipeout)
    .bind(TransactionStatus::Pending.as_str())
    .bind(retry_of.map(TxnId::get))
    .bind(now)
    .bind(cluster)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    Ok(Some(result.last_insert_rowid()))
}

/// Make `txn_id` the cluster's active transaction if it has none.
///
/// Returns `false` if another transaction already holds the cluster.
pub async fn claim_cluster(
    tx: &mut Transaction<'_, Sqlite>,
    cluster: &str,
    txn_id: i64,
    now: i64,
) -> Result<bool, Error> {
    let result = query(
        "UPDATE clusters SET active_txn_id = ?1, updated_at = ?2
         WHERE name = ?3 AND active_txn_id IS NULL",
    )
    .bind(txn_id)
    .bind(now)
    .bind(cluster)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Clear the cluster's active transaction if it is `txn_id`
pub async fn release_cluster(
    tx: &mut Transaction<'_, Sqlite>,
    cluster: &str,
    txn_id: i64,
    now: i64,
) -> Result<(), Error> {
    query(
        "UPDATE clusters SET active_txn_id = NULL, updated_at = ?1
         WHERE name = ?2 AND active_txn_id = ?3",
    )
    .bind(now)
    .bind(cluster)
    .bind(txn_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Insert a QUEUED host task
pub async fn insert_host_task(
    tx: &mut Transaction<'_, Sqlite>,
    txn_id: i64,
    position: usize,
    host: &str,
    plan: &[HostAction],
    now: i64,
) -> Result<(), Error> {
    let plan = serde_json::to_string(plan)?;
    query(
        "INSERT INTO host_tasks (txn_id, host, position, plan, status, attempts, steps_completed, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, ?6)",
    )
    .bind(txn_id)
    .bind(host)
    .bind(position as i64)
    .bind(plan)
    .bind(HostTaskStatus::Queued.as_str())
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Get a transaction row by id
pub async fn get_transaction(
    tx: &mut Transaction<'_, Sqlite>,
    txn_id: i64,
) -> Result<Option<TransactionRow>, Error> {
    let row = query_as::<_, TransactionRow>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1"
    ))
    .bind(txn_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row)
}

/// List transactions, newest first, optionally for one cluster
pub async fn list_transactions(
    tx: &mut Transaction<'_, Sqlite>,
    cluster: Option<&str>,
    limit: u32,
) -> Result<Vec<TransactionRow>, Error> {
    let rows = query_as::<_, TransactionRow>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions
         WHERE ?1 IS NULL OR cluster_name = ?1
         ORDER BY id DESC LIMIT ?2"
    ))
    .bind(cluster)
    .bind(i64::from(limit))
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows)
}

/// Ids of every transaction that has not reached a terminal status
pub async fn non_terminal_transaction_ids(
    tx: &mut Transaction<'_, Sqlite>,
) -> Result<Vec<i64>, Error> {
    let ids = query_scalar::<_, i64>(
        "SELECT id FROM transactions
         WHERE status IN ('PENDING', 'IN_PROGRESS', 'CANCELLING')
         ORDER BY id",
    )
    .fetch_all(&mut **tx)
    .await?;
    Ok(ids)
}

/// Get the host tasks of a transaction in creation order
pub async fn get_host_tasks(
    tx: &mut Transaction<'_, Sqlite>,
    txn_id: i64,
) -> Result<Vec<HostTaskRow>, Error> {
    let rows = query_as::<_, HostTaskRow>(&format!(
        "SELECT {HOST_TASK_COLUMNS} FROM host_tasks WHERE txn_id = ?1 ORDER BY position"
    ))
    .bind(txn_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows)
}

/// Move a transaction between statuses, only if it is currently in one of `from`.
///
/// Returns whether a row changed.
pub async fn transition_transaction(
    tx: &mut Transaction<'_, Sqlite>,
    txn_id: i64,
    from: &[TransactionStatus],
    to: TransactionStatus,
    now: i64,
) -> Result<bool, Error> {
    let allowed = serde_json::to_string(&from.iter().map(|s| s.as_str()).collect::<Vec<_>>())?;
    let result = query(
        "UPDATE transactions SET
             status = ?1,
             started_at = CASE WHEN ?1 = 'IN_PROGRESS' THEN COALESCE(started_at, ?2) ELSE started_at END,
             completed_at = CASE WHEN ?1 IN ('SUCCESS', 'FAILED', 'PARTIAL_FAILURE', 'CANCELLED')
                                 THEN ?2 ELSE completed_at END
         WHERE id = ?3 AND status IN (SELECT value FROM json_each(?4))",
    )
    .bind(to.as_str())
    .bind(now)
    .bind(txn_id)
    .bind(allowed)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Atomically claim a QUEUED task for dispatch while its transaction is IN_PROGRESS.
///
/// Returns the new attempt count, or `None` if the task was not claimable.
pub async fn claim_host_task(
    tx: &mut Transaction<'_, Sqlite>,
    txn_id: i64,
    host: &str,
    now: i64,
) -> Result<Option<i64>, Error> {
    let attempts = query_scalar::<_, i64>(
        "UPDATE host_tasks SET status = 'DISPATCHED', attempts = attempts + 1, step_attempts = 1,
             updated_at = ?1
         WHERE txn_id = ?2 AND host = ?3 AND status = 'QUEUED'
           AND EXISTS (SELECT 1 FROM transactions WHERE id = ?2 AND status = 'IN_PROGRESS')
         RETURNING attempts",
    )
    .bind(now)
    .bind(txn_id)
    .bind(host)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(attempts)
}

/// Count another agent call against a DISPATCHED task while its transaction is IN_PROGRESS.
///
/// Returns the new attempt count, or `None` if a further attempt is not allowed.
pub async fn bump_attempt(
    tx: &mut Transaction<'_, Sqlite>,
    txn_id: i64,
    host: &str,
    now: i64,
) -> Result<Option<i64>, Error> {
    let attempts = query_scalar::<_, i64>(
        "UPDATE host_tasks SET attempts = attempts + 1, step_attempts = step_attempts + 1,
             updated_at = ?1
         WHERE txn_id = ?2 AND host = ?3 AND status = 'DISPATCHED'
           AND EXISTS (SELECT 1 FROM transactions WHERE id = ?2 AND status = 'IN_PROGRESS')
         RETURNING attempts",
    )
    .bind(now)
    .bind(txn_id)
    .bind(host)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(attempts)
}

/// Advance the step cursor of a DISPATCHED task
pub async fn advance_step(
    tx: &mut Transaction<'_, Sqlite>,
    txn_id: i64,
    host: &str,
    now: i64,
) -> Result<Option<i64>, Error> {
    let steps = query_scalar::<_, i64>(
        "UPDATE host_tasks SET steps_completed = steps_completed + 1, step_attempts = 0,
             updated_at = ?1
         WHERE txn_id = ?2 AND host = ?3 AND status = 'DISPATCHED'
         RETURNING steps_completed",
    )
    .bind(now)
    .bind(txn_id)
    .bind(host)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(steps)
}

/// Record the terminal outcome of a DISPATCHED task.
///
/// Returns whether a row changed.
pub async fn resolve_host_task(
    tx: &mut Transaction<'_, Sqlite>,
    txn_id: i64,
    host: &str,
    status: HostTaskStatus,
    error: Option<&str>,
    now: i64,
) -> Result<bool, Error> {
    let result = query(
        "UPDATE host_tasks SET status = ?1, error = ?2, updated_at = ?3
         WHERE txn_id = ?4 AND host = ?5 AND status = 'DISPATCHED'",
    )
    .bind(status.as_str())
    .bind(error)
    .bind(now)
    .bind(txn_id)
    .bind(host)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Fail one task that is still QUEUED or DISPATCHED.
///
/// Returns whether a row changed.
pub async fn fail_unresolved_host_task(
    tx: &mut Transaction<'_, Sqlite>,
    txn_id: i64,
    host: &str,
    error: &str,
    now: i64,
) -> Result<bool, Error> {
    let result = query(
        "UPDATE host_tasks SET status = 'FAILED', error = ?1, updated_at = ?2
         WHERE txn_id = ?3 AND host = ?4 AND status IN ('QUEUED', 'DISPATCHED')",
    )
    .bind(error)
    .bind(now)
    .bind(txn_id)
    .bind(host)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Resolve every task of a transaction currently in `from` to `to`.
///
/// Returns the number of tasks changed.
pub async fn resolve_tasks_in_status(
    tx: &mut Transaction<'_, Sqlite>,
    txn_id: i64,
    from: HostTaskStatus,
    to: HostTaskStatus,
    error: Option<&str>,
    now: i64,
) -> Result<u64, Error> {
    let result = query(
        "UPDATE host_tasks SET status = ?1, error = COALESCE(?2, error), updated_at = ?3
         WHERE txn_id = ?4 AND status = ?5",
    )
    .bind(to.as_str())
    .bind(error)
    .bind(now)
    .bind(txn_id)
    .bind(from.as_str())
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

/// Statuses of all host tasks of a transaction
pub async fn get_host_task_statuses(
    tx: &mut Transaction<'_, Sqlite>,
    txn_id: i64,
) -> Result<Vec<String>, Error> {
    let statuses = query_scalar::<_, String>("SELECT status FROM host_tasks WHERE txn_id = ?1")
        .bind(txn_id)
        .fetch_all(&mut **tx)
        .await?;
    Ok(statuses)
}

/// Delete terminal transactions completed before `cutoff`.
///
/// Transactions still referenced as a cluster's active transaction are kept.
pub async fn delete_terminal_before(
    tx: &mut Transaction<'_, Sqlite>,
    cutoff: i64,
) -> Result<u64, Error> {
    let selection = "SELECT id FROM transactions
         WHERE status IN ('SUCCESS', 'FAILED', 'PARTIAL_FAILURE', 'CANCELLED')
           AND completed_at IS NOT NULL AND completed_at < ?1
           AND id NOT IN (SELECT active_txn_id FROM clusters WHERE active_txn_id IS NOT NULL)";

    query(&format!("DELETE FROM host_tasks WHERE txn_id IN ({selection})"))
        .bind(cutoff)
        .execute(&mut **tx)
        .await?;

    let result = query(&format!("DELETE FROM transactions WHERE id IN ({selection})"))
        .bind(cutoff)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected())
}
