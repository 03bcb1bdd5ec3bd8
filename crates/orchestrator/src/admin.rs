//! Cluster registry and transaction control

use hmc_errors::{Error, OrchestratorError};
use hmc_events::{ClusterEvent, EventEmitter};
use hmc_types::{Cluster, Host, TransactionStatus, TransactionView, TxnId};
use std::collections::HashSet;
use std::time::Duration;

use crate::context::Hmc;

impl Hmc {
    /// Register a cluster, or replace the host set of an idle one
    ///
    /// # Errors
    ///
    /// Returns `InvalidCluster` for an empty name, an empty host name or a
    /// host listed twice; `Conflict` if the cluster has an active
    /// transaction.
    pub async fn register_cluster(&self, name: &str, hosts: Vec<Host>) -> Result<Cluster, Error> {
        validate_cluster(name, &hosts)?;

        let cluster = self.state.register_cluster(name, &hosts).await?;
        self.emit_cluster(ClusterEvent::Registered {
            cluster: cluster.name.clone(),
            hosts: cluster.hosts.len(),
        });
        Ok(cluster)
    }

    /// # Errors
    ///
    /// Returns `ClusterNotFound` for an unknown cluster.
    pub async fn get_cluster(&self, name: &str) -> Result<Cluster, Error> {
        self.require_cluster(name).await
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn list_clusters(&self) -> Result<Vec<Cluster>, Error> {
        self.state.list_clusters().await
    }

    /// Snapshot of a transaction's progress
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotFound` for an unknown id.
    pub async fn poll(&self, id: TxnId) -> Result<TransactionView, Error> {
        self.manager.get_status(id).await
    }

    /// Most recent transactions first, optionally for one cluster
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn list_transactions(
        &self,
        cluster: Option<&str>,
        limit: u32,
    ) -> Result<Vec<TransactionView>, Error> {
        let transactions = self.state.list_transactions(cluster, limit).await?;
        Ok(transactions.iter().map(TransactionView::from).collect())
    }

    /// # Errors
    ///
    /// Returns `TransactionNotFound`, or `InvalidTransition` once the
    /// transaction is terminal.
    pub async fn cancel(&self, id: TxnId) -> Result<TransactionStatus, Error> {
        self.manager.cancel(id).await
    }

    /// Re-run the hosts of a finished transaction that did not succeed
    ///
    /// # Errors
    ///
    /// Returns `NotAllowed` unless the transaction ended FAILED,
    /// PARTIAL_FAILURE or CANCELLED, or `Conflict` if the cluster is busy.
    pub async fn retry(&self, id: TxnId) -> Result<TxnId, Error> {
        self.manager.retry(id).await
    }

    /// Pick up transactions left unfinished by a previous process
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn resume(&self) -> Result<Vec<TxnId>, Error> {
        self.manager.resume_incomplete().await
    }

    /// Delete terminal transactions older than `[state] retention_days`
    ///
    /// # Errors
    ///
    /// Returns an error if the store update fails.
    pub async fn prune(&self) -> Result<u64, Error> {
        self.manager.prune(self.config.state.retention_days).await
    }

    /// # Errors
    ///
    /// Returns `TransactionNotFound` for an unknown id.
    pub async fn wait_for_terminal(
        &self,
        id: TxnId,
        timeout: Duration,
    ) -> Result<TransactionView, Error> {
        self.manager.wait_for_terminal(id, timeout).await
    }

    /// Stop driving transactions in this process; they resume on next start
    pub fn shutdown(&self) {
        self.manager.shutdown();
    }
}

fn validate_cluster(name: &str, hosts: &[Host]) -> Result<(), OrchestratorError> {
    let invalid = |message: String| OrchestratorError::InvalidCluster { message };

    if name.trim().is_empty() {
        return Err(invalid("cluster name is empty".to_string()));
    }

    let mut seen = HashSet::new();
    for host in hosts {
        if host.name.trim().is_empty() {
            return Err(invalid("host name is empty".to_string()));
        }
        if !seen.insert(host.name.as_str()) {
            return Err(invalid(format!("host {} listed more than once", host.name)));
        }
    }
    Ok(())
}
