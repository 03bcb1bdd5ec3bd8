//! Accepting lifecycle requests

use hmc_errors::{Error, OrchestratorError, StateError};
use hmc_events::{EventEmitter, TransactionEvent};
use hmc_types::{AcceptResponse, Cluster, LifecycleOptions, OpKind, TxnId};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::context::Hmc;
use crate::plan::build_draft;

impl Hmc {
    /// Accept a loosely-typed lifecycle request as received from a handler.
    ///
    /// Checks run in order: cluster exists, operation is supported, options
    /// are valid for the operation. On success the transaction is durably
    /// PENDING before this returns; host work continues in the background.
    pub async fn request_lifecycle_op(
        &self,
        cluster: &str,
        op: &str,
        options: &BTreeMap<String, Value>,
    ) -> AcceptResponse {
        let result = self.accept(cluster, op, options).await;
        self.respond(cluster, result)
    }

    /// Uninstall a cluster's software, and its data too when `wipeout` is set
    pub async fn uninstall(&self, cluster: &str, wipeout: bool) -> AcceptResponse {
        let result = self
            .submit(cluster, OpKind::Uninstall, LifecycleOptions::wipeout(wipeout))
            .await;
        self.respond(cluster, result)
    }

    pub async fn install(&self, cluster: &str) -> AcceptResponse {
        let result = self
            .submit(cluster, OpKind::Install, LifecycleOptions::default())
            .await;
        self.respond(cluster, result)
    }

    pub async fn upgrade(&self, cluster: &str) -> AcceptResponse {
        let result = self
            .submit(cluster, OpKind::Upgrade, LifecycleOptions::default())
            .await;
        self.respond(cluster, result)
    }

    pub async fn reconfigure(&self, cluster: &str) -> AcceptResponse {
        let result = self
            .submit(cluster, OpKind::Reconfigure, LifecycleOptions::default())
            .await;
        self.respond(cluster, result)
    }

    /// Typed accept path.
    ///
    /// Returns `None` when the cluster resolves to no host work (NO_OP).
    ///
    /// # Errors
    ///
    /// Returns `ClusterNotFound`, `Conflict`, or a storage error. No
    /// transaction exists on error.
    pub async fn submit(
        &self,
        cluster: &str,
        op: OpKind,
        options: LifecycleOptions,
    ) -> Result<Option<TxnId>, Error> {
        let cluster = self.require_cluster(cluster).await?;
        self.start_op(&cluster, op, options).await
    }

    async fn accept(
        &self,
        cluster: &str,
        op: &str,
        options: &BTreeMap<String, Value>,
    ) -> Result<Option<TxnId>, Error> {
        let cluster = self.require_cluster(cluster).await?;
        let op: OpKind = op.parse()?;
        let options = LifecycleOptions::from_map(op, options)?;
        self.start_op(&cluster, op, options).await
    }

    async fn start_op(
        &self,
        cluster: &Cluster,
        op: OpKind,
        options: LifecycleOptions,
    ) -> Result<Option<TxnId>, Error> {
        let draft = build_draft(self.policy.as_ref(), cluster, op, options);
        if draft.tasks.is_empty() {
            // A busy cluster still answers CONFLICT
            if let Some(active) = cluster.active_txn_id {
                return Err(StateError::Conflict {
                    cluster: cluster.name.clone(),
                    active_txn_id: active.to_string(),
                }
                .into());
            }
            self.emit_transaction(TransactionEvent::NoOp {
                cluster: cluster.name.clone(),
                op,
            });
            return Ok(None);
        }

        self.manager.start(draft).await.map(Some)
    }

    pub(crate) async fn require_cluster(&self, name: &str) -> Result<Cluster, Error> {
        self.state.get_cluster(name).await?.ok_or_else(|| {
            OrchestratorError::ClusterNotFound {
                cluster: name.to_string(),
            }
            .into()
        })
    }

    fn respond(&self, cluster: &str, result: Result<Option<TxnId>, Error>) -> AcceptResponse {
        match result {
            Ok(Some(id)) => AcceptResponse::accepted(id),
            Ok(None) => AcceptResponse::no_op(),
            Err(err) => {
                self.emit_warning(format!(
                    "lifecycle request for cluster {cluster} rejected ({}): {err}",
                    err.code().as_str()
                ));
                AcceptResponse::from_error(&err)
            }
        }
    }
}
