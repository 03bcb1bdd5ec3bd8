//! Transaction manager: start, observe, cancel, retry and resume

use dashmap::DashMap;
use hmc_config::Config;
use hmc_dispatch::{Agent, Dispatcher, RetryPolicy};
use hmc_errors::{Error, OrchestratorError};
use hmc_events::{ClusterEvent, EventEmitter, EventSender, TransactionEvent};
use hmc_state::StateManager;
use hmc_types::{
    HostTaskDraft, HostTaskStatus, LifecycleOptions, TransactionDraft, TransactionStatus,
    TransactionView, TxnId,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Creates transactions and drives them to a terminal status
#[derive(Clone)]
pub struct TransactionManager {
    pub(crate) state: StateManager,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) retry: RetryPolicy,
    /// Bounds concurrent host dispatches across all transactions
    pub(crate) workers: Arc<Semaphore>,
    running: Arc<DashMap<TxnId, AbortHandle>>,
    pub(crate) tx: Option<EventSender>,
}

impl EventEmitter for TransactionManager {
    fn event_sender(&self) -> Option<&EventSender> {
        self.tx.as_ref()
    }
}

impl TransactionManager {
    #[must_use]
    pub fn new(
        state: StateManager,
        dispatcher: Dispatcher,
        retry: RetryPolicy,
        max_concurrent_hosts: usize,
    ) -> Self {
        Self {
            state,
            dispatcher,
            retry,
            workers: Arc::new(Semaphore::new(max_concurrent_hosts.max(1))),
            running: Arc::new(DashMap::new()),
            tx: None,
        }
    }

    /// Build a manager from the `[dispatch]` and `[workers]` configuration
    #[must_use]
    pub fn from_config(state: StateManager, agent: Arc<dyn Agent>, config: &Config) -> Self {
        let dispatcher = Dispatcher::new(agent, config.dispatch.timeout());
        Self::new(
            state,
            dispatcher,
            RetryPolicy::from(&config.dispatch),
            config.worker_count(),
        )
    }

    #[must_use]
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.tx = Some(tx);
        self
    }

    #[must_use]
    pub fn state(&self) -> &StateManager {
        &self.state
    }

    /// Persist a new transaction and start driving it in the background.
    ///
    /// Returns once the transaction is durably PENDING; host work has not
    /// necessarily begun.
    ///
    /// # Errors
    ///
    /// Returns `ClusterNotFound`, `Conflict` or a storage error from the
    /// store. Nothing runs on error.
    pub async fn start(&self, draft: TransactionDraft) -> Result<TxnId, Error> {
        if draft.tasks.is_empty() {
            return Err(Error::internal("refusing to start a transaction without host tasks"));
        }

        let id = self.state.create_transaction(&draft).await?;
        self.emit_transaction(TransactionEvent::Accepted {
            txn_id: id,
            cluster: draft.cluster.clone(),
            op: draft.op,
            wipeout: draft.options.wipeout,
            hosts: draft.tasks.len(),
        });

        self.spawn_run(id);
        Ok(id)
    }

    /// Read-only snapshot of a transaction; never waits on in-flight work
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotFound` for an unknown id.
    pub async fn get_status(&self, id: TxnId) -> Result<TransactionView, Error> {
        let txn = self.state.get_transaction(id).await?;
        Ok(TransactionView::from(&txn))
    }

    /// Request cancellation. Queued tasks are cancelled at once; dispatches
    /// already in flight run to completion but are not retried.
    ///
    /// Returns the status after the request.
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotFound`, or `InvalidTransition` if the
    /// transaction already finished.
    pub async fn cancel(&self, id: TxnId) -> Result<TransactionStatus, Error> {
        let status = self.state.request_cancel(id).await?;
        self.emit_transaction(TransactionEvent::CancelRequested { txn_id: id });
        if status.is_terminal() {
            self.emit_completed(id, status).await;
        }
        Ok(status)
    }

    /// Create a follow-up transaction over the hosts of `id` that did not
    /// succeed, using the same action plans.
    ///
    /// # Errors
    ///
    /// Returns `NotAllowed` unless `id` ended FAILED, PARTIAL_FAILURE or
    /// CANCELLED, plus any error from [`Self::start`].
    pub async fn retry(&self, id: TxnId) -> Result<TxnId, Error> {
        let txn = self.state.get_transaction(id).await?;
        if !matches!(
            txn.status,
            TransactionStatus::Failed
                | TransactionStatus::PartialFailure
                | TransactionStatus::Cancelled
        ) {
            return Err(OrchestratorError::NotAllowed {
                txn_id: id.to_string(),
                action: "retried".to_string(),
                status: txn.status.to_string(),
            }
            .into());
        }

        let tasks: Vec<HostTaskDraft> = txn
            .tasks
            .iter()
            .filter(|task| task.status != HostTaskStatus::Succeeded)
            .map(|task| HostTaskDraft {
                host: task.host.clone(),
                plan: task.plan.clone(),
            })
            .collect();
        let hosts = tasks.len();

        let draft = TransactionDraft {
            cluster: txn.cluster.clone(),
            op: txn.op,
            options: LifecycleOptions::wipeout(txn.wipeout),
            retry_of: Some(id),
            tasks,
        };
        let new_id = self.start(draft).await?;
        self.emit_transaction(TransactionEvent::RetryCreated {
            txn_id: new_id,
            retry_of: id,
            hosts,
        });
        Ok(new_id)
    }

    /// Re-drive every non-terminal transaction in the store that is not
    /// already running in this process. Used at startup after a crash.
    ///
    /// Returns the ids that were resumed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn resume_incomplete(&self) -> Result<Vec<TxnId>, Error> {
        let mut resumed = Vec::new();
        for id in self.state.non_terminal_transactions().await? {
            if self.is_running(id) {
                continue;
            }
            let view = self.get_status(id).await?;
            self.emit_transaction(TransactionEvent::Resumed {
                txn_id: id,
                unresolved: view.host_tasks.len() - view.resolved(),
            });
            self.spawn_run(id);
            resumed.push(id);
        }
        Ok(resumed)
    }

    /// Poll the store until the transaction is terminal or `timeout`
    /// elapses, returning the last snapshot either way.
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotFound` for an unknown id.
    pub async fn wait_for_terminal(
        &self,
        id: TxnId,
        timeout: Duration,
    ) -> Result<TransactionView, Error> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let view = self.get_status(id).await?;
            if view.status.is_terminal() || tokio::time::Instant::now() >= deadline {
                return Ok(view);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Delete terminal transactions older than `retention_days`
    ///
    /// # Errors
    ///
    /// Returns an error if the store update fails.
    pub async fn prune(&self, retention_days: u32) -> Result<u64, Error> {
        let removed = self.state.prune(retention_days).await?;
        if removed > 0 {
            self.emit_transaction(TransactionEvent::Pruned { removed });
        }
        Ok(removed)
    }

    /// Whether a background run for `id` is live in this process
    #[must_use]
    pub fn is_running(&self, id: TxnId) -> bool {
        self.running
            .get(&id)
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Abort every background run. Their transactions stay non-terminal in
    /// the store and are picked up by [`Self::resume_incomplete`].
    pub fn shutdown(&self) {
        for entry in self.running.iter() {
            entry.value().abort();
        }
        self.running.clear();
    }

    fn spawn_run(&self, id: TxnId) {
        self.running.retain(|_, handle| !handle.is_finished());

        let manager = self.clone();
        let handle = tokio::spawn(async move { manager.run(id).await });
        self.running.insert(id, handle.abort_handle());
    }

    pub(crate) async fn emit_completed(&self, id: TxnId, status: TransactionStatus) {
        let txn = self.state.get_transaction(id).await.ok();
        let duration = txn.as_ref().map_or(Duration::ZERO, |txn| {
            let end = txn.completed_at.unwrap_or_else(chrono::Utc::now);
            (end - txn.created_at).to_std().unwrap_or_default()
        });
        self.emit_transaction(TransactionEvent::Completed {
            txn_id: id,
            status,
            duration,
        });

        // Successful operations move the cluster to a new lifecycle state
        if status == TransactionStatus::Success {
            if let Some(txn) = txn {
                if let Ok(Some(cluster)) = self.state.get_cluster(&txn.cluster).await {
                    self.emit_cluster(ClusterEvent::StateChanged {
                        cluster: cluster.name,
                        state: cluster.state,
                    });
                }
            }
        }
    }
}
