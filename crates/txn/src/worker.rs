//! Background execution of a transaction's host tasks

use hmc_dispatch::{calculate_backoff_delay, DispatchOutcome};
use hmc_errors::{Error, UserFacingError};
use hmc_events::{EventEmitter, HostTaskEvent, TransactionEvent};
use hmc_types::{HostAction, HostTask, HostTaskStatus, TransactionStatus, TxnId};
use std::future::Future;
use tokio::task::JoinSet;

use crate::manager::TransactionManager;
use crate::{INTERRUPTED_DURING_CANCELLATION, STORE_UNAVAILABLE};

impl TransactionManager {
    /// Drive a transaction until every host task is resolved
    pub(crate) async fn run(self, id: TxnId) {
        let Err(err) = self.drive(id).await else {
            return;
        };
        self.emit_error_with_details(
            format!("transaction {id} stopped before completion"),
            err.to_string(),
        );

        // Resolve what is left so the cluster is not held by a stalled run
        let reason = format!("{STORE_UNAVAILABLE}: {err}");
        match self
            .persist(|| self.state.abandon_transaction(id, &reason))
            .await
        {
            Ok(Some(status)) => self.emit_completed(id, status).await,
            Ok(None) => {}
            Err(err) => self.emit_error_with_details(
                format!("transaction {id} could not be failed; `hmc resume` will pick it up"),
                err.to_string(),
            ),
        }
    }

    async fn drive(&self, id: TxnId) -> Result<(), Error> {
        if self.persist(|| self.state.mark_in_progress(id)).await? {
            self.emit_transaction(TransactionEvent::Started { txn_id: id });
        }

        let txn = self.persist(|| self.state.get_transaction(id)).await?;
        match txn.status {
            TransactionStatus::InProgress => {}
            TransactionStatus::Cancelling => {
                // Only reachable on resume: whatever was in flight died with
                // the previous process
                if let Some(status) = self
                    .persist(|| {
                        self.state
                            .fail_in_flight(id, INTERRUPTED_DURING_CANCELLATION)
                    })
                    .await?
                {
                    self.emit_completed(id, status).await;
                }
                return Ok(());
            }
            _ => return Ok(()),
        }

        let mut tasks = JoinSet::new();
        for task in txn.tasks {
            if task.status.is_terminal() {
                continue;
            }
            let manager = self.clone();
            tasks.spawn(async move {
                let host = task.host.clone();
                match manager.drive_host(id, task).await {
                    Ok(done) => Ok(done),
                    Err(err) => manager.abandon_host(id, &host, &err).await,
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(Some(status))) => self.emit_completed(id, status).await,
                Ok(Ok(None)) => {}
                Ok(Err(err)) => self.emit_error_with_details(
                    format!("host task of transaction {id} could not be recorded"),
                    err.to_string(),
                ),
                Err(join_err) => self.emit_error_with_details(
                    format!("host worker of transaction {id} aborted"),
                    join_err.to_string(),
                ),
            }
        }
        Ok(())
    }

    /// Run one host's remaining plan steps.
    ///
    /// Returns the transaction's terminal status if this task was the last
    /// one to resolve.
    async fn drive_host(
        &self,
        id: TxnId,
        task: HostTask,
    ) -> Result<Option<TransactionStatus>, Error> {
        let _permit = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::internal(format!("worker pool closed: {e}")))?;

        let host = task.host.as_str();
        let steps = task.remaining_steps();
        let (mut attempt, mut step_attempts) = match task.status {
            HostTaskStatus::Queued => {
                match self.persist(|| self.state.claim_host_task(id, host)).await? {
                    Some(total) => (total, 1),
                    // Cancelled (or claimed elsewhere) before we got to it
                    None => return Ok(None),
                }
            }
            HostTaskStatus::Dispatched => {
                // Dispatched before a restart
                let Some(action) = steps.first() else {
                    return self
                        .finish(id, host, HostTaskStatus::Succeeded, None, task.attempts)
                        .await;
                };
                // The interrupted calls count against the step's retry budget
                if task.step_attempts > self.retry.max_retries {
                    let detail = self.timed_out_detail(action, task.step_attempts);
                    return self
                        .finish(id, host, HostTaskStatus::TimedOut, Some(detail), task.attempts)
                        .await;
                }
                // Actions are idempotent so send again
                match self.persist(|| self.state.record_attempt(id, host)).await? {
                    Some(total) => (total, task.step_attempts + 1),
                    None => {
                        let reason = format!("cancelled before {}", action.kind);
                        return self
                            .finish(id, host, HostTaskStatus::Cancelled, Some(reason), task.attempts)
                            .await;
                    }
                }
            }
            _ => return Ok(None),
        };

        for (index, action) in steps.iter().enumerate() {
            if index > 0 {
                match self.persist(|| self.state.record_attempt(id, host)).await? {
                    Some(total) => {
                        attempt = total;
                        step_attempts = 1;
                    }
                    None => {
                        let reason = format!("cancelled before {}", action.kind);
                        return self
                            .finish(id, host, HostTaskStatus::Cancelled, Some(reason), attempt)
                            .await;
                    }
                }
            }

            match self
                .run_step(id, host, action, &mut attempt, step_attempts)
                .await?
            {
                StepResult::Done => {
                    self.persist(|| self.state.advance_step(id, host)).await?;
                    self.emit_host_task(HostTaskEvent::StepCompleted {
                        txn_id: id,
                        host: host.to_string(),
                        action: action.kind,
                    });
                }
                StepResult::Resolved(status, detail) => {
                    return self.finish(id, host, status, Some(detail), attempt).await;
                }
            }
        }

        self.finish(id, host, HostTaskStatus::Succeeded, None, attempt)
            .await
    }

    /// Dispatch one step, retrying timeouts with backoff.
    ///
    /// `step_attempts` counts the agent calls already charged to this step,
    /// including the one about to be made.
    async fn run_step(
        &self,
        id: TxnId,
        host: &str,
        action: &HostAction,
        attempt: &mut u32,
        mut step_attempts: u32,
    ) -> Result<StepResult, Error> {
        loop {
            self.emit_host_task(HostTaskEvent::Dispatched {
                txn_id: id,
                host: host.to_string(),
                action: action.kind,
                attempt: *attempt,
            });

            match self.dispatcher.dispatch(host, action).await {
                DispatchOutcome::Succeeded => return Ok(StepResult::Done),
                DispatchOutcome::Failed { detail } => {
                    return Ok(StepResult::Resolved(HostTaskStatus::Failed, detail));
                }
                DispatchOutcome::TimedOut if step_attempts > self.retry.max_retries => {
                    return Ok(StepResult::Resolved(
                        HostTaskStatus::TimedOut,
                        self.timed_out_detail(action, step_attempts),
                    ));
                }
                DispatchOutcome::TimedOut => {
                    let delay = calculate_backoff_delay(&self.retry, step_attempts);
                    self.emit_host_task(HostTaskEvent::RetryScheduled {
                        txn_id: id,
                        host: host.to_string(),
                        attempt: *attempt,
                        delay,
                    });
                    tokio::time::sleep(delay).await;

                    match self.persist(|| self.state.record_attempt(id, host)).await? {
                        Some(next) => {
                            *attempt = next;
                            step_attempts += 1;
                        }
                        None => {
                            return Ok(StepResult::Resolved(
                                HostTaskStatus::Cancelled,
                                format!(
                                    "{} timed out; retry abandoned after cancellation",
                                    action.kind
                                ),
                            ));
                        }
                    }
                }
            }
        }
    }

    fn timed_out_detail(&self, action: &HostAction, calls: u32) -> String {
        format!(
            "{} timed out after {} attempt(s) of {}s",
            action.kind,
            calls,
            self.dispatcher.timeout().as_secs()
        )
    }

    async fn finish(
        &self,
        id: TxnId,
        host: &str,
        status: HostTaskStatus,
        detail: Option<String>,
        attempts: u32,
    ) -> Result<Option<TransactionStatus>, Error> {
        let event = match status {
            HostTaskStatus::Succeeded => HostTaskEvent::Succeeded {
                txn_id: id,
                host: host.to_string(),
            },
            HostTaskStatus::TimedOut => HostTaskEvent::TimedOut {
                txn_id: id,
                host: host.to_string(),
                attempts,
            },
            HostTaskStatus::Cancelled => HostTaskEvent::Cancelled {
                txn_id: id,
                host: host.to_string(),
                reason: detail.clone().unwrap_or_default(),
            },
            _ => HostTaskEvent::Failed {
                txn_id: id,
                host: host.to_string(),
                error: detail.clone().unwrap_or_default(),
            },
        };
        self.emit_host_task(event);

        self.persist(|| {
            self.state
                .complete_host_task(id, host, status, detail.as_deref())
        })
        .await
    }

    /// Fail a host task whose progress could not be recorded, so the
    /// transaction still reaches a terminal status and frees its cluster
    async fn abandon_host(
        &self,
        id: TxnId,
        host: &str,
        err: &Error,
    ) -> Result<Option<TransactionStatus>, Error> {
        let reason = format!("{STORE_UNAVAILABLE}: {err}");
        self.emit_host_task(HostTaskEvent::Failed {
            txn_id: id,
            host: host.to_string(),
            error: reason.clone(),
        });
        self.persist(|| self.state.abandon_host_task(id, host, &reason))
            .await
    }

    /// Run a store operation, retrying retryable failures with the
    /// dispatch backoff policy
    async fn persist<T, F, Fut>(&self, mut op: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut retries = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && retries < self.retry.max_retries => {
                    retries += 1;
                    let delay = calculate_backoff_delay(&self.retry, retries);
                    self.emit_warning(format!(
                        "store update failed, retry {retries} in {delay:?}: {err}"
                    ));
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

enum StepResult {
    Done,
    Resolved(HostTaskStatus, String),
}
