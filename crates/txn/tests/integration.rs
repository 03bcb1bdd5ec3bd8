//! Integration tests for the transaction manager

use async_trait::async_trait;
use hmc_dispatch::{Agent, AgentReport, Dispatcher, RetryPolicy};
use hmc_errors::{Error, OrchestratorError, StateError};
use hmc_events::{AppEvent, TransactionEvent};
use hmc_state::StateManager;
use hmc_txn::{TransactionManager, INTERRUPTED_DURING_CANCELLATION, STORE_UNAVAILABLE};
use hmc_types::{
    ActionKind, Host, HostAction, HostTaskStatus, LifecycleOptions, OpKind, TransactionDraft,
    TransactionStatus, TransactionView, TxnId,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;

const WAIT: Duration = Duration::from_secs(10);

#[derive(Clone, Copy)]
enum Behavior {
    Succeed,
    Fail,
    Hang,
    /// Hang for the first `n` calls, then succeed
    HangTimes(usize),
}

/// Agent whose per-host behaviour is scripted; records every call
#[derive(Default)]
struct ScriptedAgent {
    behavior: Mutex<HashMap<String, Behavior>>,
    calls: Mutex<Vec<(String, ActionKind)>>,
}

impl ScriptedAgent {
    fn with(behaviors: &[(&str, Behavior)]) -> Arc<Self> {
        let agent = Self::default();
        for (host, b) in behaviors {
            agent.set(host, *b);
        }
        Arc::new(agent)
    }

    fn set(&self, host: &str, behavior: Behavior) {
        self.behavior
            .lock()
            .unwrap()
            .insert(host.to_string(), behavior);
    }

    fn calls_for(&self, host: &str) -> Vec<ActionKind> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(h, _)| h == host)
            .map(|(_, a)| *a)
            .collect()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn invoke(&self, host: &str, action: &HostAction) -> Result<AgentReport, Error> {
        let previous = {
            let mut calls = self.calls.lock().unwrap();
            let previous = calls.iter().filter(|(h, _)| h == host).count();
            calls.push((host.to_string(), action.kind));
            previous
        };
        let behavior = self
            .behavior
            .lock()
            .unwrap()
            .get(host)
            .copied()
            .unwrap_or(Behavior::Succeed);

        match behavior {
            Behavior::Succeed => Ok(AgentReport::success()),
            Behavior::Fail => Ok(AgentReport::failure(format!("{} failed on {host}", action.kind))),
            Behavior::HangTimes(n) if previous >= n => Ok(AgentReport::success()),
            Behavior::Hang | Behavior::HangTimes(_) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(AgentReport::success())
            }
        }
    }
}

/// Agent that blocks every call until the test opens the gate
struct GatedAgent {
    gate: Semaphore,
    entered: AtomicBool,
}

#[async_trait]
impl Agent for GatedAgent {
    async fn invoke(&self, _host: &str, _action: &HostAction) -> Result<AgentReport, Error> {
        self.entered.store(true, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| Error::internal(e.to_string()))?;
        permit.forget();
        Ok(AgentReport::success())
    }
}

struct Harness {
    _dir: TempDir,
    state: StateManager,
}

impl Harness {
    async fn new(cluster: &str, hosts: usize) -> Self {
        let dir = TempDir::new().unwrap();
        let state = StateManager::new(&dir.path().join("state.sqlite"))
            .await
            .unwrap();
        let hosts: Vec<Host> = (1..=hosts)
            .map(|i| Host::new(format!("h{i}"), ["DATANODE"]))
            .collect();
        state.register_cluster(cluster, &hosts).await.unwrap();
        Self { _dir: dir, state }
    }

    fn manager(&self, agent: Arc<dyn Agent>, workers: usize) -> TransactionManager {
        self.manager_with_timeout(agent, workers, Duration::from_millis(100))
    }

    /// Gated calls must outlive the test's cancel request, not time out first
    fn manager_with_timeout(
        &self,
        agent: Arc<dyn Agent>,
        workers: usize,
        timeout: Duration,
    ) -> TransactionManager {
        TransactionManager::new(
            self.state.clone(),
            Dispatcher::new(agent, timeout),
            RetryPolicy::immediate(2),
            workers,
        )
    }
}

fn draft(cluster: &str, op: OpKind, hosts: usize, plan: &[ActionKind]) -> TransactionDraft {
    (1..=hosts).fold(
        TransactionDraft::new(cluster, op, LifecycleOptions::default()),
        |d, i| {
            d.with_task(
                format!("h{i}"),
                plan.iter()
                    .map(|k| HostAction::new(*k, vec!["DATANODE".to_string()]))
                    .collect(),
            )
        },
    )
}

fn task_status(view: &TransactionView, host: &str) -> HostTaskStatus {
    view.host_tasks
        .iter()
        .find(|t| t.host == host)
        .map(|t| t.status)
        .unwrap()
}

#[tokio::test]
async fn test_three_hosts_all_succeed() {
    let h = Harness::new("c1", 3).await;
    let manager = h.manager(ScriptedAgent::with(&[]), 8);

    let id = manager
        .start(draft("c1", OpKind::Install, 3, &[ActionKind::Install]))
        .await
        .unwrap();
    // Immediately pollable
    manager.get_status(id).await.unwrap();

    let view = manager.wait_for_terminal(id, WAIT).await.unwrap();
    assert_eq!(view.status, TransactionStatus::Success);
    assert_eq!(view.host_tasks.len(), 3);
    for task in &view.host_tasks {
        assert_eq!(task.status, HostTaskStatus::Succeeded);
        assert_eq!(task.attempts, 1);
    }
    assert!(view.completed_at.is_some());
}

#[tokio::test]
async fn test_one_failing_host_is_partial_failure() {
    let h = Harness::new("c1", 3).await;
    let manager = h.manager(ScriptedAgent::with(&[("h2", Behavior::Fail)]), 8);

    let id = manager
        .start(draft("c1", OpKind::Uninstall, 3, &[ActionKind::Uninstall]))
        .await
        .unwrap();
    let view = manager.wait_for_terminal(id, WAIT).await.unwrap();

    assert_eq!(view.status, TransactionStatus::PartialFailure);
    assert_eq!(task_status(&view, "h1"), HostTaskStatus::Succeeded);
    assert_eq!(task_status(&view, "h2"), HostTaskStatus::Failed);
    assert_eq!(task_status(&view, "h3"), HostTaskStatus::Succeeded);
    let failed = view.host_tasks.iter().find(|t| t.host == "h2").unwrap();
    assert_eq!(failed.error.as_deref(), Some("uninstall failed on h2"));
}

#[tokio::test]
async fn test_all_failing_hosts_is_failed() {
    let h = Harness::new("c1", 2).await;
    let manager = h.manager(
        ScriptedAgent::with(&[("h1", Behavior::Fail), ("h2", Behavior::Fail)]),
        8,
    );
    let id = manager
        .start(draft("c1", OpKind::Upgrade, 2, &[ActionKind::Upgrade]))
        .await
        .unwrap();
    let view = manager.wait_for_terminal(id, WAIT).await.unwrap();
    assert_eq!(view.status, TransactionStatus::Failed);
}

#[tokio::test]
async fn test_timeouts_are_retried_a_bounded_number_of_times() {
    let h = Harness::new("c1", 1).await;
    let agent = ScriptedAgent::with(&[("h1", Behavior::Hang)]);
    let manager = h.manager(agent.clone(), 8);

    let id = manager
        .start(draft("c1", OpKind::Install, 1, &[ActionKind::Install]))
        .await
        .unwrap();
    let view = manager.wait_for_terminal(id, WAIT).await.unwrap();

    assert_eq!(view.status, TransactionStatus::Failed);
    assert_eq!(task_status(&view, "h1"), HostTaskStatus::TimedOut);
    // First attempt plus two retries
    assert_eq!(view.host_tasks[0].attempts, 3);
    assert_eq!(agent.calls_for("h1").len(), 3);

    // Terminal status does not change afterwards
    tokio::time::sleep(Duration::from_millis(300)).await;
    let again = manager.get_status(id).await.unwrap();
    assert_eq!(again.status, TransactionStatus::Failed);
}

#[tokio::test]
async fn test_timeout_then_success_recovers() {
    let h = Harness::new("c1", 1).await;
    let manager = h.manager(ScriptedAgent::with(&[("h1", Behavior::HangTimes(2))]), 8);

    let id = manager
        .start(draft("c1", OpKind::Install, 1, &[ActionKind::Install]))
        .await
        .unwrap();
    let view = manager.wait_for_terminal(id, WAIT).await.unwrap();

    assert_eq!(view.status, TransactionStatus::Success);
    assert_eq!(view.host_tasks[0].attempts, 3);
}

#[tokio::test]
async fn test_plan_steps_run_in_order() {
    let h = Harness::new("c1", 2).await;
    let agent = ScriptedAgent::with(&[]);
    let manager = h.manager(agent.clone(), 8);

    let id = manager
        .start(draft(
            "c1",
            OpKind::Uninstall,
            2,
            &[ActionKind::Uninstall, ActionKind::PurgeData],
        ))
        .await
        .unwrap();
    let view = manager.wait_for_terminal(id, WAIT).await.unwrap();

    assert_eq!(view.status, TransactionStatus::Success);
    assert_eq!(
        agent.calls_for("h1"),
        vec![ActionKind::Uninstall, ActionKind::PurgeData]
    );
    let txn = h.state.get_transaction(id).await.unwrap();
    assert!(txn.tasks.iter().all(|t| t.steps_completed == 2));
}

#[tokio::test]
async fn test_cancel_stops_new_dispatches() {
    let h = Harness::new("c1", 3).await;
    let agent = Arc::new(GatedAgent {
        gate: Semaphore::new(0),
        entered: AtomicBool::new(false),
    });
    // One worker: a single host is in flight, the others wait in the queue
    let manager = h.manager_with_timeout(agent.clone(), 1, WAIT);

    let id = manager
        .start(draft("c1", OpKind::Install, 3, &[ActionKind::Install]))
        .await
        .unwrap();

    wait_until_dispatched(&agent).await;

    let status = manager.cancel(id).await.unwrap();
    assert_eq!(status, TransactionStatus::Cancelling);

    agent.gate.add_permits(3);
    let view = manager.wait_for_terminal(id, WAIT).await.unwrap();

    assert_eq!(view.status, TransactionStatus::Cancelled);
    let succeeded = view
        .host_tasks
        .iter()
        .filter(|t| t.status == HostTaskStatus::Succeeded)
        .count();
    let cancelled = view
        .host_tasks
        .iter()
        .filter(|t| t.status == HostTaskStatus::Cancelled)
        .count();
    assert_eq!((succeeded, cancelled), (1, 2));
    assert_eq!(h.state.active_transaction("c1").await.unwrap(), None);
}

async fn wait_until_dispatched(agent: &GatedAgent) {
    let mut waited = Duration::ZERO;
    while !agent.entered.load(Ordering::SeqCst) {
        assert!(waited < WAIT, "no host was dispatched");
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += Duration::from_millis(10);
    }
}

#[tokio::test]
async fn test_cancel_between_plan_steps_ends_cancelled() {
    let h = Harness::new("c1", 1).await;
    let agent = Arc::new(GatedAgent {
        gate: Semaphore::new(0),
        entered: AtomicBool::new(false),
    });
    let manager = h.manager_with_timeout(agent.clone(), 1, WAIT);

    let id = manager
        .start(draft(
            "c1",
            OpKind::Uninstall,
            1,
            &[ActionKind::Uninstall, ActionKind::PurgeData],
        ))
        .await
        .unwrap();
    wait_until_dispatched(&agent).await;

    // The uninstall call is in flight; purge must not follow it
    assert_eq!(
        manager.cancel(id).await.unwrap(),
        TransactionStatus::Cancelling
    );
    agent.gate.add_permits(2);
    let view = manager.wait_for_terminal(id, WAIT).await.unwrap();

    assert_eq!(view.status, TransactionStatus::Cancelled);
    assert_eq!(view.host_tasks[0].status, HostTaskStatus::Cancelled);
    assert_eq!(
        view.host_tasks[0].error.as_deref(),
        Some("cancelled before purge_data")
    );
    let txn = h.state.get_transaction(id).await.unwrap();
    assert_eq!(txn.tasks[0].steps_completed, 1);
    assert_eq!(h.state.active_transaction("c1").await.unwrap(), None);
}

#[tokio::test]
async fn test_resume_does_not_reset_spent_retry_budget() {
    let h = Harness::new("c1", 1).await;
    let id = h
        .state
        .create_transaction(&draft("c1", OpKind::Install, 1, &[ActionKind::Install]))
        .await
        .unwrap();
    h.state.mark_in_progress(id).await.unwrap();
    // First call plus both retries were made before the crash
    h.state.claim_host_task(id, "h1").await.unwrap();
    h.state.record_attempt(id, "h1").await.unwrap();
    assert_eq!(h.state.record_attempt(id, "h1").await.unwrap(), Some(3));

    let agent = ScriptedAgent::with(&[("h1", Behavior::Hang)]);
    let manager = h.manager(agent.clone(), 8);
    manager.resume_incomplete().await.unwrap();
    let view = manager.wait_for_terminal(id, WAIT).await.unwrap();

    assert_eq!(view.status, TransactionStatus::Failed);
    assert_eq!(task_status(&view, "h1"), HostTaskStatus::TimedOut);
    assert_eq!(view.host_tasks[0].attempts, 3);
    assert!(agent.calls_for("h1").is_empty());
}

#[tokio::test]
async fn test_resume_uses_only_the_remaining_retry_budget() {
    let h = Harness::new("c1", 1).await;
    let id = h
        .state
        .create_transaction(&draft("c1", OpKind::Install, 1, &[ActionKind::Install]))
        .await
        .unwrap();
    h.state.mark_in_progress(id).await.unwrap();
    h.state.claim_host_task(id, "h1").await.unwrap();
    h.state.record_attempt(id, "h1").await.unwrap();

    let agent = ScriptedAgent::with(&[("h1", Behavior::Hang)]);
    let manager = h.manager(agent.clone(), 8);
    manager.resume_incomplete().await.unwrap();
    let view = manager.wait_for_terminal(id, WAIT).await.unwrap();

    assert_eq!(task_status(&view, "h1"), HostTaskStatus::TimedOut);
    assert_eq!(view.host_tasks[0].attempts, 3);
    assert_eq!(agent.calls_for("h1").len(), 1);
}

#[tokio::test]
async fn test_store_failure_fails_task_and_releases_cluster() {
    let h = Harness::new("c1", 1).await;
    // Step progress can no longer be written; everything else still can
    sqlx::query(
        "CREATE TRIGGER refuse_step_progress BEFORE UPDATE OF steps_completed ON host_tasks
         BEGIN SELECT RAISE(ABORT, 'disk full'); END",
    )
    .execute(h.state.pool())
    .await
    .unwrap();

    let agent = ScriptedAgent::with(&[]);
    let manager = h.manager(agent.clone(), 8);
    let id = manager
        .start(draft(
            "c1",
            OpKind::Uninstall,
            1,
            &[ActionKind::Uninstall, ActionKind::PurgeData],
        ))
        .await
        .unwrap();
    let view = manager.wait_for_terminal(id, WAIT).await.unwrap();

    assert_eq!(view.status, TransactionStatus::Failed);
    let task = &view.host_tasks[0];
    assert_eq!(task.status, HostTaskStatus::Failed);
    let error = task.error.as_deref().unwrap();
    assert!(error.starts_with(STORE_UNAVAILABLE), "{error}");
    assert!(error.contains("disk full"), "{error}");
    assert_eq!(agent.calls_for("h1"), vec![ActionKind::Uninstall]);

    // The cluster accepts new work again
    assert_eq!(h.state.active_transaction("c1").await.unwrap(), None);
    manager
        .start(draft("c1", OpKind::Install, 1, &[ActionKind::Install]))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_retry_covers_only_unsucceeded_hosts() {
    let h = Harness::new("c1", 3).await;
    let agent = ScriptedAgent::with(&[("h3", Behavior::Fail)]);
    let manager = h.manager(agent.clone(), 8);

    let first = manager
        .start(draft("c1", OpKind::Install, 3, &[ActionKind::Install]))
        .await
        .unwrap();
    let view = manager.wait_for_terminal(first, WAIT).await.unwrap();
    assert_eq!(view.status, TransactionStatus::PartialFailure);

    agent.set("h3", Behavior::Succeed);
    let second = manager.retry(first).await.unwrap();
    let view = manager.wait_for_terminal(second, WAIT).await.unwrap();

    assert_eq!(view.status, TransactionStatus::Success);
    assert_eq!(view.retry_of, Some(first));
    assert_eq!(view.host_tasks.len(), 1);
    assert_eq!(view.host_tasks[0].host, "h3");
    assert_eq!(agent.calls_for("h1").len(), 1);
}

#[tokio::test]
async fn test_retry_of_successful_transaction_is_rejected() {
    let h = Harness::new("c1", 1).await;
    let manager = h.manager(ScriptedAgent::with(&[]), 8);
    let id = manager
        .start(draft("c1", OpKind::Install, 1, &[ActionKind::Install]))
        .await
        .unwrap();
    manager.wait_for_terminal(id, WAIT).await.unwrap();

    let err = manager.retry(id).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Orchestrator(OrchestratorError::NotAllowed { .. })
    ));
}

#[tokio::test]
async fn test_resume_completes_interrupted_transactions() {
    let h = Harness::new("c1", 2).await;

    // Simulate a crash: one host was dispatched, the other never started
    let id = h
        .state
        .create_transaction(&draft("c1", OpKind::Install, 2, &[ActionKind::Install]))
        .await
        .unwrap();
    h.state.mark_in_progress(id).await.unwrap();
    assert_eq!(h.state.claim_host_task(id, "h1").await.unwrap(), Some(1));

    let agent = ScriptedAgent::with(&[]);
    let manager = h.manager(agent.clone(), 8);
    let resumed = manager.resume_incomplete().await.unwrap();
    assert_eq!(resumed, vec![id]);

    let view = manager.wait_for_terminal(id, WAIT).await.unwrap();
    assert_eq!(view.status, TransactionStatus::Success);
    // Re-dispatch of the in-flight host counts as a second attempt
    let h1 = view.host_tasks.iter().find(|t| t.host == "h1").unwrap();
    assert_eq!(h1.attempts, 2);
    assert_eq!(agent.calls_for("h1").len(), 1);
}

#[tokio::test]
async fn test_resume_of_cancelling_transaction_fails_in_flight_tasks() {
    let h = Harness::new("c1", 2).await;
    let id = h
        .state
        .create_transaction(&draft("c1", OpKind::Install, 2, &[ActionKind::Install]))
        .await
        .unwrap();
    h.state.mark_in_progress(id).await.unwrap();
    h.state.claim_host_task(id, "h1").await.unwrap();
    assert_eq!(
        h.state.request_cancel(id).await.unwrap(),
        TransactionStatus::Cancelling
    );

    let agent = ScriptedAgent::with(&[]);
    let manager = h.manager(agent.clone(), 8);
    manager.resume_incomplete().await.unwrap();
    let view = manager.wait_for_terminal(id, WAIT).await.unwrap();

    assert_eq!(view.status, TransactionStatus::Cancelled);
    let h1 = view.host_tasks.iter().find(|t| t.host == "h1").unwrap();
    assert_eq!(h1.status, HostTaskStatus::Failed);
    assert_eq!(h1.error.as_deref(), Some(INTERRUPTED_DURING_CANCELLATION));
    assert!(agent.calls_for("h1").is_empty());
}

#[tokio::test]
async fn test_unknown_transaction_is_not_found() {
    let h = Harness::new("c1", 1).await;
    let manager = h.manager(ScriptedAgent::with(&[]), 8);
    let err = manager.get_status(TxnId(999)).await.unwrap_err();
    assert!(matches!(
        err,
        Error::State(StateError::TransactionNotFound { .. })
    ));
}

#[tokio::test]
async fn test_lifecycle_events_are_emitted() {
    let h = Harness::new("c1", 2).await;
    let (tx, mut rx) = hmc_events::channel();
    let manager = h
        .manager(ScriptedAgent::with(&[]), 8)
        .with_event_sender(tx);

    let id = manager
        .start(draft("c1", OpKind::Install, 2, &[ActionKind::Install]))
        .await
        .unwrap();
    manager.wait_for_terminal(id, WAIT).await.unwrap();

    let mut accepted = false;
    let mut completed = None;
    let deadline = tokio::time::Instant::now() + WAIT;
    while completed.is_none() && tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
            Ok(Some(AppEvent::Transaction(TransactionEvent::Accepted { txn_id, hosts, .. }))) => {
                assert_eq!((txn_id, hosts), (id, 2));
                accepted = true;
            }
            Ok(Some(AppEvent::Transaction(TransactionEvent::Completed { status, .. }))) => {
                completed = Some(status);
            }
            _ => {}
        }
    }
    assert!(accepted);
    assert_eq!(completed, Some(TransactionStatus::Success));
}
