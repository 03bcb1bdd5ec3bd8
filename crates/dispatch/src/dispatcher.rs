//! Per-call timeout and outcome classification

use hmc_types::HostAction;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::Agent;

/// Result of one agent call as seen by the transaction manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Succeeded,
    /// The agent reported an error, or could not be reached
    Failed { detail: String },
    /// No answer within the per-call timeout
    TimedOut,
}

/// Issues actions to hosts through an [`Agent`], bounding each call
#[derive(Clone)]
pub struct Dispatcher {
    agent: Arc<dyn Agent>,
    timeout: Duration,
}

impl Dispatcher {
    #[must_use]
    pub fn new(agent: Arc<dyn Agent>, timeout: Duration) -> Self {
        Self { agent, timeout }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Apply `action` on `host`, waiting at most the configured timeout.
    ///
    /// Never fails: transport errors become [`DispatchOutcome::Failed`].
    pub async fn dispatch(&self, host: &str, action: &HostAction) -> DispatchOutcome {
        match tokio::time::timeout(self.timeout, self.agent.invoke(host, action)).await {
            Err(_elapsed) => DispatchOutcome::TimedOut,
            Ok(Err(err)) => DispatchOutcome::Failed {
                detail: err.to_string(),
            },
            Ok(Ok(report)) if report.success => DispatchOutcome::Succeeded,
            Ok(Ok(report)) => DispatchOutcome::Failed {
                detail: report
                    .error_detail
                    .unwrap_or_else(|| "agent reported failure".to_string()),
            },
        }
    }
}
