//! Agent capability

use async_trait::async_trait;
use hmc_errors::Error;
use hmc_types::HostAction;

/// What the agent said about one action on one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReport {
    pub success: bool,
    pub error_detail: Option<String>,
}

impl AgentReport {
    #[must_use]
    pub fn success() -> Self {
        Self {
            success: true,
            error_detail: None,
        }
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            error_detail: Some(detail.into()),
        }
    }
}

/// A configuration-management agent that can apply an action to a host.
///
/// Implementations must be idempotent: the same action may be delivered to
/// the same host more than once (retries, re-dispatch after restart).
/// Timeouts are enforced by the caller.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Apply `action` on `host`
    ///
    /// # Errors
    ///
    /// Returns an error if the agent could not be reached at all; the
    /// dispatcher records that as a failed task.
    async fn invoke(&self, host: &str, action: &HostAction) -> Result<AgentReport, Error>;
}
