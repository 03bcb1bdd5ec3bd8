use serde::{Deserialize, Serialize};

// Declare all domain modules
pub mod cluster;
pub mod general;
pub mod host;
pub mod transaction;

pub use cluster::*;
pub use general::*;
pub use host::*;
pub use transaction::*;

/// Top-level application event enum that aggregates all domain-specific events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// General utility events (warnings, errors, debug logs)
    General(GeneralEvent),

    /// Transaction lifecycle (accept, start, cancel, completion)
    Transaction(TransactionEvent),

    /// Per-host dispatch progress
    HostTask(HostTaskEvent),

    /// Cluster registry changes
    Cluster(ClusterEvent),
}

impl AppEvent {
    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;

        match self {
            Self::General(GeneralEvent::Error { .. })
            | Self::HostTask(HostTaskEvent::Failed { .. } | HostTaskEvent::TimedOut { .. }) => {
                Level::ERROR
            }

            Self::Transaction(TransactionEvent::Completed { status, .. })
                if !matches!(status, hmc_types::TransactionStatus::Success) =>
            {
                Level::WARN
            }

            Self::General(GeneralEvent::Warning { .. })
            | Self::HostTask(HostTaskEvent::RetryScheduled { .. }) => Level::WARN,

            Self::General(GeneralEvent::DebugLog { .. })
            | Self::HostTask(HostTaskEvent::Dispatched { .. } | HostTaskEvent::StepCompleted { .. }) => {
                Level::DEBUG
            }

            _ => Level::INFO,
        }
    }

    /// Get the log target for this event (for structured logging)
    #[must_use]
    pub fn log_target(&self) -> &'static str {
        match self {
            Self::General(_) => "hmc::events::general",
            Self::Transaction(_) => "hmc::events::transaction",
            Self::HostTask(_) => "hmc::events::host_task",
            Self::Cluster(_) => "hmc::events::cluster",
        }
    }
}
