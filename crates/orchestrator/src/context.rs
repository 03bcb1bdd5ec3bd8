//! Orchestrator context and its builder

use hmc_config::Config;
use hmc_dispatch::{Agent, CommandAgent};
use hmc_errors::{Error, OrchestratorError};
use hmc_events::{EventEmitter, EventSender};
use hmc_state::StateManager;
use hmc_txn::TransactionManager;
use std::sync::Arc;

use crate::plan::{ActionPlanPolicy, DefaultPlanPolicy};

/// Cluster lifecycle orchestrator
///
/// Cheap to clone; clones share the store, the worker pool and the set of
/// running transactions.
#[derive(Clone)]
pub struct Hmc {
    pub(crate) state: StateManager,
    pub(crate) manager: TransactionManager,
    pub(crate) policy: Arc<dyn ActionPlanPolicy>,
    pub(crate) config: Config,
    pub(crate) tx: Option<EventSender>,
}

impl EventEmitter for Hmc {
    fn event_sender(&self) -> Option<&EventSender> {
        self.tx.as_ref()
    }
}

impl Hmc {
    #[must_use]
    pub fn builder() -> HmcBuilder {
        HmcBuilder::new()
    }

    #[must_use]
    pub fn state(&self) -> &StateManager {
        &self.state
    }

    #[must_use]
    pub fn manager(&self) -> &TransactionManager {
        &self.manager
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Builder for [`Hmc`]
#[derive(Default)]
pub struct HmcBuilder {
    state: Option<StateManager>,
    agent: Option<Arc<dyn Agent>>,
    manager: Option<TransactionManager>,
    policy: Option<Arc<dyn ActionPlanPolicy>>,
    tx: Option<EventSender>,
    config: Option<Config>,
}

impl HmcBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the transaction store
    #[must_use]
    pub fn with_state(mut self, state: StateManager) -> Self {
        self.state = Some(state);
        self
    }

    /// Set the agent host actions are issued through.
    ///
    /// Defaults to a [`CommandAgent`] built from the `[agent]` section.
    #[must_use]
    pub fn with_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agent = Some(agent);
        self
    }

    /// Use a preconfigured transaction manager instead of building one from
    /// the configuration. It must share the store given to [`Self::with_state`].
    #[must_use]
    pub fn with_manager(mut self, manager: TransactionManager) -> Self {
        self.manager = Some(manager);
        self
    }

    /// Set the action plan policy (default: [`DefaultPlanPolicy`])
    #[must_use]
    pub fn with_plan_policy(mut self, policy: Arc<dyn ActionPlanPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Set event sender
    #[must_use]
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.tx = Some(tx);
        self
    }

    /// Set configuration
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the orchestrator
    ///
    /// # Errors
    ///
    /// Returns an error if the store is missing or the configured agent
    /// command template is invalid.
    pub fn build(self) -> Result<Hmc, Error> {
        let state = self
            .state
            .ok_or_else(|| OrchestratorError::MissingComponent {
                component: "state".to_string(),
            })?;
        let config = self.config.unwrap_or_default();

        let manager = match self.manager {
            Some(manager) => manager,
            None => {
                let agent = match self.agent {
                    Some(agent) => agent,
                    None => Arc::new(CommandAgent::from_config(&config.agent)?),
                };
                TransactionManager::from_config(state.clone(), agent, &config)
            }
        };
        let manager = match &self.tx {
            Some(tx) => manager.with_event_sender(tx.clone()),
            None => manager,
        };

        Ok(Hmc {
            state,
            manager,
            policy: self.policy.unwrap_or_else(|| Arc::new(DefaultPlanPolicy)),
            config,
            tx: self.tx,
        })
    }
}
