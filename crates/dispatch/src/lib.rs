#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Host action dispatch for hmc
//!
//! Issues one idempotent action to one host's configuration-management
//! agent and classifies the result. The agent itself sits behind the
//! [`Agent`] trait; [`CommandAgent`] drives it through an external command.
//! The [`Dispatcher`] owns the per-call timeout so a hung agent is reported
//! as [`DispatchOutcome::TimedOut`] instead of blocking a worker.

mod agent;
pub mod backoff;
mod command;
mod dispatcher;

pub use agent::{Agent, AgentReport};
pub use backoff::{calculate_backoff_delay, RetryPolicy};
pub use command::CommandAgent;
pub use dispatcher::{DispatchOutcome, Dispatcher};
