#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Cluster lifecycle orchestration for hmc
//!
//! This crate is the façade request handlers talk to. It validates a
//! lifecycle request against the cluster registry, turns the cluster's
//! host set into an action plan and hands the plan to the transaction
//! manager. Accepting a request never waits for host work.

mod admin;
mod context;
mod lifecycle;
mod plan;

pub use context::{Hmc, HmcBuilder};
pub use plan::{build_draft, ActionPlanPolicy, DefaultPlanPolicy};
