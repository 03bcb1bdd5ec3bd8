#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core type definitions for the hmc cluster orchestrator
//!
//! This crate provides the data model shared by the store, the transaction
//! manager and the façade: clusters and hosts, lifecycle operations, host
//! action plans, transaction/host-task status machines and the wire shapes
//! returned to request handlers.

pub mod cluster;
pub mod ops;
pub mod transaction;
pub mod wire;

// Re-export commonly used types
pub use cluster::{Cluster, ClusterState, Host, HostId};
pub use ops::{ActionKind, HostAction, LifecycleOptions, OpKind};
pub use transaction::{
    aggregate_status, HostTask, HostTaskDraft, HostTaskStatus, Transaction, TransactionDraft,
    TransactionStatus, TxnId,
};
pub use wire::{AcceptResponse, HostTaskView, TransactionView, UninstallResponse};

use serde::{Deserialize, Serialize};

/// Output format for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Plain,
    #[default]
    Json,
}

impl clap::ValueEnum for OutputFormat {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Plain, Self::Json]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Plain => clap::builder::PossibleValue::new("plain"),
            Self::Json => clap::builder::PossibleValue::new("json"),
        })
    }
}
