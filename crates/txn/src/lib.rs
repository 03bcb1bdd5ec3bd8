#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Transaction manager for hmc
//!
//! Turns an accepted lifecycle request into a durable transaction, then
//! drives its host tasks through the dispatcher on a bounded worker pool.
//! The accept path returns as soon as the transaction is persisted; all
//! later progress is written to the store and observed by polling.

mod manager;
mod worker;

pub use manager::TransactionManager;

/// Error detail recorded on tasks found in flight when a cancelling
/// transaction is resumed after a restart
pub const INTERRUPTED_DURING_CANCELLATION: &str = "interrupted during cancellation";

/// Error detail prefix recorded on tasks whose progress could not be
/// written to the store
pub const STORE_UNAVAILABLE: &str = "transaction store unavailable";
