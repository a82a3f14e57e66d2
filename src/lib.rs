//! Bridge Auditor - cross-chain messenger ETH balance reconciliation
//!
//! Proves, block by block, that the ETH held by the bridge messenger contract
//! on each layer equals the starting balance plus every ingested transfer
//! into it minus every transfer out of it.
//!
//! # Modules
//!
//! - [`types`] - Layer, event and status enums stored as SMALLINT
//! - [`reconcile`] - Window selection, balance checks, bisection, commits
//! - [`watcher`] - Per-layer reconciliation progress
//! - [`chain`] - Ethereum JSON-RPC balance oracle
//! - [`store`] - PostgreSQL `message_match` store
//! - [`db`] - Connection pool management
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing subscriber setup

pub mod chain;
pub mod config;
pub mod db;
pub mod logging;
pub mod reconcile;
pub mod store;
pub mod types;
pub mod watcher;

pub use reconcile::{CycleOutcome, LayerSettings, Reconciler, StartBalanceSeed};
pub use types::Layer;
