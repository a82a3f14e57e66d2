//! Messenger ETH balance reconciliation
//!
//! Verifies that the ETH custodied by the bridge messenger on each layer is
//! exactly explained by the transfer records ingested for that layer, and
//! persists a per-record running balance once it is.
//!
//! # Invariants
//!
//! 1. **Block order**: a layer's records are validated strictly in block
//!    order; a block is never checked before its predecessor's balance is
//!    established.
//! 2. **Whole blocks**: every record of a block is aggregated before the
//!    running balance advances; all of them receive the same balance.
//! 3. **Atomic window**: a window is either fully marked `Valid` or left
//!    entirely `Unchecked`.
//! 4. **Id-ordered commits**: updates are applied in ascending id order so
//!    concurrent L1/L2 transactions never deadlock.

pub mod alert;
pub mod balance;
pub mod bisect;
pub mod committer;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod oracle;
pub mod record;
pub mod store;
pub mod window;

#[cfg(test)]
pub mod mock;

pub use alert::{Alerter, LogAlerter, MismatchReport};
pub use balance::{BalanceCheck, ETH_BALANCE_GAP, check_balance, compute_block_balances};
pub use bisect::{BisectOutcome, Bisector};
pub use committer::commit_balances;
pub use engine::{CycleOutcome, LayerSettings, Reconciler, StartBalanceSeed};
pub use error::{OracleError, ReconcileError, StoreError};
pub use metrics::{CheckedCounters, MetricsSink, NoopMetrics};
pub use oracle::BalanceOracle;
pub use record::{LayerFacts, TransferRecord};
pub use store::{BalanceCursor, BalanceUpdate, MessageStore};
pub use window::{MESSAGE_LIMIT, Selection, Window, WindowSelector};
