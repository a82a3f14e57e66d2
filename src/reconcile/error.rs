//! Reconciliation error types
//!
//! Mirrors the failure classes of a reconciliation cycle: a transient
//! collaborator failure, a data integrity error, or a rejected commit.
//! A balance mismatch is not an error; it is reported through the alerter.

use thiserror::Error;

use crate::types::Layer;

/// Chain balance oracle errors
#[derive(Debug, Error, Clone)]
pub enum OracleError {
    #[error("RPC connection failed: {0}")]
    RpcConnection(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Balance unavailable at block {0}")]
    BlockUnavailable(u64),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Message store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Row decode error: {0}")]
    Decode(String),

    #[error("Commit rejected: {0}")]
    Commit(String),
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("database id:{id} invalid ETH amount value: {value:?}, layer: {layer}")]
    InvalidAmount { id: i64, value: String, layer: Layer },
}

impl ReconcileError {
    /// Data integrity errors abort the window and are logged as hard errors;
    /// everything else is retried on the next scheduled cycle.
    pub fn is_data_integrity(&self) -> bool {
        matches!(self, ReconcileError::InvalidAmount { .. })
    }
}

impl From<sqlx::Error> for ReconcileError {
    fn from(e: sqlx::Error) -> Self {
        ReconcileError::Store(StoreError::Database(e))
    }
}
