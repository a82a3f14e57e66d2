//! Mismatch alerting
//!
//! A mismatch is a business-level inconsistency, not an error: the
//! reconciler hands it to an [`Alerter`] and keeps scanning.

use chrono::{DateTime, Utc};
use num_bigint::BigInt;
use tracing::error;

use super::record::TransferRecord;
use crate::types::Layer;

/// A sub-range whose expected end balance disagrees with the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MismatchReport {
    pub layer: Layer,
    /// Last record of the failing sub-range
    pub record_id: i64,
    pub message_hash: String,
    pub block_number: u64,
    pub tx_hash: String,
    pub expected: BigInt,
    pub actual: BigInt,
    pub detected_at: DateTime<Utc>,
}

impl MismatchReport {
    pub fn new(layer: Layer, record: &TransferRecord, expected: BigInt, actual: BigInt) -> Self {
        let facts = record.facts(layer);
        Self {
            layer,
            record_id: record.id,
            message_hash: record.message_hash.clone(),
            block_number: facts.block_number,
            tx_hash: facts.tx_hash.clone(),
            expected,
            actual,
            detected_at: Utc::now(),
        }
    }

    /// `actual - expected`
    pub fn discrepancy(&self) -> BigInt {
        &self.actual - &self.expected
    }
}

/// Fire-and-forget sink for mismatches. Must not block beyond its own call.
pub trait Alerter: Send + Sync {
    fn notify_mismatch(&self, report: &MismatchReport);
}

/// Default alerter: structured error log line per mismatch
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlerter;

impl Alerter for LogAlerter {
    fn notify_mismatch(&self, report: &MismatchReport) {
        error!(
            layer = %report.layer,
            id = report.record_id,
            message_hash = %report.message_hash,
            block = report.block_number,
            tx_hash = %report.tx_hash,
            expected = %report.expected,
            actual = %report.actual,
            discrepancy = %report.discrepancy(),
            "messenger ETH balance mismatch"
        );
    }
}
