//! Balance Computer
//!
//! Aggregate check of a window against an on-chain balance, and per-block
//! derivation of running balances once a window is known to be valid.

use std::collections::BTreeMap;

use num_bigint::BigInt;

use super::error::ReconcileError;
use super::record::{TransferRecord, net_delta};
use super::store::BalanceUpdate;
use crate::types::{BalanceStatus, Layer};

/// Blocks behind the chain head past which a pruning node may refuse
/// historical balance queries
pub const ETH_BALANCE_GAP: u64 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceCheck {
    pub ok: bool,
    pub expected: BigInt,
    pub actual: BigInt,
}

/// `expected = start + Σ delta(records)`, compared against `actual`
pub fn check_balance(
    layer: Layer,
    start_balance: &BigInt,
    actual: &BigInt,
    records: &[TransferRecord],
) -> Result<BalanceCheck, ReconcileError> {
    let expected = start_balance + net_delta(layer, records)?;
    Ok(BalanceCheck {
        ok: &expected == actual,
        expected,
        actual: actual.clone(),
    })
}

/// True when the window ends more than `gap` blocks behind `latest`, so the
/// node's balance history at `end_block` cannot be relied on.
#[inline]
pub fn is_beyond_balance_gap(end_block: u64, latest_block: u64, gap: u64) -> bool {
    end_block.saturating_add(gap) < latest_block
}

/// Running balance after each block of a validated window.
///
/// Every record receives its block's post-delta balance and `Valid`. All
/// amounts are decoded before any update is produced, so a bad amount
/// yields no updates at all.
pub fn compute_block_balances(
    layer: Layer,
    records: &[TransferRecord],
    start_balance: &BigInt,
) -> Result<Vec<BalanceUpdate>, ReconcileError> {
    let mut block_deltas: BTreeMap<u64, BigInt> = BTreeMap::new();
    for record in records {
        *block_deltas.entry(record.block_number(layer)).or_default() +=
            record.signed_delta(layer)?;
    }

    let mut running = start_balance.clone();
    let mut block_balances: BTreeMap<u64, BigInt> = BTreeMap::new();
    for (block_number, delta) in block_deltas {
        running += delta;
        block_balances.insert(block_number, running.clone());
    }

    Ok(records
        .iter()
        .map(|record| BalanceUpdate {
            id: record.id,
            balance: block_balances[&record.block_number(layer)].clone(),
            status: BalanceStatus::Valid,
        })
        .collect())
}
