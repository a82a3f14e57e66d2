//! Persistence Committer
//!
//! The L1 and L2 reconcilers update overlapping `message_match` rows
//! concurrently. Both sort their batch by id before opening the transaction
//! so row locks are always taken in the same global order; any other order
//! (block number, layer) lets two transactions wait on each other
//! (SQLSTATE 40P01).

use tracing::{debug, error};

use super::error::ReconcileError;
use super::store::{BalanceUpdate, MessageStore};
use crate::types::Layer;

/// Sort `updates` by id and commit them as one transaction.
/// Returns the number of rows written.
pub async fn commit_balances(
    store: &dyn MessageStore,
    layer: Layer,
    mut updates: Vec<BalanceUpdate>,
) -> Result<usize, ReconcileError> {
    if updates.is_empty() {
        return Ok(0);
    }

    sort_for_commit(&mut updates);

    if let Err(e) = store.commit_balances(layer, &updates).await {
        error!(
            layer = %layer,
            rows = updates.len(),
            error = %e,
            "UpdateETHBalance transaction failed, window left unchecked"
        );
        return Err(e.into());
    }

    debug!(layer = %layer, rows = updates.len(), "ETH balances committed");
    Ok(updates.len())
}

#[inline]
pub fn sort_for_commit(updates: &mut [BalanceUpdate]) {
    updates.sort_by_key(|u| u.id);
}
