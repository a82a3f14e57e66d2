use async_trait::async_trait;
use num_bigint::BigInt;

use super::error::StoreError;
use super::record::TransferRecord;
use crate::types::{BalanceStatus, Layer};

/// Last validated position of a layer's running balance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceCursor {
    pub balance: BigInt,
    pub block_number: u64,
}

/// Derived balance fields for one record on one layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceUpdate {
    pub id: i64,
    pub balance: BigInt,
    pub status: BalanceStatus,
}

/// Durable collection of transfer records.
///
/// Implementations must execute `commit_balances` as a single transaction:
/// either every update lands or none does. Updates are applied in the order
/// given; callers pass them sorted by id.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Last `Valid` running balance of the layer, or `None` before the first commit
    async fn start_balance_and_cursor(
        &self,
        layer: Layer,
    ) -> Result<Option<BalanceCursor>, StoreError>;

    /// Earliest `Unchecked` ETH records of the layer, ordered by id
    async fn fetch_unchecked(
        &self,
        layer: Layer,
        limit: usize,
    ) -> Result<Vec<TransferRecord>, StoreError>;

    /// Every ETH record of the layer with block number in `[start_block, end_block]`,
    /// ordered by block number then id
    async fn fetch_by_block_range(
        &self,
        layer: Layer,
        start_block: u64,
        end_block: u64,
    ) -> Result<Vec<TransferRecord>, StoreError>;

    async fn commit_balances(
        &self,
        layer: Layer,
        updates: &[BalanceUpdate],
    ) -> Result<(), StoreError>;
}
