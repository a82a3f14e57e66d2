//! Window Selector
//!
//! Picks the longest block-ordered prefix of unchecked records that can be
//! validated as one unit:
//!
//! ```text
//! fetch_unchecked(limit)          ids ordered, may stop mid-block
//!        │ [first block, last block]
//!        ▼
//! fetch_by_block_range            every record of [first block, max(last block,
//!        │                        cursor block)], incl. Valid ones
//!        ▼
//! rebase start balance            back out every Valid delta in that span
//!        │
//!        ▼
//! truncate at first record        nothing at or after a block whose
//! with undetermined amount        amount is still unknown
//! ```

use num_bigint::BigInt;
use tracing::debug;

use super::error::ReconcileError;
use super::record::TransferRecord;
use super::store::MessageStore;
use crate::types::{AmountStatus, BalanceStatus, Layer};

/// Maximum unchecked records fetched per cycle
pub const MESSAGE_LIMIT: usize = 1000;

/// A block-ordered run of records ready for a balance check
#[derive(Debug, Clone)]
pub struct Window {
    pub layer: Layer,
    /// Messenger balance immediately before `start_block`
    pub start_balance: BigInt,
    pub start_block: u64,
    pub end_block: u64,
    /// Ordered by block number then id
    pub records: Vec<TransferRecord>,
}

impl Window {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records this window will move from `Unchecked` to `Valid`
    pub fn unchecked_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.balance_status(self.layer) == BalanceStatus::Unchecked)
            .count()
    }
}

/// Result of one selection pass
#[derive(Debug, Clone)]
pub enum Selection {
    /// No unchecked record on this layer
    Empty,
    /// Unchecked records exist but the first block's amounts are undetermined
    Blocked { first_block: u64 },
    Ready(Window),
}

impl Selection {
    pub fn into_window(self) -> Option<Window> {
        match self {
            Selection::Ready(window) => Some(window),
            _ => None,
        }
    }
}

pub struct WindowSelector<'a> {
    store: &'a dyn MessageStore,
    limit: usize,
}

impl<'a> WindowSelector<'a> {
    pub fn new(store: &'a dyn MessageStore, limit: usize) -> Self {
        Self { store, limit }
    }

    /// Select the next window for `layer`. `start_balance` is the last
    /// validated running balance (or the layer's seed) and `cursor_block`
    /// the block it was validated at, if any.
    pub async fn select(
        &self,
        layer: Layer,
        start_balance: BigInt,
        cursor_block: Option<u64>,
    ) -> Result<Selection, ReconcileError> {
        let unchecked = self.store.fetch_unchecked(layer, self.limit).await?;
        let Some((first_block, last_block)) = block_span(layer, &unchecked) else {
            debug!(layer = %layer, "no unchecked ETH records");
            return Ok(Selection::Empty);
        };

        // A late record may land below the cursor; every Valid block up to
        // the cursor is then inside the start balance and must be backed out
        let span_end = cursor_block.map_or(last_block, |c| c.max(last_block));
        let span = self
            .store
            .fetch_by_block_range(layer, first_block, span_end)
            .await?;

        let start_balance = rebase_start_balance(layer, start_balance, &span)?;
        let records = truncate_window(layer, span);
        let Some((start_block, end_block)) = block_span(layer, &records) else {
            debug!(
                layer = %layer,
                first_block,
                "window truncated to nothing, waiting for amounts at first block"
            );
            return Ok(Selection::Blocked { first_block });
        };

        // Committing below the cursor would leave the Valid blocks above it
        // with balances that no longer include this window
        if let Some(cursor) = cursor_block.filter(|c| end_block < *c) {
            debug!(
                layer = %layer,
                end_block,
                cursor,
                "window truncated below validated cursor, waiting for amounts"
            );
            return Ok(Selection::Blocked { first_block });
        }

        Ok(Selection::Ready(Window {
            layer,
            start_balance,
            start_block,
            end_block,
            records,
        }))
    }
}

/// Lowest and highest block number in `records`
fn block_span(layer: Layer, records: &[TransferRecord]) -> Option<(u64, u64)> {
    let first = records.iter().map(|r| r.block_number(layer)).min()?;
    let last = records.iter().map(|r| r.block_number(layer)).max()?;
    Some((first, last))
}

/// Keep only records in blocks strictly before the first record whose
/// amount is not yet determined. Input must be block-ordered.
pub fn truncate_window(layer: Layer, records: Vec<TransferRecord>) -> Vec<TransferRecord> {
    let truncate_block = records
        .iter()
        .find(|r| r.amount_status != AmountStatus::Set)
        .map(|r| r.block_number(layer));

    match truncate_block {
        None => records,
        Some(cut) => records
            .into_iter()
            .filter(|r| r.block_number(layer) < cut)
            .collect(),
    }
}

/// Records already `Valid` at or after the window's first block have their
/// deltas inside `start_balance`. Back them out so the start balance is the
/// balance before the window's first block. `records` must reach the cursor
/// block.
fn rebase_start_balance(
    layer: Layer,
    start_balance: BigInt,
    records: &[TransferRecord],
) -> Result<BigInt, ReconcileError> {
    let mut balance = start_balance;
    for record in records {
        if record.balance_status(layer) == BalanceStatus::Valid {
            balance -= record.signed_delta(layer)?;
        }
    }
    Ok(balance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::mock::MemoryStore;
    use crate::reconcile::record::fixtures::{relayed, sent};

    const L1: Layer = Layer::Layer1;

    fn undetermined(mut record: TransferRecord) -> TransferRecord {
        record.amount_status = AmountStatus::Unset;
        record
    }

    fn validated(mut record: TransferRecord, balance: i64) -> TransferRecord {
        let facts = record.facts_mut(L1);
        facts.balance_status = BalanceStatus::Valid;
        facts.messenger_balance = Some(BigInt::from(balance));
        record
    }

    #[test]
    fn test_truncate_keeps_everything_when_all_determined() {
        let records = vec![sent(1, L1, 10, "1"), sent(2, L1, 11, "1")];
        assert_eq!(truncate_window(L1, records.clone()), records);
    }

    #[test]
    fn test_truncate_drops_whole_block_of_undetermined_record() {
        let records = vec![
            sent(1, L1, 10, "1"),
            sent(2, L1, 11, "1"),
            undetermined(sent(3, L1, 11, "1")),
            sent(4, L1, 12, "1"),
        ];
        let kept = truncate_window(L1, records);
        assert_eq!(kept.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_truncate_at_first_block_yields_empty() {
        let records = vec![undetermined(sent(1, L1, 10, "1")), sent(2, L1, 11, "1")];
        assert!(truncate_window(L1, records).is_empty());
    }

    #[tokio::test]
    async fn test_select_refetches_full_blocks() {
        // Batch limit 2 stops inside block 11; the range refetch pulls in id 3
        let store = MemoryStore::new(vec![
            sent(1, L1, 10, "30"),
            sent(2, L1, 11, "5"),
            relayed(3, L1, 11, "2"),
            sent(4, L1, 12, "1"),
        ]);
        let window = WindowSelector::new(&store, 2)
            .select(L1, BigInt::from(100), None)
            .await
            .unwrap()
            .into_window()
            .unwrap();

        assert_eq!(window.records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!((window.start_block, window.end_block), (10, 11));
        assert_eq!(window.start_balance, BigInt::from(100));
    }

    #[tokio::test]
    async fn test_select_rebases_over_valid_records_in_first_block() {
        // id 1 already validated at block 10 with post-block balance 130;
        // id 2 arrived later in the same block
        let store = MemoryStore::new(vec![
            validated(sent(1, L1, 10, "30"), 130),
            sent(2, L1, 10, "5"),
        ]);
        let window = WindowSelector::new(&store, MESSAGE_LIMIT)
            .select(L1, BigInt::from(130), Some(10))
            .await
            .unwrap()
            .into_window()
            .unwrap();

        assert_eq!(window.len(), 2);
        assert_eq!(window.unchecked_count(), 1);
        assert_eq!(window.start_balance, BigInt::from(100));
    }

    #[tokio::test]
    async fn test_select_empty_when_nothing_unchecked() {
        let store = MemoryStore::new(vec![validated(sent(1, L1, 10, "30"), 130)]);
        let selection = WindowSelector::new(&store, MESSAGE_LIMIT)
            .select(L1, BigInt::from(130), Some(10))
            .await
            .unwrap();
        assert!(matches!(selection, Selection::Empty));
    }

    #[tokio::test]
    async fn test_select_blocked_when_first_block_undetermined() {
        let store = MemoryStore::new(vec![
            undetermined(sent(1, L1, 10, "30")),
            sent(2, L1, 11, "5"),
        ]);
        let selection = WindowSelector::new(&store, MESSAGE_LIMIT)
            .select(L1, BigInt::from(100), None)
            .await
            .unwrap();
        assert!(matches!(selection, Selection::Blocked { first_block: 10 }));
    }

    #[tokio::test]
    async fn test_never_skips_over_undetermined_block() {
        let store = MemoryStore::new(vec![
            sent(1, L1, 10, "1"),
            undetermined(relayed(2, L1, 12, "1")),
            sent(3, L1, 14, "1"),
        ]);
        let window = WindowSelector::new(&store, MESSAGE_LIMIT)
            .select(L1, BigInt::from(0), None)
            .await
            .unwrap()
            .into_window()
            .unwrap();

        assert!(window.records.iter().all(|r| r.block_number(L1) < 12));
        assert_eq!(window.end_block, 10);
    }

    #[tokio::test]
    async fn test_late_record_below_cursor_extends_span_to_cursor() {
        // Blocks 10 and 12 validated (130, 110); a transfer for block 11 arrives late
        let store = MemoryStore::new(vec![
            validated(sent(1, L1, 10, "30"), 130),
            validated(relayed(2, L1, 12, "20"), 110),
            sent(3, L1, 11, "7"),
        ]);
        let window = WindowSelector::new(&store, MESSAGE_LIMIT)
            .select(L1, BigInt::from(110), Some(12))
            .await
            .unwrap()
            .into_window()
            .unwrap();

        assert_eq!(window.records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3, 2]);
        assert_eq!((window.start_block, window.end_block), (11, 12));
        assert_eq!(window.start_balance, BigInt::from(130));
        assert_eq!(window.unchecked_count(), 1);
    }

    #[tokio::test]
    async fn test_blocked_when_truncation_stops_below_cursor() {
        // Block 12 holds a Valid record and a new one with undetermined amount
        let store = MemoryStore::new(vec![
            validated(sent(1, L1, 10, "30"), 130),
            validated(relayed(2, L1, 12, "20"), 110),
            sent(3, L1, 11, "7"),
            undetermined(sent(4, L1, 12, "1")),
        ]);
        let selection = WindowSelector::new(&store, MESSAGE_LIMIT)
            .select(L1, BigInt::from(110), Some(12))
            .await
            .unwrap();
        assert!(matches!(selection, Selection::Blocked { first_block: 11 }));
    }
}
