//! Fallback Bisector
//!
//! Runs when a window's aggregate check fails. Re-checks the window block by
//! block against on-chain balances so each discrepancy is pinned to the
//! smallest sub-range the node can serve, reports it, and keeps going.
//! Detection only: nothing is persisted from here.

use num_bigint::BigInt;
use tracing::{debug, warn};

use super::alert::{Alerter, MismatchReport};
use super::balance::check_balance;
use super::error::ReconcileError;
use super::oracle::BalanceOracle;
use super::record::TransferRecord;
use crate::types::Layer;

#[derive(Debug, Default, Clone)]
pub struct BisectOutcome {
    pub mismatches: Vec<MismatchReport>,
    /// Sub-ranges whose end balance matched the chain
    pub verified_ranges: usize,
    /// Block boundaries skipped because the node could not serve them
    pub skipped_blocks: usize,
}

pub struct Bisector<'a> {
    layer: Layer,
    address: &'a str,
    oracle: &'a dyn BalanceOracle,
    alerter: &'a dyn Alerter,
}

impl<'a> Bisector<'a> {
    pub fn new(
        layer: Layer,
        address: &'a str,
        oracle: &'a dyn BalanceOracle,
        alerter: &'a dyn Alerter,
    ) -> Self {
        Self {
            layer,
            address,
            oracle,
            alerter,
        }
    }

    /// Walk `records` (block-ordered) from `start_balance`, the validated
    /// balance before the first record's block.
    ///
    /// Every sub-range after the anchor, including one following a reported
    /// mismatch, is measured from the chain's own balance at the previous
    /// boundary, so each report covers only its own blocks.
    pub async fn run(
        &self,
        start_balance: &BigInt,
        records: &[TransferRecord],
    ) -> Result<BisectOutcome, ReconcileError> {
        let mut outcome = BisectOutcome::default();

        // Anchor on the first block the node will answer for. The range from
        // the validated start balance up to the anchor is itself checkable.
        let mut anchor: Option<(usize, BigInt)> = None;
        let mut i = 0;
        while i < records.len() {
            let last = last_in_block(self.layer, records, i);
            let block_number = records[last].block_number(self.layer);
            match self.oracle.balance_at(self.address, block_number).await {
                Ok(balance) => {
                    self.check_range(start_balance, &balance, &records[..=last], &mut outcome)?;
                    anchor = Some((last, balance));
                    break;
                }
                Err(e) => {
                    warn!(
                        layer = %self.layer,
                        block = block_number,
                        error = %e,
                        "get balance failed, trying next block as anchor"
                    );
                    outcome.skipped_blocks += 1;
                    i = last + 1;
                }
            }
        }

        let Some((mut anchor_index, mut anchor_balance)) = anchor else {
            warn!(layer = %self.layer, "no queryable block in window, bisection skipped");
            return Ok(outcome);
        };

        let mut i = anchor_index + 1;
        while i < records.len() {
            // Only the last record of a block is a boundary
            let last = last_in_block(self.layer, records, i);
            let block_number = records[last].block_number(self.layer);

            let actual = match self.oracle.balance_at(self.address, block_number).await {
                Ok(balance) => balance,
                Err(e) => {
                    debug!(
                        layer = %self.layer,
                        block = block_number,
                        error = %e,
                        "boundary balance unavailable, widening sub-range"
                    );
                    outcome.skipped_blocks += 1;
                    i = last + 1;
                    continue;
                }
            };

            self.check_range(
                &anchor_balance,
                &actual,
                &records[anchor_index + 1..=last],
                &mut outcome,
            )?;

            // Re-anchor on the chain's own figure either way, so one bad
            // sub-range does not poison the ones after it
            anchor_index = last;
            anchor_balance = actual;
            i = last + 1;
        }

        Ok(outcome)
    }

    fn check_range(
        &self,
        start_balance: &BigInt,
        actual: &BigInt,
        range: &[TransferRecord],
        outcome: &mut BisectOutcome,
    ) -> Result<(), ReconcileError> {
        let check = check_balance(self.layer, start_balance, actual, range)?;
        if check.ok {
            outcome.verified_ranges += 1;
            return Ok(());
        }

        // Non-empty: callers always pass at least the boundary record
        let boundary = &range[range.len() - 1];
        let report = MismatchReport::new(self.layer, boundary, check.expected, check.actual);
        self.alerter.notify_mismatch(&report);
        outcome.mismatches.push(report);
        Ok(())
    }
}

/// Index of the last record sharing `records[index]`'s block
fn last_in_block(layer: Layer, records: &[TransferRecord], index: usize) -> usize {
    let block_number = records[index].block_number(layer);
    let mut last = index;
    while last + 1 < records.len() && records[last + 1].block_number(layer) == block_number {
        last += 1;
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::mock::{MockOracle, RecordingAlerter};
    use crate::reconcile::record::fixtures::{relayed, sent};

    const L: Layer = Layer::Layer2;
    const ADDR: &str = "0x0000000000000000000000000000000000000042";

    #[test]
    fn test_last_in_block() {
        let records = vec![sent(1, L, 10, "1"), sent(2, L, 10, "1"), sent(3, L, 11, "1")];
        assert_eq!(last_in_block(L, &records, 0), 1);
        assert_eq!(last_in_block(L, &records, 1), 1);
        assert_eq!(last_in_block(L, &records, 2), 2);
    }

    #[tokio::test]
    async fn test_localizes_single_bad_block() {
        let records = vec![sent(1, L, 10, "30"), relayed(2, L, 12, "20")];
        let oracle = MockOracle::new(100).with_balance(10, 130).with_balance(12, 90);
        let alerter = RecordingAlerter::new();

        let outcome = Bisector::new(L, ADDR, &oracle, &alerter)
            .run(&BigInt::from(100), &records)
            .await
            .unwrap();

        assert_eq!(outcome.mismatches.len(), 1);
        let report = &outcome.mismatches[0];
        assert_eq!(report.record_id, 2);
        assert_eq!(report.block_number, 12);
        assert_eq!(report.expected, BigInt::from(110));
        assert_eq!(report.actual, BigInt::from(90));
        assert_eq!(alerter.reports(), outcome.mismatches);
        // block 10 against the start balance verified
        assert_eq!(outcome.verified_ranges, 1);
    }

    #[tokio::test]
    async fn test_checks_each_block_once_at_its_last_record() {
        let records = vec![
            sent(1, L, 10, "30"),
            sent(2, L, 11, "5"),
            sent(3, L, 11, "5"),
            relayed(4, L, 13, "10"),
        ];
        let oracle = MockOracle::new(100)
            .with_balance(10, 130)
            .with_balance(11, 140)
            .with_balance(13, 130);
        let alerter = RecordingAlerter::new();

        let outcome = Bisector::new(L, ADDR, &oracle, &alerter)
            .run(&BigInt::from(100), &records)
            .await
            .unwrap();

        assert!(outcome.mismatches.is_empty());
        assert_eq!(outcome.verified_ranges, 3);
        assert_eq!(oracle.balance_calls(), vec![10, 11, 13]);
    }

    #[tokio::test]
    async fn test_continues_past_mismatch() {
        // Block 11 is off by 1; block 12 is consistent with block 11's chain balance
        // but block 13 is off by 3.
        let records = vec![
            sent(1, L, 10, "10"),
            sent(2, L, 11, "10"),
            sent(3, L, 12, "10"),
            sent(4, L, 13, "10"),
        ];
        let oracle = MockOracle::new(100)
            .with_balance(10, 110)
            .with_balance(11, 119)
            .with_balance(12, 129)
            .with_balance(13, 136);
        let alerter = RecordingAlerter::new();

        let outcome = Bisector::new(L, ADDR, &oracle, &alerter)
            .run(&BigInt::from(100), &records)
            .await
            .unwrap();

        let blocks: Vec<u64> = outcome.mismatches.iter().map(|m| m.block_number).collect();
        assert_eq!(blocks, vec![11, 13]);
        assert_eq!(outcome.verified_ranges, 2);
        // Block 13 is measured from the chain's 129 at block 12, not from 130
        assert_eq!(outcome.mismatches[1].expected, BigInt::from(139));
        assert_eq!(outcome.mismatches[1].actual, BigInt::from(136));
    }

    #[tokio::test]
    async fn test_unqueryable_blocks_are_skipped() {
        let records = vec![
            sent(1, L, 10, "10"),
            sent(2, L, 11, "10"),
            sent(3, L, 12, "10"),
        ];
        let oracle = MockOracle::new(100)
            .with_balance(11, 120)
            .with_balance(12, 130);
        oracle.fail_at(10);
        let alerter = RecordingAlerter::new();

        let outcome = Bisector::new(L, ADDR, &oracle, &alerter)
            .run(&BigInt::from(100), &records)
            .await
            .unwrap();

        assert!(outcome.mismatches.is_empty());
        assert_eq!(outcome.skipped_blocks, 1);
        assert_eq!(oracle.balance_calls(), vec![10, 11, 12]);
    }

    #[tokio::test]
    async fn test_no_queryable_block_reports_nothing() {
        let records = vec![sent(1, L, 10, "10")];
        let oracle = MockOracle::new(100);
        let alerter = RecordingAlerter::new();

        let outcome = Bisector::new(L, ADDR, &oracle, &alerter)
            .run(&BigInt::from(100), &records)
            .await
            .unwrap();

        assert!(outcome.mismatches.is_empty());
        assert!(alerter.reports().is_empty());
        assert_eq!(outcome.skipped_blocks, 1);
    }
}
