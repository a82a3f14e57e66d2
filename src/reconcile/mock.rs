//! In-memory collaborators for testing the reconciler without a database or node.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use num_bigint::BigInt;

use super::alert::{Alerter, MismatchReport};
use super::error::{OracleError, StoreError};
use super::oracle::BalanceOracle;
use super::record::TransferRecord;
use super::store::{BalanceCursor, BalanceUpdate, MessageStore};
use crate::types::{BalanceStatus, EventType, Layer, TokenType};

pub struct MemoryStore {
    records: Mutex<Vec<TransferRecord>>,
    /// Every successful commit batch, in commit order
    commits: Mutex<Vec<(Layer, Vec<BalanceUpdate>)>>,
    /// Simulate a row update failing inside the transaction
    fail_commit_on_id: Mutex<Option<i64>>,
    fail_fetch: Mutex<bool>,
}

impl MemoryStore {
    pub fn new(records: Vec<TransferRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            commits: Mutex::new(Vec::new()),
            fail_commit_on_id: Mutex::new(None),
            fail_fetch: Mutex::new(false),
        }
    }

    pub fn set_fail_commit_on_id(&self, id: Option<i64>) {
        *self.fail_commit_on_id.lock().unwrap() = id;
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        *self.fail_fetch.lock().unwrap() = fail;
    }

    pub fn records(&self) -> Vec<TransferRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn record(&self, id: i64) -> TransferRecord {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .expect("record exists")
    }

    pub fn commits(&self) -> Vec<(Layer, Vec<BalanceUpdate>)> {
        self.commits.lock().unwrap().clone()
    }

    pub fn commit_count(&self) -> usize {
        self.commits.lock().unwrap().len()
    }

    fn check_fetch(&self) -> Result<(), StoreError> {
        if *self.fail_fetch.lock().unwrap() {
            return Err(StoreError::Decode("mock fetch failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn start_balance_and_cursor(
        &self,
        layer: Layer,
    ) -> Result<Option<BalanceCursor>, StoreError> {
        self.check_fetch()?;
        let records = self.records.lock().unwrap();
        let last = records
            .iter()
            .filter(|r| r.balance_status(layer) == BalanceStatus::Valid)
            .max_by_key(|r| (r.block_number(layer), r.id));

        match last {
            None => Ok(None),
            Some(r) => {
                let balance = r
                    .facts(layer)
                    .messenger_balance
                    .clone()
                    .ok_or_else(|| StoreError::Decode(format!("id {} has no balance", r.id)))?;
                Ok(Some(BalanceCursor {
                    balance,
                    block_number: r.block_number(layer),
                }))
            }
        }
    }

    async fn fetch_unchecked(
        &self,
        layer: Layer,
        limit: usize,
    ) -> Result<Vec<TransferRecord>, StoreError> {
        self.check_fetch()?;
        let mut out: Vec<TransferRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| {
                r.token_type == TokenType::Eth
                    && r.facts(layer).event_type != EventType::Unset
                    && r.balance_status(layer) == BalanceStatus::Unchecked
            })
            .cloned()
            .collect();
        out.sort_by_key(|r| r.id);
        out.truncate(limit);
        Ok(out)
    }

    async fn fetch_by_block_range(
        &self,
        layer: Layer,
        start_block: u64,
        end_block: u64,
    ) -> Result<Vec<TransferRecord>, StoreError> {
        self.check_fetch()?;
        let mut out: Vec<TransferRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| {
                r.token_type == TokenType::Eth
                    && r.facts(layer).event_type != EventType::Unset
                    && (start_block..=end_block).contains(&r.block_number(layer))
            })
            .cloned()
            .collect();
        out.sort_by_key(|r| (r.block_number(layer), r.id));
        Ok(out)
    }

    async fn commit_balances(
        &self,
        layer: Layer,
        updates: &[BalanceUpdate],
    ) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();

        // All-or-nothing: validate every row before touching any
        let fail_on = *self.fail_commit_on_id.lock().unwrap();
        for update in updates {
            if Some(update.id) == fail_on || !records.iter().any(|r| r.id == update.id) {
                return Err(StoreError::Commit(format!("update of id {} failed", update.id)));
            }
        }

        for update in updates {
            if let Some(record) = records.iter_mut().find(|r| r.id == update.id) {
                let facts = record.facts_mut(layer);
                facts.messenger_balance = Some(update.balance.clone());
                facts.balance_status = update.status;
            }
        }
        self.commits
            .lock()
            .unwrap()
            .push((layer, updates.to_vec()));
        Ok(())
    }
}

pub struct MockOracle {
    balances: Mutex<HashMap<u64, BigInt>>,
    failing_heights: Mutex<HashSet<u64>>,
    latest: AtomicU64,
    fail_latest: Mutex<bool>,
    balance_calls: Mutex<Vec<u64>>,
}

impl MockOracle {
    pub fn new(latest: u64) -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            failing_heights: Mutex::new(HashSet::new()),
            latest: AtomicU64::new(latest),
            fail_latest: Mutex::new(false),
            balance_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_balance(self, block_number: u64, balance: i64) -> Self {
        self.set_balance(block_number, balance);
        self
    }

    pub fn set_balance(&self, block_number: u64, balance: i64) {
        self.balances
            .lock()
            .unwrap()
            .insert(block_number, BigInt::from(balance));
    }

    pub fn fail_at(&self, block_number: u64) {
        self.failing_heights.lock().unwrap().insert(block_number);
    }

    pub fn set_fail_latest(&self, fail: bool) {
        *self.fail_latest.lock().unwrap() = fail;
    }

    /// Heights passed to `balance_at`, in call order
    pub fn balance_calls(&self) -> Vec<u64> {
        self.balance_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BalanceOracle for MockOracle {
    fn chain_id(&self) -> &str {
        "MOCK"
    }

    async fn balance_at(&self, _address: &str, block_number: u64) -> Result<BigInt, OracleError> {
        self.balance_calls.lock().unwrap().push(block_number);
        if self.failing_heights.lock().unwrap().contains(&block_number) {
            return Err(OracleError::BlockUnavailable(block_number));
        }
        self.balances
            .lock()
            .unwrap()
            .get(&block_number)
            .cloned()
            .ok_or(OracleError::BlockUnavailable(block_number))
    }

    async fn latest_block_number(&self) -> Result<u64, OracleError> {
        if *self.fail_latest.lock().unwrap() {
            return Err(OracleError::RpcConnection("mock node down".to_string()));
        }
        Ok(self.latest.load(Ordering::SeqCst))
    }
}

#[derive(Default)]
pub struct RecordingAlerter {
    reports: Mutex<Vec<MismatchReport>>,
}

impl RecordingAlerter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<MismatchReport> {
        self.reports.lock().unwrap().clone()
    }
}

impl Alerter for RecordingAlerter {
    fn notify_mismatch(&self, report: &MismatchReport) {
        self.reports.lock().unwrap().push(report.clone());
    }
}
