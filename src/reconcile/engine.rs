//! Reconciliation Engine
//!
//! One [`Reconciler`] per layer. A cycle:
//!
//! ```text
//! SelectWindow ──▶ StaleSkip ───────────────────────────▶ Derive & Commit ──▶ Committed
//!      │                                                       ▲
//!      └─────────▶ AggregateCheck ──valid──────────────────────┘
//!                        │
//!                        └─invalid──▶ Bisect & Report ──▶ Reported
//! ```
//!
//! The L1 and L2 reconcilers run as independent tasks over one store. They
//! share no in-process state; the id-ordered commit is their only
//! coordination.

use std::sync::Arc;
use std::time::Duration;

use num_bigint::BigInt;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::alert::{Alerter, LogAlerter, MismatchReport};
use super::balance::{ETH_BALANCE_GAP, check_balance, compute_block_balances, is_beyond_balance_gap};
use super::bisect::Bisector;
use super::committer::commit_balances;
use super::error::ReconcileError;
use super::metrics::{MetricsSink, NoopMetrics};
use super::oracle::BalanceOracle;
use super::store::MessageStore;
use super::window::{MESSAGE_LIMIT, Selection, Window, WindowSelector};
use crate::types::Layer;
use crate::watcher::WatcherProgress;

/// Where a layer's running balance starts before anything was validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartBalanceSeed {
    /// Operator-supplied balance (history before it is not auditable)
    Configured(BigInt),
    /// The messenger's on-chain balance at genesis height 0
    Genesis,
}

#[derive(Debug, Clone)]
pub struct LayerSettings {
    pub layer: Layer,
    pub messenger_address: String,
    /// Node prunes historical state; old windows are derived locally
    pub prunes_history: bool,
    pub seed: StartBalanceSeed,
    pub batch_size: usize,
    pub balance_gap: u64,
}

impl LayerSettings {
    pub fn new(layer: Layer, messenger_address: impl Into<String>, seed: StartBalanceSeed) -> Self {
        Self {
            layer,
            messenger_address: messenger_address.into(),
            prunes_history: layer == Layer::Layer1,
            seed,
            batch_size: MESSAGE_LIMIT,
            balance_gap: ETH_BALANCE_GAP,
        }
    }
}

/// Terminal state of one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing unchecked on this layer
    Idle,
    /// Unchecked work exists but its first block cannot be checked yet
    Blocked { first_block: u64 },
    Committed {
        records: usize,
        start_block: u64,
        end_block: u64,
        /// Derived from the validated start balance without an on-chain check
        locally_derived: bool,
    },
    /// Aggregate check failed; nothing committed for the window
    Reported {
        start_block: u64,
        end_block: u64,
        mismatches: Vec<MismatchReport>,
    },
}

pub struct Reconciler {
    settings: LayerSettings,
    store: Arc<dyn MessageStore>,
    oracle: Arc<dyn BalanceOracle>,
    alerter: Arc<dyn Alerter>,
    metrics: Arc<dyn MetricsSink>,
    progress: Arc<WatcherProgress>,
}

impl Reconciler {
    pub fn new(
        settings: LayerSettings,
        store: Arc<dyn MessageStore>,
        oracle: Arc<dyn BalanceOracle>,
    ) -> Self {
        Self {
            settings,
            store,
            oracle,
            alerter: Arc::new(LogAlerter),
            metrics: Arc::new(NoopMetrics),
            progress: Arc::new(WatcherProgress::new()),
        }
    }

    pub fn with_alerter(mut self, alerter: Arc<dyn Alerter>) -> Self {
        self.alerter = alerter;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_progress(mut self, progress: Arc<WatcherProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn layer(&self) -> Layer {
        self.settings.layer
    }

    /// Reconciled block vs. chain head; ready once everything checkable is checked
    pub fn progress(&self) -> Arc<WatcherProgress> {
        self.progress.clone()
    }

    /// Run one reconciliation cycle for this layer.
    ///
    /// Collaborator failures abort the cycle with nothing written; the next
    /// cycle starts again from persisted state.
    pub async fn check_eth_balance(&self) -> Result<CycleOutcome, ReconcileError> {
        let layer = self.settings.layer;
        info!(layer = %layer, "CheckETHBalance started");

        let latest_block = self.oracle.latest_block_number().await.inspect_err(|e| {
            error!(layer = %layer, error = %e, "get latest block number from node failed");
        })?;
        self.progress.set_safe_number(latest_block);

        let (start_balance, cursor_block) = self.start_balance().await?;

        let selector = WindowSelector::new(self.store.as_ref(), self.settings.batch_size);
        let window = match selector.select(layer, start_balance, cursor_block).await? {
            Selection::Empty => {
                self.progress.set_start_number(latest_block);
                return Ok(CycleOutcome::Idle);
            }
            Selection::Blocked { first_block } => {
                return Ok(CycleOutcome::Blocked { first_block });
            }
            Selection::Ready(window) => window,
        };

        let outcome = self.check_window(&window, latest_block).await?;
        if let CycleOutcome::Committed { end_block, .. } = outcome {
            self.progress.set_start_number(end_block);
        }

        info!(
            layer = %layer,
            start = window.start_block,
            end = window.end_block,
            "CheckETHBalance completed"
        );
        Ok(outcome)
    }

    /// Last validated balance and its block, or the layer's seed before the
    /// first commit
    async fn start_balance(&self) -> Result<(BigInt, Option<u64>), ReconcileError> {
        let layer = self.settings.layer;
        if let Some(cursor) = self.store.start_balance_and_cursor(layer).await? {
            return Ok((cursor.balance, Some(cursor.block_number)));
        }

        match &self.settings.seed {
            StartBalanceSeed::Configured(balance) => {
                info!(layer = %layer, start = %balance, "messenger start balance from config");
                Ok((balance.clone(), None))
            }
            StartBalanceSeed::Genesis => {
                let balance = self
                    .oracle
                    .balance_at(&self.settings.messenger_address, 0)
                    .await
                    .inspect_err(|e| {
                        error!(layer = %layer, error = %e, "get messenger genesis balance failed");
                    })?;
                info!(layer = %layer, start = %balance, "messenger start balance from genesis");
                Ok((balance, None))
            }
        }
    }

    async fn check_window(
        &self,
        window: &Window,
        latest_block: u64,
    ) -> Result<CycleOutcome, ReconcileError> {
        let layer = self.settings.layer;
        info!(
            layer = %layer,
            start = window.start_block,
            end = window.end_block,
            latest = latest_block,
            records = window.len(),
            "checking eth balance"
        );
        self.metrics.records_checked(layer, window.unchecked_count() as u64);

        // The node cannot serve balances this far back; the start balance was
        // itself validated on-chain, so derive locally
        if self.settings.prunes_history
            && is_beyond_balance_gap(window.end_block, latest_block, self.settings.balance_gap)
        {
            debug!(layer = %layer, end = window.end_block, "window beyond balance gap");
            return self.derive_and_commit(window, true).await;
        }

        let actual = self
            .oracle
            .balance_at(&self.settings.messenger_address, window.end_block)
            .await
            .inspect_err(|e| {
                error!(
                    layer = %layer,
                    addr = %self.settings.messenger_address,
                    end = window.end_block,
                    error = %e,
                    "get messenger balance failed"
                );
            })?;

        let check = check_balance(layer, &window.start_balance, &actual, &window.records)?;
        if check.ok {
            return self.derive_and_commit(window, false).await;
        }

        error!(
            layer = %layer,
            start = window.start_block,
            end = window.end_block,
            expected = %check.expected,
            actual = %check.actual,
            "window balance check failed, bisecting"
        );

        let bisector = Bisector::new(
            layer,
            &self.settings.messenger_address,
            self.oracle.as_ref(),
            self.alerter.as_ref(),
        );
        let outcome = bisector.run(&window.start_balance, &window.records).await?;
        for _ in &outcome.mismatches {
            self.metrics.mismatch_reported(layer);
        }
        if outcome.mismatches.is_empty() {
            warn!(
                layer = %layer,
                skipped = outcome.skipped_blocks,
                "bisection could not localize the window mismatch"
            );
        }

        Ok(CycleOutcome::Reported {
            start_block: window.start_block,
            end_block: window.end_block,
            mismatches: outcome.mismatches,
        })
    }

    async fn derive_and_commit(
        &self,
        window: &Window,
        locally_derived: bool,
    ) -> Result<CycleOutcome, ReconcileError> {
        let layer = self.settings.layer;
        let updates = compute_block_balances(layer, &window.records, &window.start_balance)
            .inspect_err(|e| {
                error!(layer = %layer, error = %e, "computeBlockBalance failed, window aborted");
            })?;
        let records = commit_balances(self.store.as_ref(), layer, updates).await?;

        Ok(CycleOutcome::Committed {
            records,
            start_block: window.start_block,
            end_block: window.end_block,
            locally_derived,
        })
    }

    /// Cycle every `interval` until `shutdown` flips to true or its sender drops.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let layer = self.settings.layer;
        info!(
            layer = %layer,
            interval_ms = interval.as_millis() as u64,
            "starting ETH balance reconciler"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.check_eth_balance().await {
                        Ok(outcome) => debug!(layer = %layer, ?outcome, "cycle finished"),
                        Err(e) if e.is_data_integrity() => {
                            error!(layer = %layer, error = %e, "data integrity error, window aborted");
                        }
                        Err(e) => {
                            warn!(layer = %layer, error = %e, "cycle aborted, retrying next tick");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(layer = %layer, "ETH balance reconciler stopped");
                        return;
                    }
                }
            }
        }
    }
}
