//! Injectable metrics sink
//!
//! The reconciler reports through a trait object instead of a process-wide
//! registry so tests can observe or ignore it.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::Layer;

pub trait MetricsSink: Send + Sync {
    /// `count` records went through a balance check on `layer`
    fn records_checked(&self, layer: Layer, count: u64);

    /// A mismatch was reported on `layer`
    fn mismatch_reported(&self, _layer: Layer) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn records_checked(&self, _layer: Layer, _count: u64) {}
}

/// In-process counters, one pair per layer
#[derive(Debug, Default)]
pub struct CheckedCounters {
    checked: [AtomicU64; 2],
    mismatches: [AtomicU64; 2],
}

impl CheckedCounters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn slot(layer: Layer) -> usize {
        match layer {
            Layer::Layer1 => 0,
            Layer::Layer2 => 1,
        }
    }

    /// Total records checked on `layer` (`cross_chain_checked_eth_total{layer}`)
    pub fn checked_total(&self, layer: Layer) -> u64 {
        self.checked[Self::slot(layer)].load(Ordering::Relaxed)
    }

    pub fn mismatch_total(&self, layer: Layer) -> u64 {
        self.mismatches[Self::slot(layer)].load(Ordering::Relaxed)
    }
}

impl MetricsSink for CheckedCounters {
    fn records_checked(&self, layer: Layer, count: u64) {
        self.checked[Self::slot(layer)].fetch_add(count, Ordering::Relaxed);
    }

    fn mismatch_reported(&self, layer: Layer) {
        self.mismatches[Self::slot(layer)].fetch_add(1, Ordering::Relaxed);
    }
}
