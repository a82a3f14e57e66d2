//! Transfer record model
//!
//! One `message_match` row: a cross-chain transfer candidate with its
//! per-layer event facts (written by ingestion) and per-layer derived
//! balance fields (written only by the reconciler).

use num_bigint::BigInt;

use super::error::ReconcileError;
use crate::types::{AmountStatus, BalanceStatus, EventType, Layer, TokenType};

/// Event facts and derived balance fields of one layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerFacts {
    pub event_type: EventType,
    pub block_number: u64,
    pub tx_hash: String,
    /// Wei amount, base-10
    pub amount: String,
    /// Running messenger balance after this record's block
    pub messenger_balance: Option<BigInt>,
    pub balance_status: BalanceStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferRecord {
    /// Store-assigned, monotonically increasing; defines commit order
    pub id: i64,
    pub message_hash: String,
    pub token_type: TokenType,
    pub amount_status: AmountStatus,
    pub l1: LayerFacts,
    pub l2: LayerFacts,
}

impl TransferRecord {
    #[inline]
    pub fn facts(&self, layer: Layer) -> &LayerFacts {
        match layer {
            Layer::Layer1 => &self.l1,
            Layer::Layer2 => &self.l2,
        }
    }

    #[inline]
    pub fn facts_mut(&mut self, layer: Layer) -> &mut LayerFacts {
        match layer {
            Layer::Layer1 => &mut self.l1,
            Layer::Layer2 => &mut self.l2,
        }
    }

    #[inline]
    pub fn block_number(&self, layer: Layer) -> u64 {
        self.facts(layer).block_number
    }

    #[inline]
    pub fn balance_status(&self, layer: Layer) -> BalanceStatus {
        self.facts(layer).balance_status
    }

    /// Decode the layer's amount. Amounts are non-negative base-10 integers;
    /// anything else is a data integrity error.
    pub fn decode_amount(&self, layer: Layer) -> Result<BigInt, ReconcileError> {
        let raw = &self.facts(layer).amount;
        let invalid = || ReconcileError::InvalidAmount {
            id: self.id,
            value: raw.clone(),
            layer,
        };

        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        raw.parse::<BigInt>().map_err(|_| invalid())
    }

    /// Signed contribution of this record to the layer's messenger balance:
    /// `SentMessage` adds the amount, `RelayedMessage` subtracts it.
    pub fn signed_delta(&self, layer: Layer) -> Result<BigInt, ReconcileError> {
        let amount = self.decode_amount(layer)?;
        Ok(match self.facts(layer).event_type {
            EventType::SentMessage => amount,
            EventType::RelayedMessage => -amount,
            EventType::Unset => BigInt::default(),
        })
    }
}

/// Sum of signed deltas over `records` for `layer`
pub fn net_delta(layer: Layer, records: &[TransferRecord]) -> Result<BigInt, ReconcileError> {
    let mut diff = BigInt::default();
    for record in records {
        diff += record.signed_delta(layer)?;
    }
    Ok(diff)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Record whose `layer` side carries a determined ETH event
    pub fn eth_record(
        id: i64,
        layer: Layer,
        block_number: u64,
        event_type: EventType,
        amount: &str,
    ) -> TransferRecord {
        let mut record = TransferRecord {
            id,
            message_hash: format!("0x{:064x}", id),
            token_type: TokenType::Eth,
            amount_status: AmountStatus::Set,
            ..Default::default()
        };
        let facts = record.facts_mut(layer);
        facts.event_type = event_type;
        facts.block_number = block_number;
        facts.tx_hash = format!("0xtx{}", id);
        facts.amount = amount.to_string();
        record
    }

    pub fn sent(id: i64, layer: Layer, block_number: u64, amount: &str) -> TransferRecord {
        eth_record(id, layer, block_number, EventType::SentMessage, amount)
    }

    pub fn relayed(id: i64, layer: Layer, block_number: u64, amount: &str) -> TransferRecord {
        eth_record(id, layer, block_number, EventType::RelayedMessage, amount)
    }
}
