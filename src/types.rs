//! Core type definitions shared by the reconciler, the store and the oracle.
//!
//! Status and event ids are stored in PostgreSQL as SMALLINT; the numeric
//! values below are the on-disk encoding and must not be renumbered.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One side of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layer {
    Layer1,
    Layer2,
}

impl Layer {
    pub const ALL: [Layer; 2] = [Layer::Layer1, Layer::Layer2];

    /// Short label used in logs and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Layer1 => "layer1",
            Layer::Layer2 => "layer2",
        }
    }

    /// Column prefix of this layer's facts in `message_match`
    pub fn column_prefix(&self) -> &'static str {
        match self {
            Layer::Layer1 => "l1",
            Layer::Layer2 => "l2",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bridge messenger event observed on one layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i16)]
pub enum EventType {
    /// No event ingested for this layer yet
    #[default]
    Unset = 0,
    /// Funds entered the messenger on this layer (+amount)
    SentMessage = 1,
    /// Funds left the messenger on this layer (-amount)
    RelayedMessage = 2,
}

impl EventType {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(EventType::Unset),
            1 => Some(EventType::SentMessage),
            2 => Some(EventType::RelayedMessage),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Unset => "UNSET",
            EventType::SentMessage => "SENT_MESSAGE",
            EventType::RelayedMessage => "RELAYED_MESSAGE",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-layer balance check status, owned by the reconciler.
///
/// Transitions `Unchecked -> Valid` exactly once and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i16)]
pub enum BalanceStatus {
    #[default]
    Unchecked = 0,
    Valid = 1,
}

impl BalanceStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(BalanceStatus::Unchecked),
            1 => Some(BalanceStatus::Valid),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceStatus::Unchecked => "UNCHECKED",
            BalanceStatus::Valid => "VALID",
        }
    }
}

impl fmt::Display for BalanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether ingestion has determined the ETH amount of a record.
///
/// A record with an undetermined amount cannot take part in a balance
/// check, so the window is cut in front of its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i16)]
pub enum AmountStatus {
    #[default]
    Unset = 0,
    Set = 1,
}

impl AmountStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(AmountStatus::Unset),
            1 => Some(AmountStatus::Set),
            _ => None,
        }
    }
}

/// Asset carried by a bridge message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i16)]
pub enum TokenType {
    #[default]
    Eth = 1,
    Erc20 = 2,
    Erc721 = 3,
    Erc1155 = 4,
}

impl TokenType {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(TokenType::Eth),
            2 => Some(TokenType::Erc20),
            3 => Some(TokenType::Erc721),
            4 => Some(TokenType::Erc1155),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_id_roundtrip() {
        for status in [BalanceStatus::Unchecked, BalanceStatus::Valid] {
            assert_eq!(BalanceStatus::from_id(status.id()), Some(status));
        }
        assert_eq!(BalanceStatus::from_id(7), None);
    }

    #[test]
    fn test_event_type_ids() {
        assert_eq!(EventType::SentMessage.id(), 1);
        assert_eq!(EventType::RelayedMessage.id(), 2);
        assert_eq!(EventType::from_id(0), Some(EventType::Unset));
        assert_eq!(EventType::from_id(-1), None);
    }

    #[test]
    fn test_layer_labels() {
        assert_eq!(Layer::Layer1.to_string(), "layer1");
        assert_eq!(Layer::Layer2.column_prefix(), "l2");
    }
}
