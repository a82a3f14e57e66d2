//! Chain node access

pub mod eth;

pub use eth::{EthRpcOracle, parse_address, parse_hex_balance, parse_hex_quantity};
