use async_trait::async_trait;
use num_bigint::BigInt;

use super::error::OracleError;

/// Read-only view of one chain's balances
#[async_trait]
pub trait BalanceOracle: Send + Sync {
    /// Chain label for logging
    fn chain_id(&self) -> &str;

    /// Balance of `address` at `block_number`.
    /// Fails when the node no longer serves state for that height.
    async fn balance_at(&self, address: &str, block_number: u64) -> Result<BigInt, OracleError>;

    async fn latest_block_number(&self) -> Result<u64, OracleError>;
}
