//! `message_match` table access
//!
//! Each layer owns a parallel set of columns (`l1_*`, `l2_*`). Balances are
//! `NUMERIC` and cross the wire as text so no precision is lost.

use async_trait::async_trait;
use num_bigint::BigInt;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, error};

use crate::reconcile::error::StoreError;
use crate::reconcile::record::{LayerFacts, TransferRecord};
use crate::reconcile::store::{BalanceCursor, BalanceUpdate, MessageStore};
use crate::types::{AmountStatus, BalanceStatus, EventType, Layer, TokenType};

/// Table layout the reconciler reads and updates. Ingestion owns every
/// column except `*_messenger_eth_balance` and `*_eth_balance_status`.
pub const MESSAGE_MATCH_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS message_match (
    id                          BIGSERIAL PRIMARY KEY,
    message_hash                VARCHAR(66) NOT NULL,
    token_type                  SMALLINT NOT NULL DEFAULT 1,
    eth_amount_status           SMALLINT NOT NULL DEFAULT 0,

    l1_event_type               SMALLINT NOT NULL DEFAULT 0,
    l1_block_number             BIGINT NOT NULL DEFAULT 0,
    l1_tx_hash                  VARCHAR(66) NOT NULL DEFAULT '',
    l1_amount                   VARCHAR(78) NOT NULL DEFAULT '',
    l1_messenger_eth_balance    NUMERIC(78, 0),
    l1_eth_balance_status       SMALLINT NOT NULL DEFAULT 0,

    l2_event_type               SMALLINT NOT NULL DEFAULT 0,
    l2_block_number             BIGINT NOT NULL DEFAULT 0,
    l2_tx_hash                  VARCHAR(66) NOT NULL DEFAULT '',
    l2_amount                   VARCHAR(78) NOT NULL DEFAULT '',
    l2_messenger_eth_balance    NUMERIC(78, 0),
    l2_eth_balance_status       SMALLINT NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_message_match_l1_eth_check
    ON message_match (l1_eth_balance_status, l1_block_number);
CREATE INDEX IF NOT EXISTS idx_message_match_l2_eth_check
    ON message_match (l2_eth_balance_status, l2_block_number);
"#;

pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_record(row: &PgRow) -> Result<TransferRecord, StoreError> {
        let token_id: i16 = row.try_get("token_type")?;
        let token_type = TokenType::from_id(token_id)
            .ok_or_else(|| StoreError::Decode(format!("Invalid token_type: {}", token_id)))?;

        let amount_id: i16 = row.try_get("eth_amount_status")?;
        let amount_status = AmountStatus::from_id(amount_id).ok_or_else(|| {
            StoreError::Decode(format!("Invalid eth_amount_status: {}", amount_id))
        })?;

        Ok(TransferRecord {
            id: row.try_get("id")?,
            message_hash: row.try_get("message_hash")?,
            token_type,
            amount_status,
            l1: Self::row_to_facts(row, Layer::Layer1)?,
            l2: Self::row_to_facts(row, Layer::Layer2)?,
        })
    }

    fn row_to_facts(row: &PgRow, layer: Layer) -> Result<LayerFacts, StoreError> {
        let p = layer.column_prefix();

        let event_id: i16 = row.try_get(format!("{p}_event_type").as_str())?;
        let event_type = EventType::from_id(event_id)
            .ok_or_else(|| StoreError::Decode(format!("Invalid {p}_event_type: {}", event_id)))?;

        let status_id: i16 = row.try_get(format!("{p}_eth_balance_status").as_str())?;
        let balance_status = BalanceStatus::from_id(status_id).ok_or_else(|| {
            StoreError::Decode(format!("Invalid {p}_eth_balance_status: {}", status_id))
        })?;

        let block: i64 = row.try_get(format!("{p}_block_number").as_str())?;
        let balance: Option<String> = row.try_get(format!("{p}_messenger_eth_balance").as_str())?;

        Ok(LayerFacts {
            event_type,
            block_number: decode_block_number(block)?,
            tx_hash: row.try_get(format!("{p}_tx_hash").as_str())?,
            amount: row.try_get(format!("{p}_amount").as_str())?,
            messenger_balance: balance.as_deref().map(decode_balance).transpose()?,
            balance_status,
        })
    }
}

/// Column list shared by every record query
fn record_columns() -> String {
    let mut cols = String::from("id, message_hash, token_type, eth_amount_status");
    for layer in Layer::ALL {
        let p = layer.column_prefix();
        cols.push_str(&format!(
            ", {p}_event_type, {p}_block_number, {p}_tx_hash, {p}_amount, \
             {p}_messenger_eth_balance::text AS {p}_messenger_eth_balance, \
             {p}_eth_balance_status"
        ));
    }
    cols
}

fn cursor_sql(layer: Layer) -> String {
    let p = layer.column_prefix();
    format!(
        "SELECT {p}_messenger_eth_balance::text AS balance, {p}_block_number AS block_number \
         FROM message_match \
         WHERE token_type = $1 AND {p}_eth_balance_status = $2 \
         ORDER BY {p}_block_number DESC, id DESC \
         LIMIT 1"
    )
}

fn unchecked_sql(layer: Layer) -> String {
    let p = layer.column_prefix();
    format!(
        "SELECT {cols} FROM message_match \
         WHERE token_type = $1 AND {p}_event_type <> $2 AND {p}_eth_balance_status = $3 \
         ORDER BY id ASC \
         LIMIT $4",
        cols = record_columns()
    )
}

fn block_range_sql(layer: Layer) -> String {
    let p = layer.column_prefix();
    format!(
        "SELECT {cols} FROM message_match \
         WHERE token_type = $1 AND {p}_event_type <> $2 \
           AND {p}_block_number >= $3 AND {p}_block_number <= $4 \
         ORDER BY {p}_block_number ASC, id ASC",
        cols = record_columns()
    )
}

fn update_balance_sql(layer: Layer) -> String {
    let p = layer.column_prefix();
    format!(
        "UPDATE message_match \
         SET {p}_messenger_eth_balance = $1::numeric, {p}_eth_balance_status = $2 \
         WHERE id = $3"
    )
}

fn decode_block_number(raw: i64) -> Result<u64, StoreError> {
    u64::try_from(raw).map_err(|_| StoreError::Decode(format!("Negative block number: {}", raw)))
}

fn decode_balance(raw: &str) -> Result<BigInt, StoreError> {
    raw.parse::<BigInt>()
        .map_err(|_| StoreError::Decode(format!("Invalid messenger balance: {:?}", raw)))
}

fn encode_block_number(block: u64) -> Result<i64, StoreError> {
    i64::try_from(block).map_err(|_| StoreError::Decode(format!("Block number too large: {}", block)))
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn start_balance_and_cursor(
        &self,
        layer: Layer,
    ) -> Result<Option<BalanceCursor>, StoreError> {
        let row = sqlx::query(&cursor_sql(layer))
            .bind(TokenType::Eth.id())
            .bind(BalanceStatus::Valid.id())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let balance: Option<String> = row.try_get("balance")?;
        let balance = balance.ok_or_else(|| {
            StoreError::Decode(format!("{} Valid record without messenger balance", layer))
        })?;
        let block: i64 = row.try_get("block_number")?;

        Ok(Some(BalanceCursor {
            balance: decode_balance(&balance)?,
            block_number: decode_block_number(block)?,
        }))
    }

    async fn fetch_unchecked(
        &self,
        layer: Layer,
        limit: usize,
    ) -> Result<Vec<TransferRecord>, StoreError> {
        let rows = sqlx::query(&unchecked_sql(layer))
            .bind(TokenType::Eth.id())
            .bind(EventType::Unset.id())
            .bind(BalanceStatus::Unchecked.id())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn fetch_by_block_range(
        &self,
        layer: Layer,
        start_block: u64,
        end_block: u64,
    ) -> Result<Vec<TransferRecord>, StoreError> {
        let rows = sqlx::query(&block_range_sql(layer))
            .bind(TokenType::Eth.id())
            .bind(EventType::Unset.id())
            .bind(encode_block_number(start_block)?)
            .bind(encode_block_number(end_block)?)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn commit_balances(
        &self,
        layer: Layer,
        updates: &[BalanceUpdate],
    ) -> Result<(), StoreError> {
        let sql = update_balance_sql(layer);
        let mut tx = self.pool.begin().await?;

        for update in updates {
            let result = sqlx::query(&sql)
                .bind(update.balance.to_string())
                .bind(update.status.id())
                .bind(update.id)
                .execute(&mut *tx)
                .await;

            match result {
                Ok(done) if done.rows_affected() == 1 => {}
                Ok(_) => {
                    error!(layer = %layer, id = update.id, "balance update matched no row");
                    let _ = tx.rollback().await;
                    return Err(StoreError::Commit(format!("id {} not found", update.id)));
                }
                Err(e) => {
                    error!(layer = %layer, id = update.id, error = %e, "balance update failed");
                    let _ = tx.rollback().await;
                    return Err(e.into());
                }
            }
        }

        tx.commit().await?;
        debug!(layer = %layer, rows = updates.len(), "balance transaction committed");
        Ok(())
    }
}
