//! Blockchain explorer collaborator, used to backfill skipped phases

use crate::Result;
use async_trait::async_trait;
use channel_core::Amount;

/// Read-only transaction lookups
#[async_trait]
pub trait Explorer: Send + Sync {
    /// Fee paid by the transaction
    async fn fetch_tx_fee(&self, txid: &str) -> Result<Amount>;

    /// Unix time the transaction was first seen
    async fn fetch_tx_time(&self, txid: &str) -> Result<i64>;

    /// Height of the block that confirmed the transaction
    async fn fetch_tx_height(&self, txid: &str) -> Result<u32>;

    /// Position of the transaction within its block
    async fn fetch_tx_index_in_block(&self, txid: &str) -> Result<u32>;
}
