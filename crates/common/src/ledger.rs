use async_trait::async_trait;

use crate::{Result, TradeRecord};

/// Append-only trade log.
///
/// `append` returns only once the record is durable. `read_all` yields
/// records in insertion order; an empty ledger is an empty vec, not an error.
#[async_trait]
pub trait TradeLedger: Send + Sync {
    async fn append(&self, record: &TradeRecord) -> Result<()>;

    async fn read_all(&self) -> Result<Vec<TradeRecord>>;
}
