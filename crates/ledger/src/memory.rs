use async_trait::async_trait;
use tokio::sync::RwLock;

use common::{Result, TradeLedger, TradeRecord};

/// Process-local ledger. Nothing survives a restart; used by tests and dry
/// runs.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: RwLock<Vec<TradeRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TradeLedger for MemoryLedger {
    async fn append(&self, record: &TradeRecord) -> Result<()> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<TradeRecord>> {
        Ok(self.records.read().await.clone())
    }
}
