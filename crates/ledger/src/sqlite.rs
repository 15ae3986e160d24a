use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use common::{Error, ExitReason, OrderSide, Result, TradeLedger, TradeRecord};

/// Trade log in a SQLite database (`trade_history` table).
///
/// An insert has committed by the time `append` returns.
#[derive(Clone)]
pub struct SqliteLedger {
    db: SqlitePool,
}

impl SqliteLedger {
    /// Open (creating if needed) the database at `url` and apply migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        // Every connection to `:memory:` is a separate database, so pin the
        // pool to one connection that never expires.
        let pool_options = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let db = pool_options.connect_with(options).await?;
        sqlx::migrate!("../../migrations").run(&db).await?;
        info!(url, "Trade ledger ready");
        Ok(Self { db })
    }
}

#[async_trait]
impl TradeLedger for SqliteLedger {
    async fn append(&self, record: &TradeRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trade_history (timestamp, symbol, action, price, quantity, reason)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(record.timestamp.to_rfc3339())
        .bind(&record.symbol)
        .bind(record.action.to_string())
        .bind(record.price)
        .bind(record.quantity)
        .bind(record.reason.map(|r| r.as_str()))
        .execute(&self.db)
        .await?;

        debug!(symbol = %record.symbol, action = %record.action, price = record.price, "Trade recorded");
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<TradeRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, symbol, action, price, quantity, reason
            FROM trade_history
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(record_from_row).collect()
    }
}

fn record_from_row(row: &SqliteRow) -> Result<TradeRecord> {
    let timestamp: String = row.try_get("timestamp")?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map_err(|e| Error::Other(format!("bad timestamp '{timestamp}' in trade_history: {e}")))?
        .with_timezone(&Utc);
    let action: String = row.try_get("action")?;
    let reason: Option<String> = row.try_get("reason")?;

    Ok(TradeRecord {
        timestamp,
        symbol: row.try_get("symbol")?,
        action: action.parse::<OrderSide>()?,
        price: row.try_get("price")?,
        quantity: row.try_get("quantity")?,
        reason: reason.map(|r| r.parse::<ExitReason>()).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(action: OrderSide, price: f64, reason: Option<ExitReason>) -> TradeRecord {
        TradeRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            symbol: "ETHUSDT".into(),
            action,
            price,
            quantity: 0.01,
            reason,
        }
    }

    #[tokio::test]
    async fn empty_ledger_reads_empty() {
        let ledger = SqliteLedger::connect("sqlite::memory:").await.unwrap();
        assert!(ledger.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn records_keep_order_and_fields() {
        let ledger = SqliteLedger::connect("sqlite::memory:").await.unwrap();
        let buy = record(OrderSide::Buy, 2000.0, None);
        let sell = record(OrderSide::Sell, 1899.0, Some(ExitReason::StopLoss));
        ledger.append(&buy).await.unwrap();
        ledger.append(&sell).await.unwrap();

        let records = ledger.read_all().await.unwrap();
        assert_eq!(records, vec![buy, sell]);
    }

    #[tokio::test]
    async fn records_survive_reconnect() {
        let path = std::env::temp_dir().join(format!("ledger-test-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let url = format!("sqlite://{}", path.display());

        {
            let ledger = SqliteLedger::connect(&url).await.unwrap();
            ledger.append(&record(OrderSide::Buy, 2000.0, None)).await.unwrap();
        }

        let reopened = SqliteLedger::connect(&url).await.unwrap();
        let records = reopened.read_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, OrderSide::Buy);

        let _ = std::fs::remove_file(&path);
    }
}
