use async_trait::async_trait;

use crate::{Order, OrderConfirmation, PriceSeries, Result};

/// Read side of the exchange connection.
///
/// `BinanceClient` implements this against the public REST API. Failures
/// surface as `Error::DataUnavailable`; the core never retries inside a call.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// The most recent `lookback` closed candles of `interval_secs` width,
    /// oldest first.
    async fn series(&self, symbol: &str, interval_secs: u64, lookback: usize)
        -> Result<PriceSeries>;

    /// Latest traded price for `symbol`.
    async fn latest_price(&self, symbol: &str) -> Result<f64>;
}

/// Order placement. `BinanceClient` for live trading, `PaperClient` for
/// simulation.
///
/// Only the trade orchestrator in `crates/engine` should hold one of these.
/// Implementations must not resubmit an order on their own: an ambiguous
/// outcome is reported as `Error::OrderTimeout`.
#[async_trait]
pub trait OrderExecutionProvider: Send + Sync {
    async fn place_market_order(&self, order: &Order) -> Result<OrderConfirmation>;
}

/// Account balance queries for the operator surface.
#[async_trait]
pub trait AccountProvider: Send + Sync {
    /// Free balance of `asset` (e.g. "ETH").
    async fn balance(&self, asset: &str) -> Result<f64>;
}
