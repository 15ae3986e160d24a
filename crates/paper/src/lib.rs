use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{
    AccountProvider, Error, MarketDataProvider, Order, OrderConfirmation, OrderExecutionProvider,
    OrderSide, RejectionReason, Result,
};

/// Simulated exchange account for paper trading.
///
/// Market orders fill at the market provider's latest price with a flat
/// slippage in basis points. Balances are tracked per asset; no real order
/// ever leaves the process.
pub struct PaperClient {
    market: Arc<dyn MarketDataProvider>,
    base_asset: String,
    quote_asset: String,
    balances: RwLock<HashMap<String, f64>>,
    /// Slippage in basis points applied to all fills.
    slippage_bps: f64,
}

impl PaperClient {
    pub fn new(
        market: Arc<dyn MarketDataProvider>,
        base_asset: impl Into<String>,
        quote_asset: impl Into<String>,
        initial_quote_balance: f64,
        slippage_bps: f64,
    ) -> Self {
        let base_asset = base_asset.into();
        let quote_asset = quote_asset.into();
        info!(
            base = %base_asset,
            quote = %quote_asset,
            balance = initial_quote_balance,
            slippage_bps,
            "PaperClient initialized"
        );
        let balances = HashMap::from([
            (base_asset.clone(), 0.0),
            (quote_asset.clone(), initial_quote_balance),
        ]);
        Self {
            market,
            base_asset,
            quote_asset,
            balances: RwLock::new(balances),
            slippage_bps,
        }
    }

    /// Add `quantity` of `asset` to the simulated balance. Used when a
    /// position recovered from the ledger must be sellable again.
    pub async fn credit(&self, asset: &str, quantity: f64) {
        let mut balances = self.balances.write().await;
        let held = balances.entry(asset.to_string()).or_insert(0.0);
        *held += quantity;
        info!(asset, quantity, balance = *held, "Paper balance credited");
    }

    fn rejected(order: &Order, reason: RejectionReason) -> Error {
        Error::OrderRejected {
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: order.quantity,
            reason,
        }
    }
}

#[async_trait]
impl OrderExecutionProvider for PaperClient {
    async fn place_market_order(&self, order: &Order) -> Result<OrderConfirmation> {
        if !(order.quantity > 0.0) {
            return Err(Self::rejected(
                order,
                RejectionReason::Exchange("quantity must be positive".into()),
            ));
        }

        let mid_price = self.market.latest_price(&order.symbol).await.map_err(|e| {
            Self::rejected(order, RejectionReason::Exchange(format!("no price available: {e}")))
        })?;

        // Buys pay more, sells receive less
        let fill_price = match order.side {
            OrderSide::Buy => mid_price * (1.0 + self.slippage_bps / 10_000.0),
            OrderSide::Sell => mid_price * (1.0 - self.slippage_bps / 10_000.0),
        };
        let notional = fill_price * order.quantity;

        let mut balances = self.balances.write().await;
        let quote = balances.get(&self.quote_asset).copied().unwrap_or(0.0);
        let base = balances.get(&self.base_asset).copied().unwrap_or(0.0);
        let (new_quote, new_base) = match order.side {
            OrderSide::Buy if quote < notional => {
                return Err(Self::rejected(order, RejectionReason::InsufficientBalance))
            }
            OrderSide::Sell if base < order.quantity => {
                return Err(Self::rejected(order, RejectionReason::InsufficientBalance))
            }
            OrderSide::Buy => (quote - notional, base + order.quantity),
            OrderSide::Sell => (quote + notional, base - order.quantity),
        };
        balances.insert(self.quote_asset.clone(), new_quote);
        balances.insert(self.base_asset.clone(), new_base);
        drop(balances);

        debug!(
            symbol = %order.symbol,
            side = %order.side,
            mid = mid_price,
            fill = fill_price,
            qty = order.quantity,
            "Paper fill simulated"
        );

        Ok(OrderConfirmation {
            order_id: order.id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            filled_price: fill_price,
            filled_quantity: order.quantity,
            timestamp: Utc::now(),
        })
    }
}

#[async_trait]
impl AccountProvider for PaperClient {
    async fn balance(&self, asset: &str) -> Result<f64> {
        Ok(self.balances.read().await.get(asset).copied().unwrap_or(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::PriceSeries;

    struct FixedPrice(Option<f64>);

    #[async_trait]
    impl MarketDataProvider for FixedPrice {
        async fn series(&self, _: &str, _: u64, _: usize) -> Result<PriceSeries> {
            PriceSeries::new(Vec::new())
        }

        async fn latest_price(&self, _: &str) -> Result<f64> {
            self.0.ok_or_else(|| Error::DataUnavailable("offline".into()))
        }
    }

    fn client(price: Option<f64>, slippage_bps: f64) -> PaperClient {
        PaperClient::new(Arc::new(FixedPrice(price)), "ETH", "USDT", 10_000.0, slippage_bps)
    }

    #[tokio::test]
    async fn paper_buy_fill_applies_positive_slippage() {
        let client = client(Some(1000.0), 10.0);
        let order = Order::market("ETHUSDT", OrderSide::Buy, 0.01);
        let fill = client.place_market_order(&order).await.unwrap();

        let expected = 1000.0 * (1.0 + 10.0 / 10_000.0);
        assert!(
            (fill.filled_price - expected).abs() < 1e-6,
            "Buy fill price {}, expected {}",
            fill.filled_price,
            expected
        );
        assert_eq!(fill.order_id, order.id);
    }

    #[tokio::test]
    async fn paper_sell_fill_applies_negative_slippage() {
        let client = client(Some(1000.0), 10.0);
        client
            .place_market_order(&Order::market("ETHUSDT", OrderSide::Buy, 0.01))
            .await
            .unwrap();

        let sell = Order::market("ETHUSDT", OrderSide::Sell, 0.01);
        let fill = client.place_market_order(&sell).await.unwrap();

        let expected = 1000.0 * (1.0 - 10.0 / 10_000.0);
        assert!((fill.filled_price - expected).abs() < 1e-6);
    }

    #[tokio::test]
    async fn balances_move_with_fills() {
        let client = client(Some(500.0), 0.0);
        client
            .place_market_order(&Order::market("ETHUSDT", OrderSide::Buy, 2.0))
            .await
            .unwrap();

        assert_eq!(client.balance("ETH").await.unwrap(), 2.0);
        assert_eq!(client.balance("USDT").await.unwrap(), 9_000.0);
        assert_eq!(client.balance("BTC").await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn buy_beyond_balance_is_rejected() {
        let client = client(Some(500.0), 0.0);
        let err = client
            .place_market_order(&Order::market("ETHUSDT", OrderSide::Buy, 100.0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::OrderRejected { reason: RejectionReason::InsufficientBalance, .. }
        ));
        assert_eq!(client.balance("USDT").await.unwrap(), 10_000.0);
    }

    #[tokio::test]
    async fn selling_unheld_asset_is_rejected() {
        let client = client(Some(500.0), 0.0);
        let err = client
            .place_market_order(&Order::market("ETHUSDT", OrderSide::Sell, 1.0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::OrderRejected { reason: RejectionReason::InsufficientBalance, .. }
        ));
    }

    #[tokio::test]
    async fn credited_base_asset_can_be_sold() {
        let client = client(Some(500.0), 0.0);
        client.credit("ETH", 1.5).await;
        assert_eq!(client.balance("ETH").await.unwrap(), 1.5);

        let fill = client
            .place_market_order(&Order::market("ETHUSDT", OrderSide::Sell, 1.5))
            .await
            .unwrap();
        assert_eq!(fill.filled_quantity, 1.5);
        assert_eq!(client.balance("ETH").await.unwrap(), 0.0);
        assert_eq!(client.balance("USDT").await.unwrap(), 10_750.0);
    }

    #[tokio::test]
    async fn missing_price_rejects_order() {
        let client = client(None, 0.0);
        let err = client
            .place_market_order(&Order::market("ETHUSDT", OrderSide::Buy, 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::OrderRejected { side: OrderSide::Buy, .. }));
    }
}
