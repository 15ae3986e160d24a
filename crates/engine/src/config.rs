use serde::{Deserialize, Serialize};

use common::{Error, Result};
use risk::RiskConfig;
use strategy::StrategyParams;

/// Trading parameters file (TOML). Every field has a default, so a missing
/// file section keeps the stock behaviour.
///
/// Example `config/trading.toml`:
/// ```toml
/// [market]
/// symbol = "ETHUSDT"
/// base_asset = "ETH"
/// trade_amount = 0.01
///
/// [strategy]
/// short_ma_window = 9
/// long_ma_window = 21
///
/// [risk]
/// stop_loss_pct = 0.05
/// take_profit_pct = 0.10
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TradingConfig {
    pub market: MarketConfig,
    pub strategy: StrategyParams,
    pub risk: RiskConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Exchange symbol, e.g. "ETHUSDT".
    pub symbol: String,
    /// Asset bought and sold; reported by `/balance`.
    pub base_asset: String,
    /// Asset the base is priced in.
    pub quote_asset: String,
    /// Order quantity in base asset units.
    pub trade_amount: f64,
    /// Candle width and the spacing of scheduled trade cycles.
    pub candle_interval_secs: u64,
    /// Candles fetched per evaluation.
    pub lookback_candles: usize,
    /// Act on a sell signal with no open position by selling outright.
    /// Off by default: the strategy is long-only.
    pub allow_short: bool,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            symbol: "ETHUSDT".into(),
            base_asset: "ETH".into(),
            quote_asset: "USDT".into(),
            trade_amount: 0.01,
            candle_interval_secs: 3600,
            lookback_candles: 100,
            allow_short: false,
        }
    }
}

impl TradingConfig {
    /// Load and validate the TOML file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read trading config at '{path}': {e}"))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("Invalid trading config at '{path}': {e}")))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.strategy.validate()?;
        self.risk.validate()?;

        let market = &self.market;
        if market.symbol.trim().is_empty() {
            return Err(Error::Config("market.symbol must not be empty".into()));
        }
        if !(market.trade_amount > 0.0 && market.trade_amount.is_finite()) {
            return Err(Error::Config(format!(
                "market.trade_amount must be positive, got {}",
                market.trade_amount
            )));
        }
        if market.candle_interval_secs == 0 {
            return Err(Error::Config("market.candle_interval_secs must be at least 1".into()));
        }
        let required = self.strategy.indicators().min_history();
        if market.lookback_candles < required {
            return Err(Error::Config(format!(
                "market.lookback_candles ({}) is below the {required} candles the strategy needs",
                market.lookback_candles
            )));
        }
        Ok(())
    }
}
