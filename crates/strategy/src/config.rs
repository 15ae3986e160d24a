use serde::{Deserialize, Serialize};

use common::{Error, Result};

use crate::indicators::IndicatorParams;

/// Parameters of the moving-average crossover strategy.
///
/// `[strategy]` section of `config/trading.toml`:
/// ```toml
/// [strategy]
/// short_ma_window = 9
/// long_ma_window = 21
/// rsi_period = 14
/// rsi_threshold = 30.0
/// bollinger_window = 20
/// bollinger_std_factor = 2.0
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StrategyParams {
    pub short_ma_window: usize,
    pub long_ma_window: usize,
    pub rsi_period: usize,
    /// Buy below this RSI, sell above `100 - rsi_threshold`.
    pub rsi_threshold: f64,
    pub bollinger_window: usize,
    pub bollinger_std_factor: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            short_ma_window: 9,
            long_ma_window: 21,
            rsi_period: 14,
            rsi_threshold: 30.0,
            bollinger_window: 20,
            bollinger_std_factor: 2.0,
        }
    }
}

impl StrategyParams {
    pub fn indicators(&self) -> IndicatorParams {
        IndicatorParams {
            short_ma_window: self.short_ma_window,
            long_ma_window: self.long_ma_window,
            rsi_period: self.rsi_period,
            bollinger_window: self.bollinger_window,
            bollinger_std_factor: self.bollinger_std_factor,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.indicators().validate()?;
        if !(self.rsi_threshold > 0.0 && self.rsi_threshold < 50.0) {
            return Err(Error::Config(format!(
                "rsi_threshold must be in (0, 50), got {}",
                self.rsi_threshold
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let params = StrategyParams::default();
        assert_eq!(params.short_ma_window, 9);
        assert_eq!(params.long_ma_window, 21);
        assert_eq!(params.rsi_period, 14);
        assert_eq!(params.rsi_threshold, 30.0);
        assert_eq!(params.bollinger_window, 20);
        assert_eq!(params.bollinger_std_factor, 2.0);
        params.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let params: StrategyParams = toml::from_str("rsi_threshold = 25.0").unwrap();
        assert_eq!(params.rsi_threshold, 25.0);
        assert_eq!(params.long_ma_window, 21);
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let params = StrategyParams {
            rsi_threshold: 60.0,
            ..StrategyParams::default()
        };
        assert!(matches!(params.validate(), Err(Error::Config(_))));
    }
}
