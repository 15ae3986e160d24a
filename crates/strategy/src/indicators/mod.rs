pub mod bollinger;
pub mod rsi;
pub mod sma;

pub use bollinger::{bollinger, Bands};
pub use rsi::rsi;
pub use sma::sma;

use common::{Error, PriceSeries, Result};

/// Window parameters for one indicator pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorParams {
    pub short_ma_window: usize,
    pub long_ma_window: usize,
    pub rsi_period: usize,
    pub bollinger_window: usize,
    pub bollinger_std_factor: f64,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        crate::StrategyParams::default().indicators()
    }
}

impl IndicatorParams {
    /// Shortest series `compute` accepts.
    pub fn min_history(&self) -> usize {
        self.long_ma_window
            .max(self.rsi_period)
            .max(self.bollinger_window)
            + 1
    }

    pub fn validate(&self) -> Result<()> {
        if self.short_ma_window == 0 || self.bollinger_window == 0 {
            return Err(Error::Config("indicator windows must be at least 1".into()));
        }
        if self.short_ma_window >= self.long_ma_window {
            return Err(Error::Config(format!(
                "short_ma_window ({}) must be less than long_ma_window ({})",
                self.short_ma_window, self.long_ma_window
            )));
        }
        if self.rsi_period < 2 {
            return Err(Error::Config("rsi_period must be >= 2".into()));
        }
        if !(self.bollinger_std_factor > 0.0) {
            return Err(Error::Config(format!(
                "bollinger_std_factor must be positive, got {}",
                self.bollinger_std_factor
            )));
        }
        Ok(())
    }
}

/// Indicator values aligned with one candle. `None` marks values that
/// need more history than the candle has behind it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IndicatorSnapshot {
    pub short_ma: Option<f64>,
    pub long_ma: Option<f64>,
    pub rsi: Option<f64>,
    pub upper_band: Option<f64>,
    pub middle_band: Option<f64>,
    pub lower_band: Option<f64>,
}

/// Run every indicator over `series`, one snapshot per candle.
///
/// Value `i` only reads candles `0..=i`. Fails with
/// `Error::InsufficientHistory` when the series is shorter than
/// `params.min_history()`.
pub fn compute(series: &PriceSeries, params: &IndicatorParams) -> Result<Vec<IndicatorSnapshot>> {
    let required = params.min_history();
    if series.len() < required {
        return Err(Error::InsufficientHistory {
            required,
            available: series.len(),
        });
    }

    let closes = series.closes();
    let short = sma(&closes, params.short_ma_window);
    let long = sma(&closes, params.long_ma_window);
    let strength = rsi(&closes, params.rsi_period);
    let bands = bollinger(&closes, params.bollinger_window, params.bollinger_std_factor);

    Ok((0..closes.len())
        .map(|i| IndicatorSnapshot {
            short_ma: short[i],
            long_ma: long[i],
            rsi: strength[i],
            upper_band: bands[i].map(|b| b.upper),
            middle_band: bands[i].map(|b| b.middle),
            lower_band: bands[i].map(|b| b.lower),
        })
        .collect())
}
