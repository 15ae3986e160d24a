use tracing::debug;

use common::{Error, PriceSeries, Result, Signal, SignalKind};

use crate::config::StrategyParams;
use crate::indicators::{self, IndicatorSnapshot};
use crate::Strategy;

/// Moving-average crossover confirmed by RSI and Bollinger Bands.
///
/// Buy on an upward short/long crossover while RSI is below the threshold
/// and price closes under the lower band; sell on the mirror image.
#[derive(Debug, Clone)]
pub struct CrossoverStrategy {
    name: String,
    params: StrategyParams,
}

impl CrossoverStrategy {
    pub fn new(params: StrategyParams) -> Result<Self> {
        params.validate()?;
        let name = format!(
            "MA {}/{} + RSI {} + BB {}",
            params.short_ma_window,
            params.long_ma_window,
            params.rsi_period,
            params.bollinger_window
        );
        Ok(Self { name, params })
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }
}

impl Strategy for CrossoverStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_history(&self) -> usize {
        self.params.indicators().min_history()
    }

    fn evaluate(&self, series: &PriceSeries) -> Result<Signal> {
        let snapshots = indicators::compute(series, &self.params.indicators())?;
        let insufficient = || Error::InsufficientHistory {
            required: self.min_history(),
            available: series.len(),
        };

        let close = series.last().ok_or_else(insufficient)?.close;
        let [.., prev, last] = snapshots.as_slice() else {
            return Err(insufficient());
        };
        let tail = CrossoverTail::from_snapshots(prev, last, close).ok_or_else(insufficient)?;

        let kind = decide(&tail, self.params.rsi_threshold);
        debug!(
            strategy = %self.name,
            close,
            short_ma = tail.short_ma,
            long_ma = tail.long_ma,
            rsi = tail.rsi,
            signal = %kind,
            "Strategy evaluated"
        );
        Ok(Signal { kind, price: close })
    }
}

/// The last two indicator rows with every value the decision reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossoverTail {
    pub prev_short_ma: f64,
    pub prev_long_ma: f64,
    pub short_ma: f64,
    pub long_ma: f64,
    pub rsi: f64,
    pub upper_band: f64,
    pub lower_band: f64,
    pub close: f64,
}

impl CrossoverTail {
    /// `None` if any value the decision needs is still undefined.
    pub fn from_snapshots(
        prev: &IndicatorSnapshot,
        last: &IndicatorSnapshot,
        close: f64,
    ) -> Option<Self> {
        Some(Self {
            prev_short_ma: prev.short_ma?,
            prev_long_ma: prev.long_ma?,
            short_ma: last.short_ma?,
            long_ma: last.long_ma?,
            rsi: last.rsi?,
            upper_band: last.upper_band?,
            lower_band: last.lower_band?,
            close,
        })
    }
}

/// Pure decision over the indicator tail. Buy is checked first, so it wins
/// if both rule sets ever hold at once.
pub fn decide(tail: &CrossoverTail, rsi_threshold: f64) -> SignalKind {
    let crossed_up = tail.prev_short_ma < tail.prev_long_ma && tail.short_ma > tail.long_ma;
    let crossed_down = tail.prev_short_ma > tail.prev_long_ma && tail.short_ma < tail.long_ma;

    if crossed_up && tail.rsi < rsi_threshold && tail.close < tail.lower_band {
        SignalKind::Buy
    } else if crossed_down && tail.rsi > 100.0 - rsi_threshold && tail.close > tail.upper_band {
        SignalKind::Sell
    } else {
        SignalKind::None
    }
}
