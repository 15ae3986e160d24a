pub mod config;
pub mod indicators;
pub mod signal;

pub use config::StrategyParams;
pub use indicators::{IndicatorParams, IndicatorSnapshot};
pub use signal::CrossoverStrategy;

use common::{PriceSeries, Result, Signal};

/// All strategy implementations must satisfy this trait.
pub trait Strategy: Send + Sync {
    /// Human-readable name of this strategy instance.
    fn name(&self) -> &str;

    /// Fewest candles `evaluate` accepts.
    fn min_history(&self) -> usize;

    /// Evaluate the latest candles and produce a decision.
    ///
    /// Pure: the same series always yields the same signal. Fails with
    /// `Error::InsufficientHistory` when the series is shorter than
    /// `min_history`.
    fn evaluate(&self, series: &PriceSeries) -> Result<Signal>;
}
