/// Simple moving average over a trailing window of closes.
///
/// Entry `i` is the mean of `closes[i + 1 - window..=i]`, or `None` while
/// fewer than `window` closes are available.
pub fn sma(closes: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; closes.len()];
    }
    (0..closes.len())
        .map(|i| (i + 1 >= window).then(|| mean(&closes[i + 1 - window..=i])))
        .collect()
}

/// Arithmetic mean. Shared with the Bollinger middle band so both produce
/// bit-identical values for the same window.
pub(crate) fn mean(window: &[f64]) -> f64 {
    window.iter().sum::<f64>() / window.len() as f64
}
