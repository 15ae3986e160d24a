/// RSI (Relative Strength Index).
///
/// Average gain and average loss are plain trailing means of the last
/// `period` close-to-close changes (no Wilder smoothing). Entry `i` is
/// defined once `period` changes exist, i.e. from index `period`.
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut values = vec![None; closes.len()];
    if period == 0 {
        return values;
    }

    for i in period..closes.len() {
        let (gain, loss) = closes[i - period..=i]
            .windows(2)
            .map(|w| w[1] - w[0])
            .fold((0.0, 0.0), |(gain, loss), change| {
                if change > 0.0 {
                    (gain + change, loss)
                } else {
                    (gain, loss - change)
                }
            });
        values[i] = Some(from_averages(gain / period as f64, loss / period as f64));
    }
    values
}

/// RSI from average gain and loss. No losses at all reads as 100 rather
/// than dividing by zero.
pub fn from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    (100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
}
