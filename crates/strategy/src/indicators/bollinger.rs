//! Bollinger Bands.
//!
//! - Middle: trailing SMA over `window` closes
//! - Upper:  middle + `std_factor` × σ
//! - Lower:  middle − `std_factor` × σ
//!
//! σ is the population standard deviation (divides by N, not N-1).

use super::sma::mean;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

pub fn bollinger(closes: &[f64], window: usize, std_factor: f64) -> Vec<Option<Bands>> {
    if window == 0 {
        return vec![None; closes.len()];
    }
    (0..closes.len())
        .map(|i| {
            if i + 1 < window {
                return None;
            }
            let slice = &closes[i + 1 - window..=i];
            let middle = mean(slice);
            let variance = slice
                .iter()
                .map(|c| {
                    let diff = c - middle;
                    diff * diff
                })
                .sum::<f64>()
                / window as f64;
            let stddev = variance.sqrt();
            Some(Bands {
                upper: middle + std_factor * stddev,
                middle,
                lower: middle - std_factor * stddev,
            })
        })
        .collect()
}
