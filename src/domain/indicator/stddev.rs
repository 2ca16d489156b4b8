//! Population standard deviation of closes (divides by N).

use crate::domain::bar::PriceBar;

/// `(mean, stddev)` of the closes in `window`.
pub(crate) fn window_stddev(window: &[PriceBar]) -> (f64, f64) {
    let n = window.len() as f64;
    let mean: f64 = window.iter().map(|b| b.close).sum::<f64>() / n;
    let variance: f64 = window
        .iter()
        .map(|b| {
            let diff = b.close - mean;
            diff * diff
        })
        .sum::<f64>()
        / n;
    (mean, variance.sqrt())
}
