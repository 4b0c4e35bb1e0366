/// Trailing moving-average series
///
/// Window `i` averages `prices[i..i + period]`, so the output keeps the
/// ordering of the input (most-recent-first in, most-recent-first out) and
/// has `prices.len() - period + 1` points.
pub fn moving_average_series(prices: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || prices.len() < period {
        return Vec::new();
    }

    prices
        .windows(period)
        .map(|window| window.iter().sum::<f64>() / period as f64)
        .collect()
}

/// Population standard deviation (divides by N)
pub fn population_std_dev(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    Some(variance.sqrt())
}
