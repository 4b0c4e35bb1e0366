use crate::indicators::{moving_average_series, population_std_dev};
use crate::models::{PriceSample, StabilityReading};
use crate::strategy::pricing::round_to;
use crate::{BotError, Result};

/// Moving-average window, in per-minute samples
pub const MA_WINDOW: usize = 10;

/// Downward offset of the reference price relative to the latest average
pub const REFERENCE_OFFSET: f64 = 0.0005;

/// Volatility gate deciding whether the market is calm enough to enter
///
/// The deviation of the last `MA_WINDOW` moving-average points is divided by
/// `ma0 / stability`, so the score does not grow with the asset's price level.
/// The market is stable when the score is below 1.
#[derive(Debug, Clone)]
pub struct StabilityGate {
    stability: f64,
    window: usize,
}

impl StabilityGate {
    pub fn new(stability: f64) -> Self {
        Self {
            stability,
            window: MA_WINDOW,
        }
    }

    /// Number of samples needed for a defined reading
    pub fn min_samples(&self) -> usize {
        2 * self.window - 1
    }

    /// Evaluate per-minute samples ordered most-recent-first
    pub fn evaluate(&self, samples: &[PriceSample]) -> Result<StabilityReading> {
        let prices: Vec<f64> = samples.iter().map(|s| s.price).collect();
        self.evaluate_prices(&prices)
    }

    pub fn evaluate_prices(&self, prices: &[f64]) -> Result<StabilityReading> {
        if prices.len() < self.min_samples() {
            return Err(BotError::InsufficientHistory {
                needed: self.min_samples(),
                got: prices.len(),
            });
        }

        let averages = moving_average_series(prices, self.window);
        let ma0 = averages[0];
        let spread = population_std_dev(&averages[..self.window]).unwrap_or(0.0);

        let deviation_score = spread / (ma0 / self.stability);
        let reference_price = round_to(ma0 - REFERENCE_OFFSET * ma0, 0);

        Ok(StabilityReading {
            is_stable: deviation_score < 1.0,
            reference_price,
            deviation_score,
        })
    }
}
