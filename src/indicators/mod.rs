// Technical indicators module
pub mod moving_average;

pub use moving_average::{moving_average_series, population_std_dev};
