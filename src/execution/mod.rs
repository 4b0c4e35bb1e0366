// Order lifecycle
pub mod cycle;
pub mod price_watcher;

pub use cycle::{CycleContext, CycleDeps, CycleState, CycleTimings, Lots, TradingCycle, TradingParams};
pub use price_watcher::{evaluate_tick, PriceWatcher};
