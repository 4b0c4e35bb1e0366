use crate::api::PriceFeed;
use crate::models::{PriceThresholds, WatchSignal};
use crate::{BotError, Result};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Check one tick against the watch thresholds
///
/// Buy is tested before sell, so a tick satisfying both resolves to
/// `BuyReached`. The timeout is only ever checked here, on tick arrival.
pub fn evaluate_tick(
    thresholds: &PriceThresholds,
    price: f64,
    elapsed: Duration,
) -> Option<WatchSignal> {
    if thresholds.buy_price.is_some_and(|buy| price <= buy) {
        return Some(WatchSignal::BuyReached);
    }
    if thresholds.sell_price.is_some_and(|sell| price >= sell) {
        return Some(WatchSignal::SellReached);
    }
    if thresholds.timeout.is_some_and(|timeout| elapsed >= timeout) {
        return Some(WatchSignal::TimeoutReached);
    }
    None
}

/// Blocks on the live feed until a threshold or the timeout fires
pub struct PriceWatcher {
    feed: Arc<dyn PriceFeed>,
    symbol: String,
    reconnect_delay: Duration,
}

impl PriceWatcher {
    pub fn new(feed: Arc<dyn PriceFeed>, symbol: &str, reconnect_delay: Duration) -> Self {
        Self {
            feed,
            symbol: symbol.to_string(),
            reconnect_delay,
        }
    }

    /// Watch ticks until exactly one exit condition holds
    ///
    /// Transport drops are absorbed here: the watcher resubscribes with the same
    /// thresholds and keeps measuring the timeout from the first call. An
    /// explicit close by the feed surfaces as `BotError::WatchAborted`.
    pub async fn watch(&self, thresholds: PriceThresholds) -> Result<WatchSignal> {
        let started = Instant::now();
        tracing::info!(
            symbol = %self.symbol,
            buy = ?thresholds.buy_price,
            sell = ?thresholds.sell_price,
            timeout = ?thresholds.timeout,
            "👀 Watching price"
        );

        loop {
            let mut ticks = match self.feed.subscribe(&self.symbol).await {
                Ok(ticks) => ticks,
                Err(BotError::StreamDisconnected(reason)) => {
                    tracing::warn!("Price feed subscription failed ({}), retrying", reason);
                    tokio::time::sleep(self.reconnect_delay).await;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let reason = loop {
                match ticks.next().await {
                    Some(Ok(tick)) => {
                        if tick.symbol != self.symbol {
                            continue;
                        }
                        tracing::debug!(price = tick.last_price, "tick");

                        if let Some(signal) =
                            evaluate_tick(&thresholds, tick.last_price, started.elapsed())
                        {
                            tracing::info!(
                                symbol = %self.symbol,
                                price = tick.last_price,
                                "Watch finished: {:?}",
                                signal
                            );
                            return Ok(signal);
                        }
                    }
                    Some(Err(BotError::StreamDisconnected(reason))) => break reason,
                    Some(Err(e)) => return Err(e),
                    None => break "stream ended".to_string(),
                }
            };

            drop(ticks);
            tracing::warn!(
                symbol = %self.symbol,
                elapsed_secs = started.elapsed().as_secs(),
                "Price feed disconnected ({}), resubscribing",
                reason
            );
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }
}
