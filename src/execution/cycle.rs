use super::price_watcher::PriceWatcher;
use crate::api::{OrderGateway, PriceFeed, PriceHistory};
use crate::models::{
    CycleRecord, FillRecord, OrderIntent, PriceThresholds, TradeCycleResult, WatchSignal,
};
use crate::notify::Notifier;
use crate::persistence::Ledger;
use crate::strategy::{average_entry_price, calculate_order_price, Offset, StabilityGate};
use crate::{BotError, GatewayError, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Trading parameters, fixed for the lifetime of a run
#[derive(Debug, Clone)]
pub struct TradingParams {
    pub symbol: String,
    pub stability: f64,
    pub profit_margin: f64,
    pub buy_extra_margin: f64,
    /// Unit order size in contracts
    pub order_size: i64,
    pub initial_buy_timeout: Duration,
    /// Per-minute buckets fetched for each stability poll
    pub history_depth: usize,
    pub chat_target: String,
}

/// Fixed delays of the cycle
#[derive(Debug, Clone, Copy)]
pub struct CycleTimings {
    pub unstable_retry: Duration,
    pub settle_delay: Duration,
    pub fill_retry_delay: Duration,
    pub reconnect_delay: Duration,
}

impl Default for CycleTimings {
    fn default() -> Self {
        Self {
            unstable_retry: Duration::from_secs(60),
            settle_delay: Duration::from_secs(10),
            fill_retry_delay: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

/// Collaborators injected into a cycle
#[derive(Clone)]
pub struct CycleDeps {
    pub gateway: Arc<dyn OrderGateway>,
    pub history: Arc<dyn PriceHistory>,
    pub feed: Arc<dyn PriceFeed>,
    pub ledger: Arc<dyn Ledger>,
    pub notifier: Arc<dyn Notifier>,
}

/// What a cycle has accumulated since its balance snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct CycleContext {
    pub pre_balance: f64,
    pub fills: Vec<FillRecord>,
}

/// How many unit lots the closing sell unwinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lots {
    Single,
    Double,
}

impl Lots {
    pub fn multiplier(self) -> i64 {
        match self {
            Lots::Single => 1,
            Lots::Double => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleState {
    Evaluate,
    PlaceInitial {
        ctx: CycleContext,
        reference_price: f64,
    },
    PlaceExtraAndSell {
        ctx: CycleContext,
        first_buy: f64,
    },
    AverageAndSell {
        ctx: CycleContext,
        first_buy: f64,
        second_buy: f64,
    },
    Settle {
        ctx: CycleContext,
        closing_order_id: String,
        lots: Lots,
    },
    /// Settled and written to the ledger; the next step starts over
    Done(TradeCycleResult),
}

impl CycleState {
    pub fn name(&self) -> &'static str {
        match self {
            CycleState::Evaluate => "EVALUATE",
            CycleState::PlaceInitial { .. } => "PLACE_INITIAL",
            CycleState::PlaceExtraAndSell { .. } => "PLACE_EXTRA_AND_SELL",
            CycleState::AverageAndSell { .. } => "AVERAGE_AND_SELL",
            CycleState::Settle { .. } => "SETTLE",
            CycleState::Done(_) => "DONE",
        }
    }
}

/// Buy → (extra buy | sell) → unwind state machine for one symbol
pub struct TradingCycle {
    params: TradingParams,
    timings: CycleTimings,
    deps: CycleDeps,
    gate: StabilityGate,
    watcher: PriceWatcher,
}

impl TradingCycle {
    pub fn new(params: TradingParams, timings: CycleTimings, deps: CycleDeps) -> Self {
        let gate = StabilityGate::new(params.stability);
        let watcher = PriceWatcher::new(deps.feed.clone(), &params.symbol, timings.reconnect_delay);
        Self {
            params,
            timings,
            deps,
            gate,
            watcher,
        }
    }

    pub fn params(&self) -> &TradingParams {
        &self.params
    }

    /// Run cycles forever; only a fatal error returns
    pub async fn run(&self) -> Result<()> {
        self.preflight().await?;

        let mut completed = 0u64;
        loop {
            let result = self.run_cycle().await?;
            completed += 1;
            tracing::info!(
                "✅ Cycle #{} complete: profit {:.8} XBT",
                completed,
                result.profit()
            );
        }
    }

    /// Run cycles until a fatal error, reporting it once through the notifier
    ///
    /// The error is returned so the caller can exit.
    pub async fn run_guarded(&self) -> Result<()> {
        let err = match self.run().await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        tracing::error!("Trading bot stopped: {}", err);
        if let Err(notify_err) = self
            .deps
            .notifier
            .notify(&self.params.chat_target, &format!("Trading bot stopped: {}", err))
            .await
        {
            tracing::warn!("Could not report fatal error: {}", notify_err);
        }
        Err(err)
    }

    /// Drive the machine from EVALUATE until one cycle settles
    pub async fn run_cycle(&self) -> Result<TradeCycleResult> {
        let mut state = CycleState::Evaluate;
        loop {
            state = match self.step(state).await? {
                CycleState::Done(result) => return Ok(result),
                next => next,
            };
        }
    }

    /// Execute one state's entry action and return the next state
    pub async fn step(&self, state: CycleState) -> Result<CycleState> {
        let name = state.name();
        tracing::debug!(state = name, "Entering state");

        match state {
            CycleState::Evaluate => self.evaluate().await,
            CycleState::PlaceInitial {
                ctx,
                reference_price,
            } => self.place_initial(ctx, reference_price).await,
            CycleState::PlaceExtraAndSell { ctx, first_buy } => {
                self.place_extra_and_sell(ctx, first_buy).await
            }
            CycleState::AverageAndSell {
                ctx,
                first_buy,
                second_buy,
            } => self.average_and_sell(ctx, first_buy, second_buy).await,
            CycleState::Settle {
                ctx,
                closing_order_id,
                lots,
            } => self.settle(ctx, closing_order_id, lots).await,
            CycleState::Done(_) => Ok(CycleState::Evaluate),
        }
    }

    /// Clean up whatever a previous run left on the exchange
    pub async fn preflight(&self) -> Result<()> {
        let symbol = &self.params.symbol;

        let stray = self.deps.gateway.get_open_orders(symbol).await?;
        if !stray.is_empty() {
            tracing::warn!(
                symbol = %symbol,
                "Found {} resting orders at startup, cancelling",
                stray.len()
            );
            self.deps.gateway.cancel_all_open_orders(symbol).await?;
        }

        if let Some(position) = self.deps.gateway.get_open_position(symbol).await? {
            tracing::warn!(
                symbol = %symbol,
                quantity = position.quantity,
                avg_entry_price = position.avg_entry_price,
                "Open position found at startup"
            );
            self.announce(&format!(
                "Open position at startup: {} contracts of {} at {}",
                position.quantity, symbol, position.avg_entry_price
            ))
            .await;
        }

        Ok(())
    }

    async fn evaluate(&self) -> Result<CycleState> {
        let samples = self
            .deps
            .history
            .recent_prices(&self.params.symbol, self.params.history_depth)
            .await?;
        let reading = match self.gate.evaluate(&samples) {
            Ok(reading) => reading,
            // Gaps in a thin market: not enough buckets to judge, try later
            Err(BotError::InsufficientHistory { needed, got }) => {
                tracing::warn!(
                    symbol = %self.params.symbol,
                    "Only {} of {} price buckets available, retrying in {:?}",
                    got,
                    needed,
                    self.timings.unstable_retry
                );
                tokio::time::sleep(self.timings.unstable_retry).await;
                return Ok(CycleState::Evaluate);
            }
            Err(e) => return Err(e),
        };

        if !reading.is_stable {
            tracing::info!(
                symbol = %self.params.symbol,
                deviation_score = reading.deviation_score,
                "Market unstable, retrying in {:?}",
                self.timings.unstable_retry
            );
            tokio::time::sleep(self.timings.unstable_retry).await;
            return Ok(CycleState::Evaluate);
        }

        let pre_balance = self.deps.gateway.get_wallet_balance().await?;
        tracing::info!(
            symbol = %self.params.symbol,
            deviation_score = reading.deviation_score,
            reference_price = reading.reference_price,
            pre_balance,
            "📊 Market stable"
        );

        Ok(CycleState::PlaceInitial {
            ctx: CycleContext {
                pre_balance,
                fills: Vec::new(),
            },
            reference_price: reading.reference_price,
        })
    }

    async fn place_initial(&self, mut ctx: CycleContext, reference_price: f64) -> Result<CycleState> {
        let buy_price =
            calculate_order_price(reference_price, self.params.profit_margin / 2.0, Offset::Below);
        let buy = self
            .place(OrderIntent::buy(
                &self.params.symbol,
                self.params.order_size,
                buy_price,
            ))
            .await?;

        let thresholds = PriceThresholds::default()
            .with_buy(buy_price)
            .with_timeout(self.params.initial_buy_timeout);

        match self.watcher.watch(thresholds).await? {
            WatchSignal::BuyReached => {
                let fill = self.confirm_fill(&buy, self.params.order_size).await?;
                let first_buy = fill.filled_price;
                ctx.fills.push(fill);
                self.announce(&format!(
                    "{} contracts bought at {}",
                    self.params.order_size, first_buy
                ))
                .await;
                Ok(CycleState::PlaceExtraAndSell { ctx, first_buy })
            }
            WatchSignal::TimeoutReached => {
                tracing::info!(
                    symbol = %self.params.symbol,
                    order_id = %buy,
                    "⏱️ Initial buy not reached in {:?}, abandoning cycle",
                    self.params.initial_buy_timeout
                );
                self.deps
                    .gateway
                    .cancel_all_open_orders(&self.params.symbol)
                    .await?;
                Ok(CycleState::Evaluate)
            }
            other => Err(BotError::UnexpectedSignal(other, "PLACE_INITIAL")),
        }
    }

    async fn place_extra_and_sell(&self, mut ctx: CycleContext, first_buy: f64) -> Result<CycleState> {
        let size = self.params.order_size;
        let extra_price =
            calculate_order_price(first_buy, self.params.buy_extra_margin, Offset::Below);
        let sell_price = calculate_order_price(first_buy, self.params.profit_margin, Offset::Above);

        let extra = self
            .place(OrderIntent::buy(&self.params.symbol, size, extra_price))
            .await?;
        let sell = self
            .place(OrderIntent::sell(&self.params.symbol, size, sell_price))
            .await?;

        let thresholds = PriceThresholds::default()
            .with_buy(extra_price)
            .with_sell(sell_price);

        match self.watcher.watch(thresholds).await? {
            WatchSignal::SellReached => {
                self.deps
                    .gateway
                    .cancel_all_open_orders(&self.params.symbol)
                    .await?;
                let fill = self.confirm_fill(&sell, -size).await?;
                self.announce(&format!("{} contracts sold at {}", size, fill.filled_price))
                    .await;
                ctx.fills.push(fill);
                Ok(CycleState::Settle {
                    ctx,
                    closing_order_id: sell,
                    lots: Lots::Single,
                })
            }
            WatchSignal::BuyReached => {
                self.deps
                    .gateway
                    .cancel_all_open_orders(&self.params.symbol)
                    .await?;
                let fill = self.confirm_fill(&extra, size).await?;
                let second_buy = fill.filled_price;
                self.announce(&format!("{} contracts bought at {}", size, second_buy))
                    .await;
                ctx.fills.push(fill);
                Ok(CycleState::AverageAndSell {
                    ctx,
                    first_buy,
                    second_buy,
                })
            }
            other => Err(BotError::UnexpectedSignal(other, "PLACE_EXTRA_AND_SELL")),
        }
    }

    async fn average_and_sell(
        &self,
        mut ctx: CycleContext,
        first_buy: f64,
        second_buy: f64,
    ) -> Result<CycleState> {
        let quantity = Lots::Double.multiplier() * self.params.order_size;
        let average = average_entry_price(first_buy, second_buy);
        let sell_price = calculate_order_price(average, self.params.profit_margin, Offset::Above);
        tracing::info!(
            symbol = %self.params.symbol,
            average_entry = average,
            "Averaged two buys"
        );

        let sell = self
            .place(OrderIntent::sell(&self.params.symbol, quantity, sell_price))
            .await?;

        let thresholds = PriceThresholds::default().with_sell(sell_price);
        match self.watcher.watch(thresholds).await? {
            WatchSignal::SellReached => {
                let fill = self.confirm_fill(&sell, -quantity).await?;
                self.announce(&format!(
                    "{} contracts sold at {}",
                    quantity, fill.filled_price
                ))
                .await;
                ctx.fills.push(fill);
                Ok(CycleState::Settle {
                    ctx,
                    closing_order_id: sell,
                    lots: Lots::Double,
                })
            }
            other => Err(BotError::UnexpectedSignal(other, "AVERAGE_AND_SELL")),
        }
    }

    async fn settle(
        &self,
        ctx: CycleContext,
        closing_order_id: String,
        lots: Lots,
    ) -> Result<CycleState> {
        tokio::time::sleep(self.timings.settle_delay).await;

        let post_balance = self.deps.gateway.get_wallet_balance().await?;
        let result = TradeCycleResult {
            pre_balance: ctx.pre_balance,
            post_balance,
            closing_order_id,
        };

        self.deps
            .ledger
            .record_cycle(&CycleRecord::new(ctx.fills, &result))
            .await?;

        tracing::info!(
            symbol = %self.params.symbol,
            lots = lots.multiplier(),
            pre_balance = result.pre_balance,
            post_balance = result.post_balance,
            "💰 Cycle settled"
        );
        self.announce(&format!(
            "Done trading, profit made: {} BTC",
            result.profit()
        ))
        .await;

        let leftover = self
            .deps
            .gateway
            .get_open_orders(&self.params.symbol)
            .await?;
        if !leftover.is_empty() {
            tracing::warn!(
                symbol = %self.params.symbol,
                "{} orders still resting after settle, cancelling",
                leftover.len()
            );
            self.deps
                .gateway
                .cancel_all_open_orders(&self.params.symbol)
                .await?;
        }

        Ok(CycleState::Done(result))
    }

    async fn place(&self, order: OrderIntent) -> Result<String> {
        let order_id = self.deps.gateway.place_limit_order(&order).await?;
        tracing::info!(
            symbol = %order.symbol,
            order_id = %order_id,
            quantity = order.signed_quantity,
            price = order.limit_price,
            "Placed {:?} order",
            order.side()
        );
        Ok(order_id)
    }

    /// Query the fill price, waiting once if the exchange has not caught up
    async fn confirm_fill(&self, order_id: &str, quantity: i64) -> Result<FillRecord> {
        let filled_price = match self.deps.gateway.get_filled_price(order_id).await {
            Ok(price) => price,
            Err(BotError::OrderNotFilled { .. }) => {
                tracing::warn!(
                    order_id = %order_id,
                    "Order not reported filled yet, retrying in {:?}",
                    self.timings.fill_retry_delay
                );
                tokio::time::sleep(self.timings.fill_retry_delay).await;

                match self.deps.gateway.get_filled_price(order_id).await {
                    Ok(price) => price,
                    Err(BotError::OrderNotFilled { order_id }) => {
                        return Err(GatewayError::Missing(format!(
                            "order {} still not filled after retry",
                            order_id
                        ))
                        .into())
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(e) => return Err(e),
        };

        Ok(FillRecord {
            order_id: order_id.to_string(),
            filled_price,
            filled_quantity: quantity,
            filled_at: Utc::now(),
        })
    }

    /// Send a chat message; failures are logged and never abort the cycle
    async fn announce(&self, text: &str) {
        if let Err(e) = self
            .deps
            .notifier
            .notify(&self.params.chat_target, text)
            .await
        {
            tracing::warn!("Failed to deliver notification: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lot_multiplier() {
        assert_eq!(Lots::Single.multiplier(), 1);
        assert_eq!(Lots::Double.multiplier(), 2);
    }

    #[test]
    fn test_state_names() {
        let ctx = CycleContext {
            pre_balance: 1.0,
            fills: vec![],
        };
        assert_eq!(CycleState::Evaluate.name(), "EVALUATE");
        assert_eq!(
            CycleState::PlaceInitial {
                ctx: ctx.clone(),
                reference_price: 20000.0
            }
            .name(),
            "PLACE_INITIAL"
        );
        assert_eq!(
            CycleState::Settle {
                ctx,
                closing_order_id: "x".into(),
                lots: Lots::Double
            }
            .name(),
            "SETTLE"
        );
    }

    #[test]
    fn test_default_timings() {
        let timings = CycleTimings::default();
        assert_eq!(timings.unstable_retry, Duration::from_secs(60));
        assert_eq!(timings.settle_delay, Duration::from_secs(10));
        assert_eq!(timings.fill_retry_delay, Duration::from_secs(10));
    }
}
