//! Simulated exchange for driving the trading cycle without a network.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use futures_util::stream::{self, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use swingbot::api::{OrderGateway, PriceFeed, PriceHistory, TickStream};
use swingbot::execution::{CycleDeps, CycleTimings, TradingCycle, TradingParams};
use swingbot::notify::Notifier;
use swingbot::persistence::MemoryLedger;
use swingbot::{
    BotError, GatewayError, OpenOrder, OpenPosition, OrderIntent, PriceSample, PriceTick, Result,
};

pub const SYMBOL: &str = "XBTUSD";

/// Balance change per contract and unit of price
const BALANCE_PER_CONTRACT_PRICE: f64 = 1e-6;

/// One step of a scripted feed connection
#[derive(Debug, Clone)]
pub enum FeedStep {
    Tick(f64),
    /// Tick for a different instrument on the same connection
    Foreign(&'static str, f64),
    Wait(Duration),
    Disconnect,
    Close,
}

#[derive(Debug, Default)]
pub struct SimState {
    next_id: u64,
    pub placed: Vec<(String, OrderIntent)>,
    pub open: Vec<OpenOrder>,
    pub filled: HashMap<String, f64>,
    pub balance: f64,
    pub fail_balance: bool,
    pub position: Option<OpenPosition>,
    pub cancel_calls: usize,
    ignored_cancels: usize,
    unfilled_reports: HashMap<String, usize>,
    pub fill_queries: Vec<String>,
    histories: VecDeque<Vec<f64>>,
    pub history_calls: usize,
    scripts: VecDeque<Vec<FeedStep>>,
    subscribe_failures: usize,
    pub subscribe_calls: usize,
    /// Resting orders at the moment each feed subscription opened
    pub orders_at_subscribe: Vec<Vec<OpenOrder>>,
    /// Number of resting orders each open-order query found
    pub open_order_checks: Vec<usize>,
}

impl SimState {
    fn apply_tick(&mut self, price: f64) {
        let (crossed, resting): (Vec<OpenOrder>, Vec<OpenOrder>) =
            self.open.drain(..).partition(|order| {
                if order.signed_quantity > 0 {
                    price <= order.price
                } else {
                    price >= order.price
                }
            });
        self.open = resting;

        for order in crossed {
            self.balance -= order.signed_quantity as f64 * order.price * BALANCE_PER_CONTRACT_PRICE;
            self.filled.insert(order.order_id, order.price);
        }
    }
}

/// In-memory exchange implementing every capability the cycle needs
///
/// Resting buys fill at their limit when a tick trades at or below it, sells
/// when a tick trades at or above it.
#[derive(Clone)]
pub struct SimExchange {
    state: Arc<Mutex<SimState>>,
}

impl SimExchange {
    pub fn new(balance: f64) -> Self {
        let state = SimState {
            balance,
            ..SimState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap()
    }

    /// Queue a history answer; the last one keeps being served
    pub fn push_history(&self, prices: Vec<f64>) {
        self.state().histories.push_back(prices);
    }

    /// Queue the steps of the next feed connection
    pub fn push_script(&self, steps: Vec<FeedStep>) {
        self.state().scripts.push_back(steps);
    }

    pub fn fail_subscriptions(&self, count: usize) {
        self.state().subscribe_failures = count;
    }

    /// The next `times` fill queries for `order_id` report it as not filled
    pub fn report_unfilled(&self, order_id: &str, times: usize) {
        self.state()
            .unfilled_reports
            .insert(order_id.to_string(), times);
    }

    /// The next `count` cancel calls leave the resting orders in place
    pub fn ignore_cancels(&self, count: usize) {
        self.state().ignored_cancels = count;
    }

    pub fn add_resting_order(&self, signed_quantity: i64, price: f64) {
        let mut state = self.state();
        state.next_id += 1;
        let order_id = format!("stray-{}", state.next_id);
        state.open.push(OpenOrder {
            order_id,
            symbol: SYMBOL.to_string(),
            signed_quantity,
            price,
        });
    }

    pub fn placed(&self) -> Vec<OrderIntent> {
        self.state()
            .placed
            .iter()
            .map(|(_, order)| order.clone())
            .collect()
    }

    pub fn open_orders(&self) -> Vec<OpenOrder> {
        self.state().open.clone()
    }
}

#[async_trait]
impl OrderGateway for SimExchange {
    async fn place_limit_order(&self, order: &OrderIntent) -> Result<String> {
        let mut state = self.state();
        state.next_id += 1;
        let order_id = format!("order-{}", state.next_id);
        state.placed.push((order_id.clone(), order.clone()));
        state.open.push(OpenOrder {
            order_id: order_id.clone(),
            symbol: order.symbol.clone(),
            signed_quantity: order.signed_quantity,
            price: order.limit_price,
        });
        Ok(order_id)
    }

    async fn cancel_all_open_orders(&self, symbol: &str) -> Result<()> {
        let mut state = self.state();
        state.cancel_calls += 1;
        if state.ignored_cancels > 0 {
            state.ignored_cancels -= 1;
            return Ok(());
        }
        state.open.retain(|order| order.symbol != symbol);
        Ok(())
    }

    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>> {
        let mut state = self.state();
        let open: Vec<OpenOrder> = state
            .open
            .iter()
            .filter(|order| order.symbol == symbol)
            .cloned()
            .collect();
        state.open_order_checks.push(open.len());
        Ok(open)
    }

    async fn get_filled_price(&self, order_id: &str) -> Result<f64> {
        let mut state = self.state();
        state.fill_queries.push(order_id.to_string());

        if let Some(remaining) = state.unfilled_reports.get_mut(order_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BotError::OrderNotFilled {
                    order_id: order_id.to_string(),
                });
            }
        }

        if let Some(price) = state.filled.get(order_id) {
            return Ok(*price);
        }
        if state.placed.iter().any(|(id, _)| id == order_id) {
            return Err(BotError::OrderNotFilled {
                order_id: order_id.to_string(),
            });
        }
        Err(GatewayError::Missing(format!("order {} not found", order_id)).into())
    }

    async fn get_open_position(&self, _symbol: &str) -> Result<Option<OpenPosition>> {
        Ok(self.state().position.clone())
    }

    async fn get_wallet_balance(&self) -> Result<f64> {
        let state = self.state();
        if state.fail_balance {
            return Err(GatewayError::Api {
                status: 503,
                message: "The system is currently overloaded".to_string(),
            }
            .into());
        }
        Ok(state.balance)
    }
}

#[async_trait]
impl PriceHistory for SimExchange {
    async fn recent_prices(&self, _symbol: &str, count: usize) -> Result<Vec<PriceSample>> {
        let mut state = self.state();
        state.history_calls += 1;
        let prices = if state.histories.len() > 1 {
            state.histories.pop_front().unwrap_or_default()
        } else {
            state.histories.front().cloned().unwrap_or_default()
        };

        let now = Utc::now();
        Ok(prices
            .into_iter()
            .take(count)
            .enumerate()
            .map(|(i, price)| PriceSample {
                timestamp: now - ChronoDuration::minutes(i as i64),
                price,
            })
            .collect())
    }
}

#[async_trait]
impl PriceFeed for SimExchange {
    async fn subscribe(&self, symbol: &str) -> Result<TickStream> {
        let steps = {
            let mut state = self.state();
            state.subscribe_calls += 1;
            if state.subscribe_failures > 0 {
                state.subscribe_failures -= 1;
                return Err(BotError::StreamDisconnected(
                    "connection refused".to_string(),
                ));
            }
            let resting = state.open.clone();
            state.orders_at_subscribe.push(resting);
            // Nothing left to replay: end the watch instead of hanging
            state
                .scripts
                .pop_front()
                .unwrap_or_else(|| vec![FeedStep::Close])
        };

        Ok(scripted_stream(
            symbol.to_string(),
            steps.into(),
            self.state.clone(),
        ))
    }
}

fn scripted_stream(
    symbol: String,
    steps: VecDeque<FeedStep>,
    state: Arc<Mutex<SimState>>,
) -> TickStream {
    stream::unfold((steps, state), move |(mut steps, state)| {
        let symbol = symbol.clone();
        async move {
            loop {
                let step = match steps.pop_front() {
                    Some(step) => step,
                    None => return None,
                };
                let item = match step {
                    FeedStep::Wait(duration) => {
                        tokio::time::sleep(duration).await;
                        continue;
                    }
                    FeedStep::Tick(price) => {
                        state.lock().unwrap().apply_tick(price);
                        Ok(PriceTick {
                            symbol: symbol.clone(),
                            last_price: price,
                        })
                    }
                    FeedStep::Foreign(other, price) => Ok(PriceTick {
                        symbol: other.to_string(),
                        last_price: price,
                    }),
                    FeedStep::Disconnect => {
                        Err(BotError::StreamDisconnected("simulated drop".to_string()))
                    }
                    FeedStep::Close => Err(BotError::WatchAborted),
                };
                return Some((item, (steps, state)));
            }
        }
    })
    .boxed()
}

/// Notifier that keeps every message, optionally failing each delivery
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    messages: Arc<Mutex<Vec<(String, String)>>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn targets(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|(target, _)| target.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, chat_target: &str, text: &str) -> Result<()> {
        self.messages
            .lock()
            .unwrap()
            .push((chat_target.to_string(), text.to_string()));
        if self.fail {
            return Err(BotError::Notify("chat unreachable".to_string()));
        }
        Ok(())
    }
}

pub fn params() -> TradingParams {
    TradingParams {
        symbol: SYMBOL.to_string(),
        stability: 1000.0,
        profit_margin: 0.01,
        buy_extra_margin: 0.005,
        order_size: 1,
        initial_buy_timeout: Duration::from_secs(3600),
        history_depth: 30,
        chat_target: "trading-chat".to_string(),
    }
}

/// Flat market, stable with a reference price of 20000
pub fn flat_history() -> Vec<f64> {
    vec![20010.0; 30]
}

/// Steady climb of 100 per minute, far too volatile to trade
pub fn trending_history() -> Vec<f64> {
    (0..30).map(|i| 23000.0 - 100.0 * i as f64).collect()
}

pub struct Harness {
    pub exchange: SimExchange,
    pub ledger: MemoryLedger,
    pub notifier: RecordingNotifier,
    pub cycle: TradingCycle,
}

impl Harness {
    pub fn new(exchange: SimExchange) -> Self {
        Self::with(exchange, params(), RecordingNotifier::default())
    }

    pub fn with(exchange: SimExchange, params: TradingParams, notifier: RecordingNotifier) -> Self {
        let ledger = MemoryLedger::new();
        let deps = CycleDeps {
            gateway: Arc::new(exchange.clone()),
            history: Arc::new(exchange.clone()),
            feed: Arc::new(exchange.clone()),
            ledger: Arc::new(ledger.clone()),
            notifier: Arc::new(notifier.clone()),
        };
        let cycle = TradingCycle::new(params, CycleTimings::default(), deps);
        Self {
            exchange,
            ledger,
            notifier,
            cycle,
        }
    }
}
