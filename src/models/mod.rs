use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Per-minute price bucket from the history feed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceSample {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// Output of one stability poll
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityReading {
    pub is_stable: bool,
    pub reference_price: f64,
    pub deviation_score: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

/// A limit order about to be submitted
///
/// Positive quantity buys, negative quantity sells.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub symbol: String,
    pub signed_quantity: i64,
    pub limit_price: f64,
}

impl OrderIntent {
    pub fn buy(symbol: &str, quantity: i64, limit_price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            signed_quantity: quantity.abs(),
            limit_price,
        }
    }

    pub fn sell(symbol: &str, quantity: i64, limit_price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            signed_quantity: -quantity.abs(),
            limit_price,
        }
    }

    pub fn side(&self) -> Side {
        if self.signed_quantity >= 0 {
            Side::Buy
        } else {
            Side::Sell
        }
    }
}

/// Confirmed execution of a placed order
///
/// This is also the "executed order" record kind written to the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FillRecord {
    pub order_id: String,
    pub filled_price: f64,
    pub filled_quantity: i64,
    pub filled_at: DateTime<Utc>,
}

/// Exit conditions for a single price watch
///
/// `None` means the condition can never fire.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PriceThresholds {
    pub buy_price: Option<f64>,
    pub sell_price: Option<f64>,
    pub timeout: Option<Duration>,
}

impl PriceThresholds {
    pub fn with_buy(mut self, price: f64) -> Self {
        self.buy_price = Some(price);
        self
    }

    pub fn with_sell(mut self, price: f64) -> Self {
        self.sell_price = Some(price);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Which exit condition ended a price watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchSignal {
    BuyReached,
    SellReached,
    TimeoutReached,
}

/// Live last-price event for a symbol
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTick {
    pub symbol: String,
    pub last_price: f64,
}

/// Resting order as reported by the exchange
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrder {
    pub order_id: String,
    pub symbol: String,
    pub signed_quantity: i64,
    pub price: f64,
}

/// Currently held position for a symbol
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub symbol: String,
    pub avg_entry_price: f64,
    pub quantity: i64,
}

/// Balance bookkeeping of one completed cycle
#[derive(Debug, Clone, PartialEq)]
pub struct TradeCycleResult {
    pub pre_balance: f64,
    pub post_balance: f64,
    pub closing_order_id: String,
}

impl TradeCycleResult {
    pub fn profit(&self) -> f64 {
        self.post_balance - self.pre_balance
    }
}

/// Balance snapshot record kind of the ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BalanceSnapshot {
    pub id: Uuid,
    pub balance_before: f64,
    pub balance_after: f64,
    pub timestamp: DateTime<Utc>,
    pub closing_order_id: String,
}

/// Everything a completed cycle writes to the ledger, in one unit
#[derive(Debug, Clone, PartialEq)]
pub struct CycleRecord {
    pub fills: Vec<FillRecord>,
    pub snapshot: BalanceSnapshot,
}

impl CycleRecord {
    pub fn new(fills: Vec<FillRecord>, result: &TradeCycleResult) -> Self {
        Self {
            fills,
            snapshot: BalanceSnapshot {
                id: Uuid::new_v4(),
                balance_before: result.pre_balance,
                balance_after: result.post_balance,
                timestamp: Utc::now(),
                closing_order_id: result.closing_order_id.clone(),
            },
        }
    }
}
