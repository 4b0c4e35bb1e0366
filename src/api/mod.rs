//! Exchange-facing capabilities.
//!
//! The trading cycle only sees these traits; `bitmex` and `bitmex_ws` provide
//! the live implementations and tests plug in a simulated exchange.

pub mod auth;
pub mod bitmex;
pub mod bitmex_ws;

use crate::models::{OpenOrder, OpenPosition, OrderIntent, PriceSample, PriceTick};
use crate::Result;
use async_trait::async_trait;
use futures_util::stream::BoxStream;

pub use auth::Credentials;
pub use bitmex::BitmexClient;
pub use bitmex_ws::BitmexPriceFeed;

/// Live tick subscription; dropping it unsubscribes
///
/// Transport failures and server-side closes are reported as
/// `BotError::StreamDisconnected` (or the stream simply ends); the watcher
/// resubscribes. `BotError::WatchAborted` ends the watch for good.
pub type TickStream = BoxStream<'static, Result<PriceTick>>;

/// Order placement and account queries
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Place a limit order, returning the exchange order id
    async fn place_limit_order(&self, order: &OrderIntent) -> Result<String>;

    async fn cancel_all_open_orders(&self, symbol: &str) -> Result<()>;

    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>>;

    /// Average fill price, or `BotError::OrderNotFilled`
    async fn get_filled_price(&self, order_id: &str) -> Result<f64>;

    async fn get_open_position(&self, symbol: &str) -> Result<Option<OpenPosition>>;

    async fn get_wallet_balance(&self) -> Result<f64>;
}

/// Per-minute price buckets, most recent first
#[async_trait]
pub trait PriceHistory: Send + Sync {
    async fn recent_prices(&self, symbol: &str, count: usize) -> Result<Vec<PriceSample>>;
}

/// Push subscription of last-price ticks
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn subscribe(&self, symbol: &str) -> Result<TickStream>;
}
