//! Layered runtime settings.
//!
//! Sources, lowest precedence first: built-in defaults, `config/default.toml`,
//! the file given with `--config`, then `SWINGBOT_*` environment variables
//! (`__` separates sections, e.g. `SWINGBOT_EXCHANGE__API_SECRET`).

use crate::api::bitmex::BITMEX_API_BASE;
use crate::api::bitmex_ws::BITMEX_WS_URL;
use crate::execution::{CycleTimings, TradingParams};
use crate::notify::telegram::TELEGRAM_API_BASE;
use crate::strategy::MA_WINDOW;
use crate::{BotError, Result};
use ::config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const ENV_PREFIX: &str = "SWINGBOT";
const DEFAULT_FILE: &str = "config/default";

/// Chat target used when no Telegram chat is configured
pub const LOG_CHAT_TARGET: &str = "log";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub trading: TradingSettings,
    pub timings: TimingSettings,
    pub exchange: ExchangeSettings,
    pub telegram: Option<TelegramSettings>,
    pub database: Option<DatabaseSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingSettings {
    pub symbol: String,
    pub stability: f64,
    pub profit_margin: f64,
    pub buy_extra_margin: f64,
    pub order_size: i64,
    pub initial_buy_timeout_secs: u64,
    pub history_depth: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimingSettings {
    pub unstable_retry_secs: u64,
    pub settle_delay_secs: u64,
    pub fill_retry_delay_secs: u64,
    pub reconnect_delay_secs: u64,
}

#[derive(Clone, Deserialize)]
pub struct ExchangeSettings {
    pub rest_url: String,
    pub ws_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    pub requests_per_minute: u32,
}

impl std::fmt::Debug for ExchangeSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeSettings")
            .field("rest_url", &self.rest_url)
            .field("ws_url", &self.ws_url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("requests_per_minute", &self.requests_per_minute)
            .finish()
    }
}

#[derive(Clone, Deserialize)]
pub struct TelegramSettings {
    pub bot_token: String,
    pub chat_id: String,
    #[serde(default = "default_telegram_url")]
    pub api_url: String,
}

impl std::fmt::Debug for TelegramSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSettings")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .field("api_url", &self.api_url)
            .finish()
    }
}

fn default_telegram_url() -> String {
    TELEGRAM_API_BASE.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
}

impl Settings {
    /// Load settings from every source and validate them
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Self::defaults()?
            .add_source(File::with_name(DEFAULT_FILE).required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn defaults() -> Result<::config::ConfigBuilder<::config::builder::DefaultState>> {
        Ok(Config::builder()
            .set_default("trading.symbol", "XBTUSD")?
            .set_default("trading.stability", 1000.0)?
            .set_default("trading.profit_margin", 0.01)?
            .set_default("trading.buy_extra_margin", 0.005)?
            .set_default("trading.order_size", 1i64)?
            .set_default("trading.initial_buy_timeout_secs", 1800i64)?
            .set_default("trading.history_depth", 30i64)?
            .set_default("timings.unstable_retry_secs", 60i64)?
            .set_default("timings.settle_delay_secs", 10i64)?
            .set_default("timings.fill_retry_delay_secs", 10i64)?
            .set_default("timings.reconnect_delay_secs", 1i64)?
            .set_default("exchange.rest_url", BITMEX_API_BASE)?
            .set_default("exchange.ws_url", BITMEX_WS_URL)?
            .set_default("exchange.requests_per_minute", 60i64)?)
    }

    pub fn validate(&self) -> Result<()> {
        let trading = &self.trading;
        let invalid = |msg: String| -> Result<()> { Err(BotError::InvalidConfig(msg)) };

        if trading.symbol.trim().is_empty() {
            return invalid("trading.symbol must not be empty".to_string());
        }
        if trading.stability.is_nan() || trading.stability <= 0.0 {
            return invalid(format!(
                "trading.stability must be positive, got {}",
                trading.stability
            ));
        }
        for (name, margin) in [
            ("trading.profit_margin", trading.profit_margin),
            ("trading.buy_extra_margin", trading.buy_extra_margin),
        ] {
            if margin.is_nan() || margin <= 0.0 || margin >= 1.0 {
                return invalid(format!("{} must be in (0, 1), got {}", name, margin));
            }
        }
        if trading.order_size <= 0 {
            return invalid(format!(
                "trading.order_size must be positive, got {}",
                trading.order_size
            ));
        }
        let needed = 2 * MA_WINDOW - 1;
        if trading.history_depth < needed {
            return invalid(format!(
                "trading.history_depth must be at least {}, got {}",
                needed, trading.history_depth
            ));
        }
        if self.exchange.requests_per_minute == 0 {
            return invalid("exchange.requests_per_minute must be positive".to_string());
        }

        Ok(())
    }

    pub fn chat_target(&self) -> String {
        self.telegram
            .as_ref()
            .map(|t| t.chat_id.clone())
            .unwrap_or_else(|| LOG_CHAT_TARGET.to_string())
    }

    pub fn trading_params(&self) -> TradingParams {
        let trading = &self.trading;
        TradingParams {
            symbol: trading.symbol.clone(),
            stability: trading.stability,
            profit_margin: trading.profit_margin,
            buy_extra_margin: trading.buy_extra_margin,
            order_size: trading.order_size,
            initial_buy_timeout: Duration::from_secs(trading.initial_buy_timeout_secs),
            history_depth: trading.history_depth,
            chat_target: self.chat_target(),
        }
    }

    pub fn cycle_timings(&self) -> CycleTimings {
        let timings = &self.timings;
        CycleTimings {
            unstable_retry: Duration::from_secs(timings.unstable_retry_secs),
            settle_delay: Duration::from_secs(timings.settle_delay_secs),
            fill_retry_delay: Duration::from_secs(timings.fill_retry_delay_secs),
            reconnect_delay: Duration::from_secs(timings.reconnect_delay_secs),
        }
    }
}
