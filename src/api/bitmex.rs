use super::auth::Credentials;
use super::{OrderGateway, PriceHistory};
use crate::models::{OpenOrder, OpenPosition, OrderIntent, PriceSample};
use crate::{BotError, GatewayError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

pub const BITMEX_API_BASE: &str = "https://www.bitmex.com";
const API_PREFIX: &str = "/api/v1";
const MAX_RETRIES: u32 = 3;
const SATOSHIS_PER_XBT: f64 = 100_000_000.0;
/// Largest bucket page the exchange serves in one call
const MAX_BUCKET_COUNT: usize = 1000;

type BitmexRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// REST client for the BitMEX derivatives exchange
///
/// Cloneable; all clones share the rate limiter.
#[derive(Clone)]
pub struct BitmexClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
    rate_limiter: Arc<BitmexRateLimiter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    #[serde(rename = "orderID")]
    order_id: String,
    symbol: String,
    side: Option<String>,
    order_qty: Option<i64>,
    price: Option<f64>,
    avg_px: Option<f64>,
    ord_status: Option<String>,
}

impl OrderResponse {
    fn signed_quantity(&self) -> i64 {
        let qty = self.order_qty.unwrap_or(0).abs();
        match self.side.as_deref() {
            Some("Sell") => -qty,
            _ => qty,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionResponse {
    symbol: String,
    current_qty: Option<i64>,
    avg_entry_price: Option<f64>,
    #[serde(default)]
    is_open: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarginResponse {
    wallet_balance: i64,
}

#[derive(Debug, Deserialize)]
struct BucketResponse {
    timestamp: DateTime<Utc>,
    open: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl BitmexClient {
    /// Create a client against `base_url` (mainnet or testnet host)
    pub fn new(base_url: &str, credentials: Credentials, requests_per_minute: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(GatewayError::Http)?;

        let rpm = NonZeroU32::new(requests_per_minute).ok_or_else(|| {
            BotError::InvalidConfig("requests_per_minute must be positive".to_string())
        })?;
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            rate_limiter,
        })
    }

    fn build_url(&self, path: &str, query: &[(&str, String)]) -> std::result::Result<Url, GatewayError> {
        let mut url = Url::parse(&format!("{}{}{}", self.base_url, API_PREFIX, path))
            .map_err(|e| GatewayError::Request(e.to_string()))?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    /// Signed request; idempotent calls (`retry == true`) back off on 429/5xx
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
        retry: bool,
    ) -> std::result::Result<T, GatewayError> {
        let url = self.build_url(path, query)?;
        let signed_path = match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        };
        let body = match body {
            Some(value) => serde_json::to_string(&value)?,
            None => String::new(),
        };
        let attempts = if retry { MAX_RETRIES } else { 1 };

        for attempt in 1..=attempts {
            self.rate_limiter.until_ready().await;

            let mut builder = self.client.request(method.clone(), url.clone());
            // Public endpoints work without a key
            if !self.credentials.api_key().is_empty() {
                let headers = self
                    .credentials
                    .headers(method.as_str(), &signed_path, &body)?;
                builder = builder
                    .header("api-expires", headers.api_expires.as_str())
                    .header("api-key", headers.api_key.as_str())
                    .header("api-signature", headers.api_signature.as_str());
            }
            if !body.is_empty() {
                builder = builder
                    .header(CONTENT_TYPE, "application/json")
                    .body(body.clone());
            }

            tracing::debug!(method = %method, path = %signed_path, "BitMEX request");

            let response = match builder.send().await {
                Ok(response) => response,
                Err(e) if attempt < attempts => {
                    let backoff_secs = 2u64.pow(attempt);
                    tracing::warn!(
                        "Network error: {}, retrying in {}s (attempt {}/{})",
                        e,
                        backoff_secs,
                        attempt,
                        attempts
                    );
                    sleep(Duration::from_secs(backoff_secs)).await;
                    continue;
                }
                Err(e) => return Err(GatewayError::Http(e)),
            };

            let status = response.status();
            if status.is_success() {
                let text = response.text().await?;
                return Ok(serde_json::from_str(&text)?);
            }

            if (status.as_u16() == 429 || status.is_server_error()) && attempt < attempts {
                let backoff_secs = 2u64.pow(attempt);
                tracing::warn!(
                    "BitMEX returned {}, backing off for {}s (attempt {}/{})",
                    status,
                    backoff_secs,
                    attempt,
                    attempts
                );
                sleep(Duration::from_secs(backoff_secs)).await;
                continue;
            }

            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Err(GatewayError::Missing(format!(
            "{} {} failed after {} attempts",
            method, path, attempts
        )))
    }
}

#[async_trait]
impl OrderGateway for BitmexClient {
    async fn place_limit_order(&self, order: &OrderIntent) -> Result<String> {
        let body = serde_json::json!({
            "symbol": order.symbol,
            "ordType": "Limit",
            "orderQty": order.signed_quantity,
            "price": order.limit_price,
        });

        let response: OrderResponse = self
            .request(Method::POST, "/order", &[], Some(body), false)
            .await?;

        tracing::info!(
            order_id = %response.order_id,
            symbol = %order.symbol,
            quantity = order.signed_quantity,
            price = order.limit_price,
            "Limit order placed"
        );

        Ok(response.order_id)
    }

    async fn cancel_all_open_orders(&self, symbol: &str) -> Result<()> {
        let body = serde_json::json!({ "symbol": symbol });
        let cancelled: Vec<serde_json::Value> = self
            .request(Method::DELETE, "/order/all", &[], Some(body), false)
            .await?;

        tracing::info!(symbol = %symbol, cancelled = cancelled.len(), "Cancelled open orders");
        Ok(())
    }

    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>> {
        let query = [
            ("symbol", symbol.to_string()),
            ("filter", r#"{"open":true}"#.to_string()),
        ];
        let orders: Vec<OrderResponse> = self
            .request(Method::GET, "/order", &query, None, true)
            .await?;

        Ok(orders
            .into_iter()
            .map(|o| OpenOrder {
                signed_quantity: o.signed_quantity(),
                price: o.price.unwrap_or(0.0),
                order_id: o.order_id,
                symbol: o.symbol,
            })
            .collect())
    }

    async fn get_filled_price(&self, order_id: &str) -> Result<f64> {
        let query = [("filter", serde_json::json!({ "orderID": order_id }).to_string())];
        let orders: Vec<OrderResponse> = self
            .request(Method::GET, "/order", &query, None, true)
            .await?;

        let order = orders
            .into_iter()
            .find(|o| o.order_id == order_id)
            .ok_or_else(|| GatewayError::Missing(format!("order {} not found", order_id)))?;

        match (order.ord_status.as_deref(), order.avg_px.or(order.price)) {
            (Some("Filled"), Some(price)) => Ok(price),
            _ => Err(BotError::OrderNotFilled {
                order_id: order_id.to_string(),
            }),
        }
    }

    async fn get_open_position(&self, symbol: &str) -> Result<Option<OpenPosition>> {
        let query = [("filter", serde_json::json!({ "symbol": symbol }).to_string())];
        let positions: Vec<PositionResponse> = self
            .request(Method::GET, "/position", &query, None, true)
            .await?;

        Ok(positions
            .into_iter()
            .find(|p| p.symbol == symbol && p.is_open && p.current_qty.unwrap_or(0) != 0)
            .map(|p| OpenPosition {
                symbol: p.symbol,
                avg_entry_price: p.avg_entry_price.unwrap_or(0.0),
                quantity: p.current_qty.unwrap_or(0),
            }))
    }

    async fn get_wallet_balance(&self) -> Result<f64> {
        let query = [("currency", "XBt".to_string())];
        let margin: MarginResponse = self
            .request(Method::GET, "/user/margin", &query, None, true)
            .await?;

        Ok(margin.wallet_balance as f64 / SATOSHIS_PER_XBT)
    }
}

#[async_trait]
impl PriceHistory for BitmexClient {
    async fn recent_prices(&self, symbol: &str, count: usize) -> Result<Vec<PriceSample>> {
        let query = [
            ("binSize", "1m".to_string()),
            ("symbol", symbol.to_string()),
            ("reverse", "true".to_string()),
            ("count", count.min(MAX_BUCKET_COUNT).to_string()),
        ];
        let buckets: Vec<BucketResponse> = self
            .request(Method::GET, "/trade/bucketed", &query, None, true)
            .await?;

        let fetched = buckets.len();
        let samples: Vec<PriceSample> = buckets
            .into_iter()
            .filter_map(|b| {
                b.open.map(|price| PriceSample {
                    timestamp: b.timestamp,
                    price,
                })
            })
            .collect();

        tracing::debug!(
            symbol = %symbol,
            samples = samples.len(),
            dropped = fetched - samples.len(),
            "Fetched price history"
        );
        Ok(samples)
    }
}
