use super::{PriceFeed, TickStream};
use crate::models::PriceTick;
use crate::{BotError, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message;

pub const BITMEX_WS_URL: &str = "wss://ws.bitmex.com/realtime";

/// Realtime instrument feed, one websocket connection per subscription
#[derive(Debug, Clone)]
pub struct BitmexPriceFeed {
    ws_url: String,
}

#[derive(Debug, Deserialize)]
struct TableMessage {
    table: Option<String>,
    #[serde(default)]
    data: Vec<InstrumentUpdate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentUpdate {
    symbol: String,
    last_price: Option<f64>,
}

impl BitmexPriceFeed {
    pub fn new(ws_url: &str) -> Self {
        Self {
            ws_url: ws_url.trim_end_matches('/').to_string(),
        }
    }

    fn subscription_url(&self, symbol: &str) -> String {
        format!("{}?subscribe=instrument:{}", self.ws_url, symbol)
    }
}

/// Extract the latest last-price for `symbol` from an instrument table message
///
/// Welcome banners, subscription acks and updates without a price yield `None`.
fn parse_instrument_message(text: &str, symbol: &str) -> Option<PriceTick> {
    let message: TableMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!("Ignoring unparseable feed message: {}", e);
            return None;
        }
    };

    if message.table.as_deref() != Some("instrument") {
        return None;
    }

    message
        .data
        .into_iter()
        .filter(|update| update.symbol == symbol)
        .filter_map(|update| update.last_price)
        .last()
        .map(|last_price| PriceTick {
            symbol: symbol.to_string(),
            last_price,
        })
}

#[async_trait]
impl PriceFeed for BitmexPriceFeed {
    async fn subscribe(&self, symbol: &str) -> Result<TickStream> {
        let url = self.subscription_url(symbol);
        tracing::info!("Connecting to BitMEX price feed: {}", url);

        let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| BotError::StreamDisconnected(e.to_string()))?;

        tracing::info!(symbol = %symbol, "Subscribed to instrument updates");

        let symbol = symbol.to_string();
        let ticks = ws_stream.filter_map(move |msg| {
            let symbol = symbol.clone();
            async move {
                match msg {
                    Ok(Message::Text(text)) => parse_instrument_message(&text, &symbol).map(Ok),
                    Ok(Message::Close(frame)) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .unwrap_or_else(|| "no close frame".to_string());
                        Some(Err(BotError::StreamDisconnected(reason)))
                    }
                    // Pongs are answered by tungstenite
                    Ok(_) => None,
                    Err(e) => Some(Err(BotError::StreamDisconnected(e.to_string()))),
                }
            }
        });

        Ok(ticks.boxed())
    }
}
