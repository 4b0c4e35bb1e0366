use thiserror::Error;

/// Failures talking to the exchange (transport, auth, rate limit, bad payloads)
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("exchange API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode exchange response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("invalid request: {0}")]
    Request(String),

    #[error("{0}")]
    Missing(String),
}

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum BotError {
    /// Fatal to the current cycle iteration
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Recoverable once: wait and query again
    #[error("order {order_id} has not been filled")]
    OrderNotFilled { order_id: String },

    /// Handled inside the price watcher by resubscribing
    #[error("price stream disconnected: {0}")]
    StreamDisconnected(String),

    #[error("price watch aborted before any threshold fired")]
    WatchAborted,

    #[error("unexpected watch outcome {0:?} in state {1}")]
    UnexpectedSignal(crate::models::WatchSignal, &'static str),

    #[error("insufficient price history: need {needed} samples, got {got}")]
    InsufficientHistory { needed: usize, got: usize },

    #[error("ledger error: {0}")]
    Ledger(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("notification error: {0}")]
    Notify(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BotError {
    /// Whether this error ends the current trading iteration
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            BotError::OrderNotFilled { .. } | BotError::StreamDisconnected(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors_are_not_fatal() {
        let not_filled = BotError::OrderNotFilled {
            order_id: "abc".to_string(),
        };
        assert!(!not_filled.is_fatal());
        assert!(!BotError::StreamDisconnected("eof".to_string()).is_fatal());
    }

    #[test]
    fn test_gateway_error_is_fatal_and_descriptive() {
        let err: BotError = GatewayError::Api {
            status: 503,
            message: "overloaded".to_string(),
        }
        .into();

        assert!(err.is_fatal());
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("overloaded"));
    }
}
