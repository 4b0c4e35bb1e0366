use super::Notifier;
use crate::{BotError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API `sendMessage` client
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    bot_token: String,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

impl TelegramNotifier {
    pub fn new(api_base: &str, bot_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, chat_target: &str, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);

        let resp = self
            .client
            .post(&url)
            .json(&SendMessage {
                chat_id: chat_target,
                text,
            })
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| BotError::Notify(format!("telegram unreachable: {}", e.without_url())))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(BotError::Notify(format!(
                "telegram rejected message: HTTP {}: {}",
                status, body
            )));
        }

        tracing::debug!(chat = %chat_target, "Telegram message delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_send_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botTOKEN/sendMessage")
            .match_body(Matcher::Json(serde_json::json!({
                "chat_id": "42",
                "text": "1 contracts bought at 19900",
            })))
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let notifier = TelegramNotifier::new(&server.url(), "TOKEN");
        notifier
            .notify("42", "1 contracts bought at 19900")
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejection_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/botTOKEN/sendMessage")
            .with_status(403)
            .with_body(r#"{"ok":false,"description":"Forbidden: bot was blocked by the user"}"#)
            .create_async()
            .await;

        let notifier = TelegramNotifier::new(&server.url(), "TOKEN");
        let err = notifier.notify("42", "hello").await.unwrap_err();

        assert!(matches!(err, BotError::Notify(_)));
        assert!(err.to_string().contains("403"));
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        let notifier = crate::notify::LogNotifier;
        tokio_test::assert_ok!(notifier.notify("ops", "hello").await);
    }
}
